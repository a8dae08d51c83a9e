use std::io;

use logtail_protocol::logs::{DecodeError, InvalidDate};
use thiserror::Error;

/// Result type used across the logtail core crate.
pub type Result<T> = std::result::Result<T, TailError>;

/// Canonical error representation shared by the client crates.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Erro de I/O: {0}")]
    IoError(#[from] io::Error),

    #[error("Formato de data inválido: {0}")]
    InvalidDateFormat(String),

    #[error("Alvo inválido: {0}")]
    InvalidTarget(String),

    #[error("Falha ao buscar histórico: {0}")]
    SourceFetchFailure(String),

    #[error("Erro na assinatura ao vivo: {0}")]
    SubscriptionError(String),

    #[error("Erro de decodificação: {0}")]
    DecodeError(String),

    #[error("Erro de serialização: {0}")]
    SerializationError(String),

    #[error("Erro de configuração: {0}")]
    ConfigError(String),

    #[error("Erro de transporte: {0}")]
    TransportError(String),

    #[error("Erro geral: {0}")]
    GeneralError(String),
}

impl From<serde_json::Error> for TailError {
    fn from(err: serde_json::Error) -> Self {
        TailError::DecodeError(err.to_string())
    }
}

impl From<InvalidDate> for TailError {
    fn from(err: InvalidDate) -> Self {
        TailError::InvalidDateFormat(err.0)
    }
}

impl From<DecodeError> for TailError {
    fn from(err: DecodeError) -> Self {
        TailError::DecodeError(err.to_string())
    }
}

/// Invalid client configuration, from the environment or a command line override.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Valor inválido para {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("URL inválida para {key}: {reason}")]
    InvalidUrl { key: String, reason: String },

    #[error("URL de {key} precisa usar {expected}")]
    UnsupportedScheme { key: String, expected: &'static str },
}
