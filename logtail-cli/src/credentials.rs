use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const TOKEN_ENV: &str = "LOGTAIL_TOKEN";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("nenhum token encontrado; use --token, LOGTAIL_TOKEN ou {0}")]
    Missing(String),
    #[error("arquivo de credenciais inválido {}: {reason}", .path.display())]
    InvalidFile { path: PathBuf, reason: String },
    #[error("falha ao ler credenciais: {0}")]
    Io(#[from] io::Error),
}

/// Where the token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Flag,
    Env,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    /// Team scope stored next to the token, if any.
    pub team_id: Option<String>,
    pub source: CredentialSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, alias = "team")]
    team_id: Option<String>,
}

/// `<config dir>/logtail/auth.json`.
pub fn auth_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push("logtail");
        path.push("auth.json");
        path
    })
}

/// Resolves the token: `--token`, then `LOGTAIL_TOKEN`, then the auth file.
pub fn resolve(flag: Option<&str>) -> Result<Credentials, CredentialsError> {
    let from_env = env::var(TOKEN_ENV).ok();
    resolve_from(flag, from_env.as_deref(), auth_file_path().as_deref())
}

fn resolve_from(
    flag: Option<&str>,
    from_env: Option<&str>,
    file: Option<&Path>,
) -> Result<Credentials, CredentialsError> {
    let stored = match file {
        Some(path) => read_auth_file(path)?,
        None => AuthFile::default(),
    };
    let team_id = non_empty(stored.team_id.as_deref());

    if let Some(token) = non_empty(flag) {
        return Ok(Credentials {
            token,
            team_id,
            source: CredentialSource::Flag,
        });
    }
    if let Some(token) = non_empty(from_env) {
        return Ok(Credentials {
            token,
            team_id,
            source: CredentialSource::Env,
        });
    }
    if let (Some(token), Some(path)) = (non_empty(stored.token.as_deref()), file) {
        return Ok(Credentials {
            token,
            team_id,
            source: CredentialSource::File(path.to_path_buf()),
        });
    }

    let hint = file
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "logtail/auth.json".to_string());
    Err(CredentialsError::Missing(hint))
}

fn read_auth_file(path: &Path) -> Result<AuthFile, CredentialsError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(AuthFile::default()),
        Err(err) => return Err(err.into()),
    };
    if contents.trim().is_empty() {
        return Ok(AuthFile::default());
    }
    serde_json::from_str(&contents).map_err(|err| CredentialsError::InvalidFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
