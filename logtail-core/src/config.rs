use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::errors::ConfigError;
use crate::websocket::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "https://api.logtail.dev";
pub const DEFAULT_REORDER_DELAY_MS: u64 = 300;
const STREAM_PATH: &str = "logs/stream";

/// Client configuration shared by the engine and the command line.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub stream_url: String,
    pub token: Option<String>,
    pub team_id: Option<String>,
    pub reorder_delay: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Loads configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("LOGTAIL_")
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `LOGTAIL_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let api_url = match read_trimmed(&key("API_URL"))? {
            Some(value) => sanitize_http_url(&key("API_URL"), &value)?,
            None => DEFAULT_API_URL.to_string(),
        };

        let stream_url = match read_trimmed(&key("STREAM_URL"))? {
            Some(value) => sanitize_ws_url(&key("STREAM_URL"), &value)?,
            None => derive_ws_url(&api_url)?,
        };

        let token = read_trimmed(&key("TOKEN"))?;
        let team_id = read_trimmed(&key("TEAM"))?;

        let reorder_delay_ms =
            parse_env::<u64>(&key("REORDER_DELAY_MS"), DEFAULT_REORDER_DELAY_MS)?;
        let initial_ms = parse_env::<u64>(&key("RECONNECT_INITIAL_MS"), 1_000)?;
        let max_ms = parse_env::<u64>(&key("RECONNECT_MAX_MS"), 30_000)?;

        Ok(Self {
            api_url,
            stream_url,
            token,
            team_id,
            reorder_delay: Duration::from_millis(reorder_delay_ms),
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(initial_ms.max(10)),
                Duration::from_millis(max_ms.max(initial_ms.max(10))),
            ),
        })
    }

    /// Applies command line overrides. A new API URL re-derives the stream URL
    /// unless one is given explicitly.
    pub fn apply_overrides(
        &mut self,
        api_url: Option<&str>,
        stream_url: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(api_url) = api_url {
            self.api_url = sanitize_http_url("--api-url", api_url.trim())?;
            self.stream_url = derive_ws_url(&self.api_url)?;
        }
        if let Some(stream_url) = stream_url {
            self.stream_url = sanitize_ws_url("--stream-url", stream_url.trim())?;
        }
        Ok(())
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

fn read_trimmed(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn sanitize_http_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let parsed = parse_url(key, value)?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::UnsupportedScheme {
            key: key.to_string(),
            expected: "http ou https",
        });
    }

    Ok(value.trim_end_matches('/').to_string())
}

fn sanitize_ws_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let parsed = parse_url(key, value)?;

    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ConfigError::UnsupportedScheme {
            key: key.to_string(),
            expected: "ws ou wss",
        });
    }

    Ok(value.to_string())
}

fn derive_ws_url(http_url: &str) -> Result<String, ConfigError> {
    let mut parsed = parse_url("API_URL", http_url)?;
    let scheme = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            warn!("esquema {other} não suportado para conversão em WebSocket");
            return Err(ConfigError::UnsupportedScheme {
                key: "API_URL".into(),
                expected: "http ou https",
            });
        }
    };

    parsed
        .set_scheme(scheme)
        .map_err(|_| ConfigError::InvalidUrl {
            key: "API_URL".into(),
            reason: format!("não foi possível derivar URL WebSocket a partir de {http_url}"),
        })?;

    let mut path = parsed.path().trim_end_matches('/').to_string();
    path.push('/');
    path.push_str(STREAM_PATH);
    parsed.set_path(&path);
    parsed.set_query(None);
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read_trimmed(key)? {
        Some(value) => T::from_str(&value).map_err(|err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}
