use std::fmt;

use logtail_protocol::logs::TargetKind;
use url::Url;

use crate::errors::{Result, TailError};

/// Deployment named either by URL (host only) or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    value: String,
    kind: TargetKind,
}

impl Target {
    /// Validates a user supplied target.
    ///
    /// URL-style targets keep only their host; a path, query or fragment is
    /// rejected instead of silently dropped.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TailError::InvalidTarget("alvo vazio".into()));
        }

        let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        if has_scheme || trimmed.contains('.') {
            let candidate = if has_scheme {
                trimmed.to_string()
            } else {
                format!("https://{trimmed}")
            };
            let parsed = Url::parse(&candidate)
                .map_err(|err| TailError::InvalidTarget(format!("{trimmed}: {err}")))?;

            if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
                return Err(TailError::InvalidTarget(format!(
                    "{trimmed} não pode conter caminho; informe apenas o host"
                )));
            }

            let host = parsed
                .host_str()
                .ok_or_else(|| TailError::InvalidTarget(format!("{trimmed} não possui host")))?;
            let value = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };

            return Ok(Self {
                value,
                kind: TargetKind::Url,
            });
        }

        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(TailError::InvalidTarget(format!(
                "{trimmed} não é um id de deployment válido"
            )));
        }

        Ok(Self {
            value: trimmed.to_string(),
            kind: TargetKind::Id,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn is_url(&self) -> bool {
        matches!(self.kind, TargetKind::Url)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
