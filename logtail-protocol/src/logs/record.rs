use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::entry::RawEntry;
use super::serial::LogSerial;

/// Closed set of record categories used for filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Command,
    Stdout,
    Stderr,
    Exit,
    Request,
    Response,
    Other,
}

impl Category {
    /// Categories shown when the caller does not ask for everything.
    pub const DEFAULT: [Category; 4] = [
        Category::Command,
        Category::Stdout,
        Category::Stderr,
        Category::Exit,
    ];

    pub fn from_kind(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "command" => Category::Command,
            "stdout" => Category::Stdout,
            "stderr" => Category::Stderr,
            "exit" => Category::Exit,
            "request" => Category::Request,
            "response" => Category::Response,
            _ => Category::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Command => "command",
            Category::Stdout => "stdout",
            Category::Stderr => "stderr",
            Category::Exit => "exit",
            Category::Request => "request",
            Category::Response => "response",
            Category::Other => "other",
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Category::Request | Category::Response)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields carried by request/response records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpFields {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Http(HttpFields),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Http(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("entry has no identity")]
    MissingIdentity,
    #[error("entry {id} has an invalid serial: {reason}")]
    InvalidSerial { id: String, reason: String },
    #[error("entry {id} has an out of range timestamp {date}")]
    InvalidTimestamp { id: String, date: i64 },
}

/// Sort key of a record: serial first, identity as the tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub serial: LogSerial,
    pub identity: String,
}

/// Normalised log record. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identity: String,
    pub serial: LogSerial,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl Record {
    pub fn decode(raw: RawEntry) -> Result<Self, DecodeError> {
        let identity = raw.id.trim().to_string();
        if identity.is_empty() {
            return Err(DecodeError::MissingIdentity);
        }

        let timestamp = Utc.timestamp_millis_opt(raw.date).single().ok_or_else(|| {
            DecodeError::InvalidTimestamp {
                id: identity.clone(),
                date: raw.date,
            }
        })?;

        // Entries without a serial still need a stable position.
        let serial = match raw.serial.as_deref().map(str::trim) {
            Some(serial) if !serial.is_empty() => {
                serial
                    .parse::<LogSerial>()
                    .map_err(|reason| DecodeError::InvalidSerial {
                        id: identity.clone(),
                        reason,
                    })?
            }
            _ => LogSerial::new(raw.date, identity.clone()),
        };

        let category = Category::from_kind(&raw.kind);
        let payload = decode_payload(category, raw.text, raw.payload);

        Ok(Self {
            identity,
            serial,
            timestamp,
            category,
            payload,
            instance_id: raw.instance_id,
        })
    }

    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            serial: self.serial.clone(),
            identity: self.identity.clone(),
        }
    }

    /// Ordering contract shared by every sorting site.
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        self.serial
            .cmp(&other.serial)
            .then_with(|| self.identity.cmp(&other.identity))
    }
}

fn decode_payload(category: Category, text: Option<String>, payload: Option<Value>) -> Payload {
    if category.is_http() {
        if let Some(value @ Value::Object(_)) = payload {
            if let Ok(fields) = serde_json::from_value::<HttpFields>(value) {
                return Payload::Http(fields);
            }
        }
        return Payload::Text(text.unwrap_or_default());
    }

    match (text, payload) {
        (Some(text), _) => Payload::Text(text),
        (None, Some(Value::String(text))) => Payload::Text(text),
        (None, Some(Value::Object(map))) => match map.get("text") {
            Some(Value::String(text)) => Payload::Text(text.clone()),
            _ => Payload::Text(Value::Object(map).to_string()),
        },
        (None, Some(other)) => Payload::Text(other.to_string()),
        (None, None) => Payload::Text(String::new()),
    }
}
