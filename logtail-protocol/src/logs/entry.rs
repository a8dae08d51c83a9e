use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log entry exactly as delivered by the history endpoint or the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Epoch milliseconds.
    pub date: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl RawEntry {
    /// Convenience constructor for plain text entries.
    pub fn text(
        id: impl Into<String>,
        serial: impl Into<String>,
        date: i64,
        kind: &str,
        text: &str,
    ) -> Self {
        Self {
            id: id.into(),
            serial: Some(serial.into()),
            date,
            kind: kind.to_string(),
            text: Some(text.to_string()),
            payload: None,
            instance_id: None,
        }
    }
}
