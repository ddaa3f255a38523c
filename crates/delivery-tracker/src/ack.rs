//! Server acknowledgement wire shape.
//!
//! ```json
//! { "result": "ok" | "error", "localId": "m1" | null,
//!   "messageId": "srv-1", "duplicate": true, "error": "reason" }
//! ```

use serde::{Deserialize, Serialize};

/// Outcome reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckResult {
    Ok,
    Error,
}

/// Acknowledgement for one submitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub result: AckResult,
    #[serde(default)]
    pub local_id: Option<String>,
    /// Server-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Set when the server had already processed this local id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckResponse {
    pub fn ok(local_id: &str) -> Self {
        Self {
            result: AckResult::Ok,
            local_id: Some(local_id.to_string()),
            message_id: None,
            duplicate: None,
            error: None,
        }
    }

    pub fn duplicate(local_id: &str) -> Self {
        Self {
            duplicate: Some(true),
            ..Self::ok(local_id)
        }
    }

    pub fn error(local_id: &str, message: &str) -> Self {
        Self {
            result: AckResult::Error,
            local_id: Some(local_id.to_string()),
            message_id: None,
            duplicate: None,
            error: Some(message.to_string()),
        }
    }

    /// Attach the server-assigned id.
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.result == AckResult::Ok
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate.unwrap_or(false)
    }
}
