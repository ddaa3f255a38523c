//! Cached record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a cached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry of a session's recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Client id of a locally-originated message, until the server assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

impl CachedMessage {
    pub fn new(id: &str, session_id: &str, role: MessageRole, content: &str) -> Self {
        Self {
            id: id.to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            local_id: None,
        }
    }
}

/// Execution state reported for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Running,
    WaitingForInput,
    WaitingForPermission,
    Error,
}

/// Last-known session snapshot. Overwritten on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSessionMetadata {
    pub session_id: String,
    pub mode: String,
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub execution_state: ExecutionState,
    pub last_updated: DateTime<Utc>,
}

/// Send a user command or prompt to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub text: String,
}

/// Change session settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_state: Option<ExecutionState>,
}

/// Answer a tool permission prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponsePayload {
    pub request_id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Operation body, tagged by type on the wire:
/// `{"type": "command", "payload": {"text": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OperationKind {
    Command(CommandPayload),
    StateUpdate(StateUpdatePayload),
    PermissionResponse(PermissionResponsePayload),
}

impl OperationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::StateUpdate(_) => "state_update",
            Self::PermissionResponse(_) => "permission_response",
        }
    }

    /// Reject bodies the server could never apply.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Command(cmd) if cmd.text.trim().is_empty() => {
                Err("command text is empty".to_string())
            }
            Self::StateUpdate(update) if update == &StateUpdatePayload::default() => {
                Err("state update changes nothing".to_string())
            }
            Self::PermissionResponse(resp) if resp.request_id.is_empty() => {
                Err("permission response has no request id".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A client action not yet confirmed by the server. Stored flat:
/// `{id, sessionId, type, payload, createdAt, retryCount}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub operation: OperationKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl PendingOperation {
    pub fn new(id: &str, session_id: &str, operation: OperationKind) -> Self {
        Self {
            id: id.to_string(),
            session_id: session_id.to_string(),
            operation,
            created_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Body sent to the server for this operation.
    pub fn wire_payload(&self) -> Value {
        serde_json::to_value(&self.operation).unwrap_or(Value::Null)
    }
}

/// Recency and size bookkeeping for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LruEntry {
    pub session_id: String,
    pub last_accessed_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Read-only cache summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_size_bytes: u64,
    pub session_count: usize,
    pub pending_operation_count: usize,
    /// Sessions evicted since this cache was opened.
    pub evicted_session_count: u64,
    /// Pending operations lost to eviction since this cache was opened.
    pub dropped_pending_operation_count: u64,
}
