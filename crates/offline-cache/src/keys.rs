//! Store key layout.
//!
//! Every session owns up to three records; the LRU index is a single record
//! shared by all sessions.

/// Key of the persisted LRU index.
pub const LRU_INDEX_KEY: &str = "lru-index";

const MESSAGES_PREFIX: &str = "messages:";
const PENDING_PREFIX: &str = "pending:";
const METADATA_PREFIX: &str = "metadata:";

/// The per-session record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Messages,
    Pending,
    Metadata,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [Self::Messages, Self::Pending, Self::Metadata];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Messages => MESSAGES_PREFIX,
            Self::Pending => PENDING_PREFIX,
            Self::Metadata => METADATA_PREFIX,
        }
    }

    /// Store key of this record for `session_id`.
    pub fn key(self, session_id: &str) -> String {
        format!("{}{}", self.prefix(), session_id)
    }
}

/// Split a store key into its record kind and session id.
///
/// Returns `None` for the index key and anything not written by the cache.
pub fn parse_key(key: &str) -> Option<(RecordKind, &str)> {
    RecordKind::ALL.into_iter().find_map(|kind| {
        key.strip_prefix(kind.prefix())
            .filter(|session_id| !session_id.is_empty())
            .map(|session_id| (kind, session_id))
    })
}
