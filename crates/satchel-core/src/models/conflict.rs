//! Conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::QueuedOperation;

/// A queued update that collided with newer server state
///
/// Conflicts are never resolved automatically; `resolved` flips only through
/// an explicit operator action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic key: `{table}-{record id}`
    pub key: String,
    /// Table the update targeted
    pub table: String,
    /// The queued operation that triggered detection
    pub local: QueuedOperation,
    /// Authoritative server record at detection time
    pub server: Value,
    /// Set once an operator has reconciled the two sides
    pub resolved: bool,
    /// When the conflict was detected
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create an unresolved conflict for `table`/`record_id`.
    #[must_use]
    pub fn new(table: &str, record_id: &str, local: QueuedOperation, server: Value) -> Self {
        Self {
            key: Self::key_for(table, record_id),
            table: table.to_string(),
            local,
            server,
            resolved: false,
            detected_at: Utc::now(),
        }
    }

    /// Registry key for a table row.
    #[must_use]
    pub fn key_for(table: &str, record_id: &str) -> String {
        format!("{table}-{record_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Operation;
    use serde_json::json;

    #[test]
    fn test_conflict_new_is_unresolved() {
        let local = QueuedOperation::new(Operation::Delete {
            table: "scores".to_string(),
            filter: serde_json::Map::new(),
        });
        let conflict = Conflict::new("scores", "42", local, json!({"id": 42}));
        assert_eq!(conflict.key, "scores-42");
        assert!(!conflict.resolved);
    }
}
