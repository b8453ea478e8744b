//! Queued operation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::mutation::{merge_filter, CacheMutation, Filter};

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
///
/// The textual form sorts in creation order, so listing by id and listing by
/// creation time agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Options forwarded to the storage backend with a file upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// MIME type of the body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Cache-Control` max-age, in seconds, as the storage API expects it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Overwrite an existing object at the same path
    #[serde(default)]
    pub upsert: bool,
}

/// A write destined for the remote backend, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        payload: Value,
    },
    Update {
        table: String,
        payload: Value,
        #[serde(rename = "match")]
        filter: Filter,
    },
    Delete {
        table: String,
        #[serde(rename = "match")]
        filter: Filter,
    },
    Rpc {
        rpc_name: String,
        #[serde(default)]
        rpc_args: Value,
    },
    Function {
        function_name: String,
        #[serde(default)]
        function_body: Value,
    },
    Upload {
        bucket: String,
        file_path: String,
        file_id: String,
        #[serde(default)]
        options: UploadOptions,
    },
    /// Any entry whose `kind` this build does not recognize
    #[serde(other)]
    Unknown,
}

impl Operation {
    /// The persisted `kind` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Rpc { .. } => "rpc",
            Self::Function { .. } => "function",
            Self::Upload { .. } => "upload",
            Self::Unknown => "unknown",
        }
    }

    /// Target table for table-shaped operations.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }

    /// Cache mutation mirroring this operation's submitted data.
    ///
    /// Returns `None` for operations that have no read-cache counterpart.
    #[must_use]
    pub fn cache_mutation(&self) -> Option<CacheMutation> {
        match self {
            Self::Insert { payload, .. } => Some(CacheMutation::Insert {
                record: Some(payload.clone()),
            }),
            Self::Update {
                payload, filter, ..
            } => Some(CacheMutation::Update {
                record: Some(merge_filter(payload, filter)),
                filter: Some(filter.clone()),
            }),
            Self::Delete { filter, .. } => Some(CacheMutation::Delete {
                filter: Some(filter.clone()),
            }),
            Self::Rpc { .. } | Self::Function { .. } | Self::Upload { .. } | Self::Unknown => None,
        }
    }
}

/// An operation persisted in the mutation queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique, creation-ordered identifier
    pub id: OperationId,
    /// When the operation was queued
    pub created_at: DateTime<Utc>,
    /// The write itself
    #[serde(flatten)]
    pub operation: Operation,
}

impl QueuedOperation {
    /// Stamp an operation with a fresh id and the current time
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            id: OperationId::new(),
            created_at: Utc::now(),
            operation,
        }
    }

    /// The persisted `kind` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.operation.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_operation_id_unique_and_ordered() {
        let ids: Vec<OperationId> = (0..64).map(|_| OperationId::new()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].as_str() < pair[1].as_str());
        }
    }

    #[test]
    fn test_operation_id_parse() {
        let id = OperationId::new();
        let parsed: OperationId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_queued_update_persists_flat_shape() {
        let mut filter = Filter::new();
        filter.insert("id".to_string(), json!(7));
        let queued = QueuedOperation::new(Operation::Update {
            table: "attendance".to_string(),
            payload: json!({"status": "absent"}),
            filter,
        });

        let value = serde_json::to_value(&queued).unwrap();
        assert_eq!(value["kind"], json!("update"));
        assert_eq!(value["table"], json!("attendance"));
        assert_eq!(value["match"], json!({"id": 7}));
        assert_eq!(value["id"], json!(queued.id.as_str()));

        let decoded: QueuedOperation = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, queued);
    }

    #[test]
    fn test_unrecognized_kind_decodes_as_unknown() {
        let id = OperationId::new();
        let raw = json!({
            "id": id.as_str(),
            "created_at": "2024-05-01T10:00:00Z",
            "kind": "teleport",
            "destination": "mars",
        });

        let decoded: QueuedOperation = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.operation, Operation::Unknown);
        assert_eq!(decoded.kind(), "unknown");
    }

    #[test]
    fn test_upload_options_default_when_missing() {
        let raw = json!({
            "id": OperationId::new().as_str(),
            "created_at": "2024-05-01T10:00:00Z",
            "kind": "upload",
            "bucket": "avatars",
            "file_path": "students/1.png",
            "file_id": "f-1",
        });

        let decoded: QueuedOperation = serde_json::from_value(raw).unwrap();
        match decoded.operation {
            Operation::Upload { options, .. } => assert_eq!(options, UploadOptions::default()),
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_mutation_only_for_table_operations() {
        let rpc = Operation::Rpc {
            rpc_name: "close_term".to_string(),
            rpc_args: json!({}),
        };
        assert_eq!(rpc.cache_mutation(), None);
        assert_eq!(rpc.table(), None);

        let mut filter = Filter::new();
        filter.insert("id".to_string(), json!("t1"));
        let update = Operation::Update {
            table: "tasks".to_string(),
            payload: json!({"done": true}),
            filter: filter.clone(),
        };
        assert_eq!(update.table(), Some("tasks"));
        assert_eq!(
            update.cache_mutation(),
            Some(CacheMutation::Update {
                record: Some(json!({"done": true, "id": "t1"})),
                filter: Some(filter),
            })
        );
    }
}
