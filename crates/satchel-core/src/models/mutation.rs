//! Cache mutation model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column equality filter (`column -> value`) selecting remote rows
pub type Filter = Map<String, Value>;

/// A single change to apply to a cached collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheMutation {
    /// Upsert `record` at the front of the collection
    Insert { record: Option<Value> },
    /// Merge `record` onto entries selected by `filter` (or by the record's own id)
    Update {
        record: Option<Value>,
        #[serde(rename = "match")]
        filter: Option<Filter>,
    },
    /// Remove entries selected by `filter`
    Delete {
        #[serde(rename = "match")]
        filter: Option<Filter>,
    },
}

/// Overlay filter columns onto a payload object.
///
/// Non-object payloads are returned unchanged.
#[must_use]
pub fn merge_filter(payload: &Value, filter: &Filter) -> Value {
    let mut merged = payload.clone();
    if let Value::Object(fields) = &mut merged {
        for (column, value) in filter {
            fields.insert(column.clone(), value.clone());
        }
    }
    merged
}
