//! Read-cache reconciliation.
//!
//! [`apply_cache_mutation`] is a pure function over a cached collection; the
//! [`ReadCache`] wrapper loads a collection from the local store, applies a
//! mutation, and writes it back only when something changed.

use std::borrow::Cow;

use serde_json::Value;

use crate::db::{LocalStore, StoreName};
use crate::error::Result;
use crate::models::CacheMutation;

/// Apply one mutation to a cached collection without touching the input.
///
/// Returns `None` when the collection has not been populated yet,
/// `Cow::Borrowed` when the mutation is a no-op, and `Cow::Owned` with the new
/// collection otherwise. Records are matched on `id_key`; a `null` id never
/// matches.
pub fn apply_cache_mutation<'a>(
    current: Option<&'a [Value]>,
    mutation: &CacheMutation,
    id_key: &str,
) -> Option<Cow<'a, [Value]>> {
    let current = current?;

    let next = match mutation {
        CacheMutation::Insert { record } => insert(current, record.as_ref(), id_key),
        CacheMutation::Update { record, filter } => {
            let target = filter
                .as_ref()
                .and_then(|filter| non_null(filter.get(id_key)))
                .or_else(|| record.as_ref().and_then(|record| record_id(record, id_key)));
            update(current, record.as_ref(), target, id_key)
        }
        CacheMutation::Delete { filter } => {
            let target = filter
                .as_ref()
                .and_then(|filter| non_null(filter.get(id_key)));
            delete(current, target, id_key)
        }
    };

    Some(next.map_or(Cow::Borrowed(current), Cow::Owned))
}

fn insert(current: &[Value], record: Option<&Value>, id_key: &str) -> Option<Vec<Value>> {
    let record = record?;
    let id = record_id(record, id_key)?;

    let mut next = Vec::with_capacity(current.len() + 1);
    next.push(record.clone());
    next.extend(
        current
            .iter()
            .filter(|entry| record_id(entry, id_key) != Some(id))
            .cloned(),
    );
    Some(next)
}

fn update(
    current: &[Value],
    record: Option<&Value>,
    target: Option<&Value>,
    id_key: &str,
) -> Option<Vec<Value>> {
    let record = record?;
    let target = target?;

    let mut matched = false;
    let mut next: Vec<Value> = current
        .iter()
        .map(|entry| {
            if record_id(entry, id_key) == Some(target) {
                matched = true;
                merge(entry, record)
            } else {
                entry.clone()
            }
        })
        .collect();

    if !matched {
        record_id(record, id_key)?;
        next.insert(0, record.clone());
    }
    Some(next)
}

fn delete(current: &[Value], target: Option<&Value>, id_key: &str) -> Option<Vec<Value>> {
    let target = target?;
    if !current
        .iter()
        .any(|entry| record_id(entry, id_key) == Some(target))
    {
        return None;
    }

    Some(
        current
            .iter()
            .filter(|entry| record_id(entry, id_key) != Some(target))
            .cloned()
            .collect(),
    )
}

/// Shallow merge: incoming fields overwrite, the rest are preserved.
fn merge(entry: &Value, record: &Value) -> Value {
    match (entry, record) {
        (Value::Object(existing), Value::Object(incoming)) => {
            let mut merged = existing.clone();
            for (field, value) in incoming {
                merged.insert(field.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => record.clone(),
    }
}

fn record_id<'v>(record: &'v Value, id_key: &str) -> Option<&'v Value> {
    non_null(record.get(id_key))
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

/// Store-backed view over the cache namespace.
#[derive(Clone)]
pub struct ReadCache {
    store: LocalStore,
    id_key: String,
}

impl ReadCache {
    pub fn new(store: LocalStore, id_key: impl Into<String>) -> Self {
        Self {
            store,
            id_key: id_key.into(),
        }
    }

    /// Cached collection for `key`; `None` means not yet populated.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<Value>>> {
        self.store.get_json(StoreName::Cache, key).await
    }

    /// Replace the cached collection for `key`.
    pub async fn set(&self, key: &str, records: &[Value]) -> Result<()> {
        self.store.set_json(StoreName::Cache, key, records).await
    }

    /// Apply a mutation to the collection stored under `key`.
    ///
    /// Returns whether the stored collection changed.
    pub async fn apply(&self, key: &str, mutation: &CacheMutation) -> Result<bool> {
        let current = self.get(key).await?;
        match apply_cache_mutation(current.as_deref(), mutation, &self.id_key) {
            Some(Cow::Owned(next)) => {
                self.set(key, &next).await?;
                tracing::debug!("Cache '{}' updated ({} records)", key, next.len());
                Ok(true)
            }
            Some(Cow::Borrowed(_)) | None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Filter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn match_id(id: Value) -> Option<Filter> {
        let mut filter = Filter::new();
        filter.insert("id".to_string(), id);
        Some(filter)
    }

    fn changed(result: Option<Cow<'_, [Value]>>) -> Vec<Value> {
        match result {
            Some(Cow::Owned(next)) => next,
            other => panic!("expected a new collection, got {other:?}"),
        }
    }

    fn is_unchanged(result: &Option<Cow<'_, [Value]>>) -> bool {
        matches!(result, Some(Cow::Borrowed(_)))
    }

    #[test]
    fn absent_collection_stays_absent() {
        let mutation = CacheMutation::Insert {
            record: Some(json!({"id": 1})),
        };
        assert!(apply_cache_mutation(None, &mutation, "id").is_none());
    }

    #[test]
    fn insert_prepends_new_record() {
        let current = vec![json!({"id": 1, "title": "old"})];
        let mutation = CacheMutation::Insert {
            record: Some(json!({"id": 2, "title": "new"})),
        };

        let next = changed(apply_cache_mutation(Some(current.as_slice()), &mutation, "id"));
        assert_eq!(
            next,
            vec![
                json!({"id": 2, "title": "new"}),
                json!({"id": 1, "title": "old"})
            ]
        );
        assert_eq!(current, vec![json!({"id": 1, "title": "old"})]);
    }

    #[test]
    fn insert_same_id_twice_keeps_latest_at_front() {
        let current = vec![json!({"id": 1}), json!({"id": 2, "v": 1})];
        let first = changed(apply_cache_mutation(
            Some(current.as_slice()),
            &CacheMutation::Insert {
                record: Some(json!({"id": 2, "v": 2})),
            },
            "id",
        ));
        let second = changed(apply_cache_mutation(
            Some(first.as_slice()),
            &CacheMutation::Insert {
                record: Some(json!({"id": 2, "v": 3})),
            },
            "id",
        ));

        assert_eq!(second, vec![json!({"id": 2, "v": 3}), json!({"id": 1})]);
    }

    #[test]
    fn insert_without_id_is_noop() {
        let current = vec![json!({"id": 1})];
        for record in [None, Some(json!({"title": "x"})), Some(json!({"id": null}))] {
            let result =
                apply_cache_mutation(Some(current.as_slice()), &CacheMutation::Insert { record }, "id");
            assert!(is_unchanged(&result));
        }
    }

    #[test]
    fn insert_honours_custom_id_key() {
        let current = vec![json!({"uuid": "a", "n": 1})];
        let next = changed(apply_cache_mutation(
            Some(current.as_slice()),
            &CacheMutation::Insert {
                record: Some(json!({"uuid": "a", "n": 2})),
            },
            "uuid",
        ));
        assert_eq!(next, vec![json!({"uuid": "a", "n": 2})]);
    }

    #[test]
    fn update_merges_and_preserves_other_fields() {
        let current = vec![
            json!({"id": 1, "name": "Ada", "grade": 5}),
            json!({"id": 2, "name": "Bob", "grade": 6}),
        ];
        let mutation = CacheMutation::Update {
            record: Some(json!({"grade": 7})),
            filter: match_id(json!(1)),
        };

        let next = changed(apply_cache_mutation(Some(current.as_slice()), &mutation, "id"));
        assert_eq!(
            next,
            vec![
                json!({"id": 1, "name": "Ada", "grade": 7}),
                json!({"id": 2, "name": "Bob", "grade": 6}),
            ]
        );
    }

    #[test]
    fn update_falls_back_to_record_id() {
        let current = vec![json!({"id": "s1", "name": "Ada"})];
        let mutation = CacheMutation::Update {
            record: Some(json!({"id": "s1", "name": "Ada L."})),
            filter: None,
        };

        let next = changed(apply_cache_mutation(Some(current.as_slice()), &mutation, "id"));
        assert_eq!(next, vec![json!({"id": "s1", "name": "Ada L."})]);
    }

    #[test]
    fn update_unmatched_with_record_id_upserts() {
        let current = vec![json!({"id": 1})];
        let mutation = CacheMutation::Update {
            record: Some(json!({"id": 9, "name": "new"})),
            filter: match_id(json!(9)),
        };

        let next = changed(apply_cache_mutation(Some(current.as_slice()), &mutation, "id"));
        assert_eq!(next, vec![json!({"id": 9, "name": "new"}), json!({"id": 1})]);
    }

    #[test]
    fn update_unmatched_without_record_id_is_noop() {
        let current = vec![json!({"id": 1})];
        let mutation = CacheMutation::Update {
            record: Some(json!({"name": "ghost"})),
            filter: match_id(json!(9)),
        };
        assert!(is_unchanged(&apply_cache_mutation(
            Some(current.as_slice()),
            &mutation,
            "id"
        )));
    }

    #[test]
    fn update_without_record_or_target_is_noop() {
        let current = vec![json!({"id": 1})];
        let missing_record = CacheMutation::Update {
            record: None,
            filter: match_id(json!(1)),
        };
        let missing_target = CacheMutation::Update {
            record: Some(json!({"name": "x"})),
            filter: None,
        };

        assert!(is_unchanged(&apply_cache_mutation(
            Some(current.as_slice()),
            &missing_record,
            "id"
        )));
        assert!(is_unchanged(&apply_cache_mutation(
            Some(current.as_slice()),
            &missing_target,
            "id"
        )));
    }

    #[test]
    fn delete_removes_all_matches() {
        let current = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 1, "dup": true})];
        let mutation = CacheMutation::Delete {
            filter: match_id(json!(1)),
        };

        let next = changed(apply_cache_mutation(Some(current.as_slice()), &mutation, "id"));
        assert_eq!(next, vec![json!({"id": 2})]);
        assert_eq!(current.len(), 3);
    }

    #[test]
    fn delete_without_target_is_noop() {
        let current = vec![json!({"id": 1})];
        for filter in [None, Some(Filter::new()), match_id(Value::Null)] {
            let result =
                apply_cache_mutation(Some(current.as_slice()), &CacheMutation::Delete { filter }, "id");
            assert!(is_unchanged(&result));
        }
    }

    #[tokio::test]
    async fn read_cache_applies_and_persists() {
        let store = LocalStore::open_in_memory().unwrap();
        let cache = ReadCache::new(store, "id");

        let mutation = CacheMutation::Insert {
            record: Some(json!({"id": 1})),
        };
        assert!(!cache.apply("tasks", &mutation).await.unwrap());
        assert_eq!(cache.get("tasks").await.unwrap(), None);

        cache.set("tasks", &[]).await.unwrap();
        assert!(cache.apply("tasks", &mutation).await.unwrap());
        assert_eq!(
            cache.get("tasks").await.unwrap(),
            Some(vec![json!({"id": 1})])
        );
    }
}
