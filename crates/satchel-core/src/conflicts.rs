//! Durable registry of detected conflicts awaiting manual resolution.

use crate::db::{LocalStore, StoreName};
use crate::error::Result;
use crate::models::Conflict;

/// Conflict registry backed by the `conflicts` namespace
#[derive(Clone)]
pub struct ConflictRegistry {
    store: LocalStore,
}

impl ConflictRegistry {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Persist a conflict under its key, replacing any earlier entry.
    pub async fn record(&self, conflict: &Conflict) -> Result<()> {
        self.store
            .set_json(StoreName::Conflicts, &conflict.key, conflict)
            .await?;
        tracing::warn!(
            "Recorded conflict {} for queued {} {}",
            conflict.key,
            conflict.local.kind(),
            conflict.local.id
        );
        Ok(())
    }

    /// Fetch a conflict by key, resolved or not.
    pub async fn get(&self, key: &str) -> Result<Option<Conflict>> {
        self.store.get_json(StoreName::Conflicts, key).await
    }

    /// All unresolved conflicts, oldest detection first.
    pub async fn unresolved(&self) -> Result<Vec<Conflict>> {
        let mut conflicts: Vec<Conflict> = self
            .store
            .values_json::<Conflict>(StoreName::Conflicts)
            .await?
            .into_iter()
            .filter(|conflict| !conflict.resolved)
            .collect();
        conflicts.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(conflicts)
    }

    /// Flag a conflict as resolved. Unknown keys are ignored.
    ///
    /// Returns whether a conflict was found.
    pub async fn mark_resolved(&self, key: &str) -> Result<bool> {
        let Some(mut conflict) = self.get(key).await? else {
            tracing::debug!("No conflict stored under {}", key);
            return Ok(false);
        };

        conflict.resolved = true;
        self.store
            .set_json(StoreName::Conflicts, key, &conflict)
            .await?;
        tracing::info!("Conflict {} marked resolved", key);
        Ok(true)
    }
}
