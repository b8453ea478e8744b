//! Offline-aware operation dispatcher.
//!
//! [`OfflineClient`] is the application-facing write API. Each operation runs
//! against the remote backend when the network is reachable and is queued
//! durably (with an optimistic cache update) when it is not. [`OfflineClient::sync`]
//! replays the queue in order once connectivity returns.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use uuid::Uuid;

use crate::cache::ReadCache;
use crate::config::OfflineConfig;
use crate::conflicts::ConflictRegistry;
use crate::db::{LocalStore, StoreName};
use crate::error::{Error, Result};
use crate::models::{
    merge_filter, CacheMutation, Conflict, Filter, Operation, QueuedOperation, UploadOptions,
};
use crate::network::NetworkStatus;
use crate::queue::MutationQueue;
use crate::remote::{BackendError, BackendResponse, RemoteBackend};
use crate::util::{id_to_text, parse_timestamp};

/// Prefix of ids synthesized for records inserted while offline
const TEMP_ID_PREFIX: &str = "offline-";

/// Result of a dispatched operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    /// Server data (online) or the optimistically cached data (queued)
    pub data: Option<Value>,
    /// Backend-reported error; never set for queued operations
    pub error: Option<BackendError>,
    /// The operation was queued for a later sync
    pub offline_queued: bool,
}

impl DispatchResult {
    const fn queued(data: Option<Value>) -> Self {
        Self {
            data,
            error: None,
            offline_queued: true,
        }
    }
}

impl From<BackendResponse> for DispatchResult {
    fn from(response: BackendResponse) -> Self {
        Self {
            data: response.data,
            error: response.error,
            offline_queued: false,
        }
    }
}

/// Outcome of a [`OfflineClient::sync`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    /// The network is unreachable; nothing was attempted
    Offline,
    /// Another sync was already running
    AlreadySyncing,
    /// A drain pass ran
    Completed {
        /// Operations confirmed (or dropped) and removed from the queue
        processed: usize,
        /// Operations still queued for the next pass
        remaining: usize,
    },
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline, nothing synced"),
            Self::AlreadySyncing => f.write_str("a sync is already running"),
            Self::Completed {
                processed,
                remaining,
            } => write!(f, "synced {processed} operation(s), {remaining} remaining"),
        }
    }
}

enum ConflictCheck {
    /// No disqualifying condition; apply the update
    Proceed,
    /// Conflict recorded; the queued update is handled
    Recorded,
    /// Server state could not be read; try again next pass
    Retry,
}

/// Clears the syncing flag when dropped, including on early return or error.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Offline-first client over a remote backend
pub struct OfflineClient<B, N> {
    store: LocalStore,
    queue: MutationQueue,
    cache: ReadCache,
    conflicts: ConflictRegistry,
    backend: B,
    network: N,
    config: OfflineConfig,
    syncing: AtomicBool,
}

impl<B: RemoteBackend, N: NetworkStatus> OfflineClient<B, N> {
    pub fn new(store: LocalStore, backend: B, network: N, config: OfflineConfig) -> Self {
        Self {
            queue: MutationQueue::new(store.clone()),
            cache: ReadCache::new(store.clone(), config.id_key.clone()),
            conflicts: ConflictRegistry::new(store.clone()),
            store,
            backend,
            network,
            config,
            syncing: AtomicBool::new(false),
        }
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn network(&self) -> &N {
        &self.network
    }

    pub const fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// Whether a sync pass is currently running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    // Dispatch

    /// Insert one row (an object) or several (an array) into `table`.
    pub async fn insert(&self, table: &str, payload: Value) -> Result<DispatchResult> {
        if !self.network.reachable() {
            let optimistic = self.with_temp_ids(&payload);
            self.queue
                .enqueue(Operation::Insert {
                    table: table.to_string(),
                    payload,
                })
                .await?;
            for row in rows(Some(&optimistic)) {
                let mutation = CacheMutation::Insert {
                    record: Some(row.clone()),
                };
                self.apply_to_cache(table, &mutation).await?;
            }
            tracing::debug!("Offline: queued insert into {}", table);
            return Ok(DispatchResult::queued(Some(optimistic)));
        }

        let response = self.backend.insert(table, &payload).await?;
        if accepted("insert", table, &response) {
            let confirmed = rows(response.data.as_ref());
            let records = if confirmed.is_empty() {
                rows(Some(&payload))
            } else {
                confirmed
            };
            for record in records {
                self.apply_to_cache(
                    table,
                    &CacheMutation::Insert {
                        record: Some(record.clone()),
                    },
                )
                .await?;
            }
        }
        Ok(response.into())
    }

    /// Update rows of `table` matching `filter` with `payload`.
    pub async fn update(
        &self,
        table: &str,
        payload: Value,
        filter: Filter,
    ) -> Result<DispatchResult> {
        if !self.network.reachable() {
            let merged = merge_filter(&payload, &filter);
            self.enqueue_optimistic(Operation::Update {
                table: table.to_string(),
                payload,
                filter,
            })
            .await?;
            tracing::debug!("Offline: queued update of {}", table);
            return Ok(DispatchResult::queued(Some(merged)));
        }

        let response = self.backend.update(table, &payload, &filter).await?;
        if accepted("update", table, &response) {
            let confirmed = rows(response.data.as_ref());
            if confirmed.is_empty() {
                let mutation = CacheMutation::Update {
                    record: Some(merge_filter(&payload, &filter)),
                    filter: Some(filter),
                };
                self.apply_to_cache(table, &mutation).await?;
            }
            for row in confirmed {
                let mutation = CacheMutation::Update {
                    record: Some(row.clone()),
                    filter: None,
                };
                self.apply_to_cache(table, &mutation).await?;
            }
        }
        Ok(response.into())
    }

    /// Delete rows of `table` matching `filter`.
    pub async fn delete(&self, table: &str, filter: Filter) -> Result<DispatchResult> {
        if !self.network.reachable() {
            self.enqueue_optimistic(Operation::Delete {
                table: table.to_string(),
                filter,
            })
            .await?;
            tracing::debug!("Offline: queued delete from {}", table);
            return Ok(DispatchResult::queued(None));
        }

        let response = self.backend.delete(table, &filter).await?;
        if accepted("delete", table, &response) {
            let mutation = CacheMutation::Delete {
                filter: Some(filter),
            };
            self.apply_to_cache(table, &mutation).await?;
        }
        Ok(response.into())
    }

    /// Call a remote procedure.
    pub async fn rpc(&self, name: &str, args: Value) -> Result<DispatchResult> {
        if !self.network.reachable() {
            self.queue
                .enqueue(Operation::Rpc {
                    rpc_name: name.to_string(),
                    rpc_args: args,
                })
                .await?;
            tracing::debug!("Offline: queued rpc {}", name);
            return Ok(DispatchResult::queued(None));
        }

        let response = self.backend.rpc(name, &args).await?;
        accepted("rpc", name, &response);
        Ok(response.into())
    }

    /// Invoke a serverless function.
    pub async fn invoke_function(&self, name: &str, body: Value) -> Result<DispatchResult> {
        if !self.network.reachable() {
            self.queue
                .enqueue(Operation::Function {
                    function_name: name.to_string(),
                    function_body: body,
                })
                .await?;
            tracing::debug!("Offline: queued function {}", name);
            return Ok(DispatchResult::queued(None));
        }

        let response = self.backend.invoke_function(name, &body).await?;
        accepted("function", name, &response);
        Ok(response.into())
    }

    /// Upload a file body to `bucket` at `path`.
    ///
    /// While offline the body is staged locally and uploaded on the next sync;
    /// the returned data then carries the staged `file_id`.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> Result<DispatchResult> {
        if !self.network.reachable() {
            let file_id = Uuid::now_v7().to_string();
            self.store.set(StoreName::Uploads, &file_id, &body).await?;
            self.queue
                .enqueue(Operation::Upload {
                    bucket: bucket.to_string(),
                    file_path: path.to_string(),
                    file_id: file_id.clone(),
                    options,
                })
                .await?;
            tracing::debug!(
                "Offline: staged {} bytes for {}/{} as {}",
                body.len(),
                bucket,
                path,
                file_id
            );
            return Ok(DispatchResult::queued(Some(serde_json::json!({
                "path": path,
                "file_id": file_id,
            }))));
        }

        let response = self
            .backend
            .upload_file(bucket, path, &body, &options)
            .await?;
        accepted("upload", bucket, &response);
        Ok(response.into())
    }

    // Sync

    /// Replay queued operations in order, stopping at the first failure.
    ///
    /// Does nothing while offline or while another sync is running.
    pub async fn sync(&self) -> Result<SyncReport> {
        if !self.network.reachable() {
            tracing::debug!("Skipping sync while offline");
            return Ok(SyncReport::Offline);
        }
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("Sync already in progress");
            return Ok(SyncReport::AlreadySyncing);
        };

        tracing::info!("Syncing {} queued operation(s)", self.queue.count().await?);
        let summary = self.queue.drain(|item| self.process_item(item)).await?;
        let remaining = self.queue.count().await?;
        tracing::info!(
            "Sync finished: {} processed, {} remaining",
            summary.processed,
            remaining
        );

        Ok(SyncReport::Completed {
            processed: summary.processed,
            remaining,
        })
    }

    /// Startup hook: wait the configured delay, then sync if online.
    pub async fn initialize(&self) -> Result<SyncReport> {
        if !self.network.reachable() {
            return Ok(SyncReport::Offline);
        }
        tokio::time::sleep(self.config.initial_sync_delay).await;
        self.sync().await
    }

    /// Connectivity hook for the host's "became online" notification.
    pub async fn on_network_online(&self) -> Result<SyncReport> {
        tracing::info!("Network came online");
        self.sync().await
    }

    /// Drain processor: never fails, errors become a retry.
    async fn process_item(&self, item: QueuedOperation) -> Result<bool> {
        match self.process(&item).await {
            Ok(done) => Ok(done),
            Err(error) => {
                tracing::error!(
                    "Failed to replay queued {} {}: {}",
                    item.kind(),
                    item.id,
                    error
                );
                Ok(false)
            }
        }
    }

    async fn process(&self, item: &QueuedOperation) -> Result<bool> {
        match &item.operation {
            Operation::Insert { table, payload } => {
                let response = self.remote(self.backend.insert(table, payload)).await?;
                if !accepted("insert", table, &response) {
                    return Ok(false);
                }
                self.apply_to_cache(
                    table,
                    &CacheMutation::Insert {
                        record: Some(payload.clone()),
                    },
                )
                .await?;
                Ok(true)
            }
            Operation::Update {
                table,
                payload,
                filter,
            } => {
                if self.config.is_conflict_checked(table) {
                    if let Some(id) = filter.get(&self.config.id_key).filter(|id| !id.is_null()) {
                        match self.check_conflict(item, table, payload, id).await? {
                            ConflictCheck::Proceed => {}
                            ConflictCheck::Recorded => return Ok(true),
                            ConflictCheck::Retry => return Ok(false),
                        }
                    }
                }

                let response = self
                    .remote(self.backend.update(table, payload, filter))
                    .await?;
                if !accepted("update", table, &response) {
                    return Ok(false);
                }
                if let Some(mutation) = item.operation.cache_mutation() {
                    self.apply_to_cache(table, &mutation).await?;
                }
                Ok(true)
            }
            Operation::Delete { table, filter } => {
                let response = self.remote(self.backend.delete(table, filter)).await?;
                if !accepted("delete", table, &response) {
                    return Ok(false);
                }
                if let Some(mutation) = item.operation.cache_mutation() {
                    self.apply_to_cache(table, &mutation).await?;
                }
                Ok(true)
            }
            Operation::Rpc { rpc_name, rpc_args } => {
                let response = self.remote(self.backend.rpc(rpc_name, rpc_args)).await?;
                Ok(accepted("rpc", rpc_name, &response))
            }
            Operation::Function {
                function_name,
                function_body,
            } => {
                let response = self
                    .remote(self.backend.invoke_function(function_name, function_body))
                    .await?;
                Ok(accepted("function", function_name, &response))
            }
            Operation::Upload {
                bucket,
                file_path,
                file_id,
                options,
            } => {
                let Some(body) = self.store.get(StoreName::Uploads, file_id).await? else {
                    tracing::warn!(
                        "Dropping upload {} to {}/{}: staged file {} is missing",
                        item.id,
                        bucket,
                        file_path,
                        file_id
                    );
                    self.store.remove(StoreName::Uploads, file_id).await?;
                    return Ok(true);
                };

                let response = self
                    .remote(self.backend.upload_file(bucket, file_path, &body, options))
                    .await?;
                if !accepted("upload", bucket, &response) {
                    return Ok(false);
                }
                self.store.remove(StoreName::Uploads, file_id).await?;
                Ok(true)
            }
            Operation::Unknown => {
                tracing::warn!("Dropping queued operation {} of unknown kind", item.id);
                Ok(true)
            }
        }
    }

    /// Compare a queued update against the current server row.
    ///
    /// Only fields present in the queued payload are compared.
    async fn check_conflict(
        &self,
        item: &QueuedOperation,
        table: &str,
        payload: &Value,
        id: &Value,
    ) -> Result<ConflictCheck> {
        let response = self
            .remote(self.backend.fetch_by_id(table, &self.config.id_key, id))
            .await?;

        if let Some(error) = &response.error {
            if error.is_row_not_found() {
                return Ok(ConflictCheck::Proceed);
            }
            tracing::warn!("Could not read {} row for conflict check: {}", table, error);
            return Ok(ConflictCheck::Retry);
        }
        let Some(server) = response.data else {
            return Ok(ConflictCheck::Proceed);
        };

        let server_updated_at = match server.get("updated_at") {
            Some(Value::Null) | None => None,
            Some(raw) => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    tracing::warn!(
                        "Unreadable updated_at {} on {} row; skipping conflict check",
                        raw,
                        table
                    );
                }
                parsed
            }
        };
        let server_is_newer =
            server_updated_at.is_some_and(|updated_at| updated_at > item.created_at);
        if !server_is_newer {
            return Ok(ConflictCheck::Proceed);
        }

        let differs = payload.as_object().is_some_and(|fields| {
            fields
                .iter()
                .any(|(field, value)| server.get(field) != Some(value))
        });
        if !differs {
            return Ok(ConflictCheck::Proceed);
        }

        let record_id = id_to_text(id).unwrap_or_default();
        let conflict = Conflict::new(table, &record_id, item.clone(), server);
        self.conflicts.record(&conflict).await?;
        Ok(ConflictCheck::Recorded)
    }

    /// Run one drain-path remote call under the configured item timeout.
    async fn remote<F>(&self, call: F) -> Result<BackendResponse>
    where
        F: Future<Output = Result<BackendResponse>>,
    {
        match self.config.item_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                Error::Transport(format!("remote call timed out after {limit:?}"))
            })?,
            None => call.await,
        }
    }

    // Cache

    async fn enqueue_optimistic(&self, operation: Operation) -> Result<()> {
        let mutation = operation.cache_mutation();
        let table = operation.table().map(ToString::to_string);
        self.queue.enqueue(operation).await?;
        if let (Some(table), Some(mutation)) = (table, mutation) {
            self.apply_to_cache(&table, &mutation).await?;
        }
        Ok(())
    }

    async fn apply_to_cache(&self, table: &str, mutation: &CacheMutation) -> Result<bool> {
        self.cache
            .apply(self.config.cache_key(table), mutation)
            .await
    }

    /// Give every row lacking an id a temporary one.
    fn with_temp_ids(&self, payload: &Value) -> Value {
        match payload {
            Value::Array(items) => {
                Value::Array(items.iter().map(|row| self.with_temp_ids(row)).collect())
            }
            Value::Object(fields)
                if fields
                    .get(&self.config.id_key)
                    .map_or(true, Value::is_null) =>
            {
                let mut row = fields.clone();
                row.insert(
                    self.config.id_key.clone(),
                    Value::String(format!("{TEMP_ID_PREFIX}{}", Uuid::now_v7())),
                );
                Value::Object(row)
            }
            other => other.clone(),
        }
    }

    // Read helpers

    /// Cached collection for `key`, `None` until populated.
    pub async fn cached(&self, key: &str) -> Result<Option<Vec<Value>>> {
        self.cache.get(key).await
    }

    /// Populate (or replace) a cached collection.
    pub async fn seed_cache(&self, key: &str, records: &[Value]) -> Result<()> {
        self.cache.set(key, records).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.queue.count().await
    }

    pub async fn pending_operations(&self) -> Result<Vec<QueuedOperation>> {
        self.queue.list().await
    }

    /// Staged body of a deferred upload.
    pub async fn staged_upload(&self, file_id: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(StoreName::Uploads, file_id).await
    }

    /// Unresolved conflicts, oldest first.
    pub async fn get_conflicts(&self) -> Result<Vec<Conflict>> {
        self.conflicts.unresolved().await
    }

    /// Flag a conflict resolved; unknown keys are ignored.
    pub async fn mark_conflict_resolved(&self, key: &str) -> Result<bool> {
        self.conflicts.mark_resolved(key).await
    }
}

/// Log a backend-reported error; returns whether the call succeeded.
fn accepted(kind: &str, target: &str, response: &BackendResponse) -> bool {
    match &response.error {
        Some(error) => {
            tracing::warn!("Backend rejected {} on {}: {}", kind, target, error);
            false
        }
        None => true,
    }
}

/// Rows of a response or payload: an array's objects, or a single object.
fn rows(data: Option<&Value>) -> Vec<&Value> {
    match data {
        Some(Value::Array(items)) => items.iter().filter(|item| item.is_object()).collect(),
        Some(row @ Value::Object(_)) => vec![row],
        _ => Vec::new(),
    }
}
