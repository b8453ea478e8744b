use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] satchel_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Conflict key cannot be empty")]
    EmptyConflictKey,
    #[error("No conflict found for key: {0}")]
    ConflictNotFound(String),
    #[error(
        "Sync is not configured. Set SATCHEL_BACKEND_URL and SATCHEL_BACKEND_KEY to enable `satchel sync`."
    )]
    SyncNotConfigured,
}
