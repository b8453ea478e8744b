use std::path::Path;

use satchel_core::config::{BackendConfig, OfflineConfig};
use satchel_core::network::NoSignal;
use satchel_core::remote::RestBackend;
use satchel_core::OfflineClient;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let Some(config) = BackendConfig::from_env()? else {
        return Err(CliError::SyncNotConfigured);
    };

    tracing::debug!("Replaying queue at {} against {}", db_path.display(), config.url);
    let store = open_store(db_path)?;
    let backend = RestBackend::new(config)?;
    let client = OfflineClient::new(store, backend, NoSignal, OfflineConfig::default());

    let report = client.sync().await?;
    println!("Sync completed: {report}");
    Ok(())
}
