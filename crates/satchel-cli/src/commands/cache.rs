use std::path::Path;

use satchel_core::db::StoreName;
use serde_json::Value;

use crate::commands::common::open_store;
use crate::error::CliError;

/// Records stored under a cache key, or `None` when it was never populated.
pub async fn cached_records(key: &str, db_path: &Path) -> Result<Option<Vec<Value>>, CliError> {
    Ok(open_store(db_path)?
        .get_json::<Vec<Value>>(StoreName::Cache, key)
        .await?)
}

pub async fn run_cache(key: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let Some(records) = cached_records(key, db_path).await? else {
        println!("Cache '{key}' is not populated.");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{record}");
        }
    }
    Ok(())
}
