use std::path::Path;

use chrono::Utc;
use satchel_core::conflicts::ConflictRegistry;
use satchel_core::util::normalize_text_option;

use crate::commands::common::{conflict_item, format_conflict_lines, open_store, ConflictItem};
use crate::error::CliError;

pub async fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let registry = ConflictRegistry::new(open_store(db_path)?);
    let conflicts = registry.unresolved().await?;
    let now = Utc::now();

    if as_json {
        let json_items = conflicts
            .iter()
            .map(|conflict| conflict_item(conflict, now))
            .collect::<Vec<ConflictItem<'_>>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No unresolved conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts, now) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(key: &str, db_path: &Path) -> Result<(), CliError> {
    let key = normalize_text_option(Some(key.to_string())).ok_or(CliError::EmptyConflictKey)?;

    let registry = ConflictRegistry::new(open_store(db_path)?);
    if !registry.mark_resolved(&key).await? {
        return Err(CliError::ConflictNotFound(key));
    }

    println!("Marked conflict {key} resolved");
    Ok(())
}
