use std::path::Path;

use chrono::Utc;
use satchel_core::queue::MutationQueue;

use crate::commands::common::{format_queue_lines, open_store, queue_item, QueueItem};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = MutationQueue::new(open_store(db_path)?);
    let items = queue.list().await?;
    let now = Utc::now();

    if as_json {
        let json_items = items
            .iter()
            .map(|item| queue_item(item, now))
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No pending operations.");
        return Ok(());
    }

    for line in format_queue_lines(&items, now) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_count(db_path: &Path) -> Result<(), CliError> {
    let queue = MutationQueue::new(open_store(db_path)?);
    println!("{}", queue.count().await?);
    Ok(())
}
