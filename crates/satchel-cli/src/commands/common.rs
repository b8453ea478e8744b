use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use satchel_core::db::LocalStore;
use satchel_core::{Conflict, Operation, QueuedOperation};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

const SUMMARY_CHARS: usize = 60;

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub created_at: String,
    pub relative_time: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem<'a> {
    pub key: &'a str,
    pub table: &'a str,
    pub detected_at: String,
    pub relative_time: String,
    pub local: &'a QueuedOperation,
    pub server: &'a Value,
}

pub fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open(db_path)?)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SATCHEL_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("satchel")
        .join("satchel.db")
}

/// Table, procedure, function, or object path an operation writes to.
pub fn operation_target(operation: &Operation) -> String {
    match operation {
        Operation::Insert { table, .. }
        | Operation::Update { table, .. }
        | Operation::Delete { table, .. } => table.clone(),
        Operation::Rpc { rpc_name, .. } => rpc_name.clone(),
        Operation::Function { function_name, .. } => function_name.clone(),
        Operation::Upload {
            bucket, file_path, ..
        } => format!("{bucket}/{file_path}"),
        Operation::Unknown => "-".to_string(),
    }
}

/// One-line description of what an operation sends.
pub fn operation_summary(operation: &Operation) -> String {
    let text = match operation {
        Operation::Insert { payload, .. } => payload.to_string(),
        Operation::Update {
            payload, filter, ..
        } => format!("{} <- {payload}", Value::Object(filter.clone())),
        Operation::Delete { filter, .. } => Value::Object(filter.clone()).to_string(),
        Operation::Rpc { rpc_args, .. } => rpc_args.to_string(),
        Operation::Function { function_body, .. } => function_body.to_string(),
        Operation::Upload { file_id, .. } => format!("staged file {file_id}"),
        Operation::Unknown => String::new(),
    };
    truncate(&text, SUMMARY_CHARS)
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn queue_item(item: &QueuedOperation, now: DateTime<Utc>) -> QueueItem {
    QueueItem {
        id: item.id.to_string(),
        kind: item.kind().to_string(),
        target: operation_target(&item.operation),
        created_at: item.created_at.to_rfc3339(),
        relative_time: format_relative_time(item.created_at, now),
        summary: operation_summary(&item.operation),
    }
}

pub fn format_queue_lines(items: &[QueuedOperation], now: DateTime<Utc>) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "{}  {:<8}  {:<8}  {}  {}",
                format_timestamp(item.created_at),
                format_relative_time(item.created_at, now),
                item.kind(),
                operation_target(&item.operation),
                operation_summary(&item.operation)
            )
        })
        .collect()
}

pub fn conflict_item(conflict: &Conflict, now: DateTime<Utc>) -> ConflictItem<'_> {
    ConflictItem {
        key: &conflict.key,
        table: &conflict.table,
        detected_at: conflict.detected_at.to_rfc3339(),
        relative_time: format_relative_time(conflict.detected_at, now),
        local: &conflict.local,
        server: &conflict.server,
    }
}

pub fn format_conflict_lines(conflicts: &[Conflict], now: DateTime<Utc>) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<8}  local={} queued={}",
                conflict.key,
                format_relative_time(conflict.detected_at, now),
                operation_summary(&conflict.local.operation),
                format_timestamp(conflict.local.created_at)
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
