//! Shared utility functions used across multiple modules.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Render a JSON identifier value as plain text.
///
/// Strings are returned without quotes; `null` yields `None`.
pub fn id_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Smallest integer read as epoch milliseconds; in seconds it is year 5138.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a server-side timestamp column.
///
/// Accepts RFC 3339 as well as the `YYYY-MM-DD HH:MM:SS[.f]` form Postgres emits
/// for `timestamp without time zone`, which is read as UTC. Integers are Unix
/// epoch seconds, or milliseconds from `1e11` upward.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(epoch) = value.as_i64() {
        return if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }

    let text = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn id_to_text_unquotes_strings() {
        assert_eq!(id_to_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(id_to_text(&json!(42)), Some("42".to_string()));
        assert_eq!(id_to_text(&Value::Null), None);
    }

    #[test]
    fn parse_timestamp_accepts_postgres_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(
            parse_timestamp(&json!("2024-03-01T08:30:00+00:00")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-03-01T10:30:00+02:00")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("2024-03-01 08:30:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn parse_timestamp_accepts_epoch_numbers() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&json!(1_709_281_800)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_709_281_800_000_i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_709_281_800.5)), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }
}
