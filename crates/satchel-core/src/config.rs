//! Client configuration.
//!
//! [`OfflineConfig`] holds dispatcher policy; [`BackendConfig`] holds the
//! endpoint and credentials of the hosted backend.

use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const ENV_BACKEND_URL: &str = "SATCHEL_BACKEND_URL";
const ENV_BACKEND_KEY: &str = "SATCHEL_BACKEND_KEY";
const ENV_ACCESS_TOKEN: &str = "SATCHEL_ACCESS_TOKEN";

const DEFAULT_ID_KEY: &str = "id";
const DEFAULT_CONFLICT_CHECKED_TABLES: [&str; 2] = ["attendance", "scores"];
const DEFAULT_INITIAL_SYNC_DELAY: Duration = Duration::from_secs(2);

/// Dispatcher policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Column identifying cached records
    pub id_key: String,
    /// Tables whose queued updates are checked against newer server rows
    pub conflict_checked_tables: BTreeSet<String>,
    /// Delay before the startup sync
    pub initial_sync_delay: Duration,
    /// Upper bound for one remote call while draining (none by default)
    pub item_timeout: Option<Duration>,
    /// Table -> cache key aliases; unlisted tables cache under their own name
    pub cache_keys: HashMap<String, String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            id_key: DEFAULT_ID_KEY.to_string(),
            conflict_checked_tables: DEFAULT_CONFLICT_CHECKED_TABLES
                .iter()
                .map(ToString::to_string)
                .collect(),
            initial_sync_delay: DEFAULT_INITIAL_SYNC_DELAY,
            item_timeout: None,
            cache_keys: HashMap::new(),
        }
    }
}

impl OfflineConfig {
    /// Use a different record id column
    #[must_use]
    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    /// Replace the set of conflict-checked tables
    #[must_use]
    pub fn with_conflict_checked_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_checked_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Set the startup sync delay
    #[must_use]
    pub const fn with_initial_sync_delay(mut self, delay: Duration) -> Self {
        self.initial_sync_delay = delay;
        self
    }

    /// Bound each remote call made while draining
    #[must_use]
    pub const fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }

    /// Cache `table` under a different key
    #[must_use]
    pub fn with_cache_key(mut self, table: impl Into<String>, key: impl Into<String>) -> Self {
        self.cache_keys.insert(table.into(), key.into());
        self
    }

    /// Cache key holding the collection for `table`
    pub fn cache_key<'a>(&'a self, table: &'a str) -> &'a str {
        self.cache_keys.get(table).map_or(table, String::as_str)
    }

    /// Whether queued updates to `table` are conflict-checked
    pub fn is_conflict_checked(&self, table: &str) -> bool {
        self.conflict_checked_tables.contains(table)
    }
}

/// Hosted backend endpoint and credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL, without trailing slash
    pub url: String,
    /// Public API key sent as `apikey`
    pub api_key: String,
    /// Signed-in user's access token; the API key is used when absent
    pub access_token: Option<String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl BackendConfig {
    /// Build a validated configuration.
    pub fn new(url: impl AsRef<str>, api_key: impl Into<String>) -> Result<Self> {
        let url = normalize_url(url.as_ref())?;
        let api_key = normalize_text_option(Some(api_key.into()))
            .ok_or_else(|| Error::Config("backend API key must not be empty".to_string()))?;

        Ok(Self {
            url,
            api_key,
            access_token: None,
        })
    }

    /// Authenticate requests as a signed-in user
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no backend variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let url = normalize_text_option(lookup(ENV_BACKEND_URL));
        let api_key = normalize_text_option(lookup(ENV_BACKEND_KEY));
        let access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN));

        match (url, api_key) {
            (None, None) => Ok(None),
            (Some(url), Some(api_key)) => {
                let mut config = Self::new(url, api_key)?;
                config.access_token = access_token;
                Ok(Some(config))
            }
            (None, Some(_)) => Err(Error::Config(format!(
                "{ENV_BACKEND_URL} is required when {ENV_BACKEND_KEY} is set"
            ))),
            (Some(_), None) => Err(Error::Config(format!(
                "{ENV_BACKEND_KEY} is required when {ENV_BACKEND_URL} is set"
            ))),
        }
    }

    /// Bearer token for requests
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }
}

fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("backend URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "backend URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
