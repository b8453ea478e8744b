//! Remote backend surface used by the dispatcher.
//!
//! Backend-reported failures are returned as data in [`BackendResponse`];
//! only transport failures surface as `Err`.

use std::fmt;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::models::{Filter, UploadOptions};
use crate::util::{compact_text, id_to_text};

/// `PostgREST` error code for "no (or more than one) row" on a single-row read
const ROW_NOT_FOUND_CODE: &str = "PGRST116";

/// Error reported by the backend for an otherwise completed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    /// Backend error code, when provided
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
    /// HTTP status, when the call went over HTTP
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// A single-row read matched nothing.
    pub fn is_row_not_found(&self) -> bool {
        self.code.as_deref() == Some(ROW_NOT_FOUND_CODE)
            || (self.code.is_none() && matches!(self.status, Some(404 | 406)))
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status) {
            (Some(code), _) => write!(f, "{} ({code})", self.message),
            (None, Some(status)) => write!(f, "{} (HTTP {status})", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// `{data, error}` result of a remote call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub data: Option<Value>,
    pub error: Option<BackendError>,
}

impl BackendResponse {
    /// Successful response with optional echoed data
    pub const fn ok(data: Option<Value>) -> Self {
        Self { data, error: None }
    }

    /// Backend-reported failure
    pub const fn failed(error: BackendError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Operations the dispatcher needs from the hosted backend
#[allow(async_fn_in_trait)]
pub trait RemoteBackend {
    /// Insert `payload` (one row or an array of rows) into `table`
    async fn insert(&self, table: &str, payload: &Value) -> Result<BackendResponse>;

    /// Update rows of `table` matching every column of `filter`
    async fn update(&self, table: &str, payload: &Value, filter: &Filter)
        -> Result<BackendResponse>;

    /// Delete rows of `table` matching every column of `filter`
    async fn delete(&self, table: &str, filter: &Filter) -> Result<BackendResponse>;

    /// Call a remote procedure
    async fn rpc(&self, name: &str, args: &Value) -> Result<BackendResponse>;

    /// Invoke a serverless function
    async fn invoke_function(&self, name: &str, body: &Value) -> Result<BackendResponse>;

    /// Upload a file body to `bucket` at `path`
    async fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        body: &[u8],
        options: &UploadOptions,
    ) -> Result<BackendResponse>;

    /// Read the single row of `table` whose `id_column` equals `id`
    async fn fetch_by_id(&self, table: &str, id_column: &str, id: &Value)
        -> Result<BackendResponse>;
}

/// `PostgREST`-style HTTP backend (REST tables, RPC, functions, storage)
#[derive(Clone)]
pub struct RestBackend {
    config: BackendConfig,
    client: Client,
}

impl RestBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: Client::builder().build()?,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.config.url)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.config.bearer())
    }

    async fn send(&self, request: RequestBuilder) -> Result<BackendResponse> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let error = parse_backend_error(status, &body);
            tracing::debug!("Backend returned {}: {}", status.as_u16(), error);
            return Ok(BackendResponse::failed(error));
        }

        Ok(BackendResponse::ok(parse_body(&body)))
    }
}

impl RemoteBackend for RestBackend {
    async fn insert(&self, table: &str, payload: &Value) -> Result<BackendResponse> {
        let request = self
            .request(Method::POST, self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(payload);
        self.send(request).await
    }

    async fn update(
        &self,
        table: &str,
        payload: &Value,
        filter: &Filter,
    ) -> Result<BackendResponse> {
        let request = self
            .request(Method::PATCH, self.rest_url(table))
            .query(&filter_query(filter))
            .header("Prefer", "return=representation")
            .json(payload);
        self.send(request).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<BackendResponse> {
        let request = self
            .request(Method::DELETE, self.rest_url(table))
            .query(&filter_query(filter));
        self.send(request).await
    }

    async fn rpc(&self, name: &str, args: &Value) -> Result<BackendResponse> {
        let request = self
            .request(Method::POST, self.rest_url(&format!("rpc/{name}")))
            .json(args);
        self.send(request).await
    }

    async fn invoke_function(&self, name: &str, body: &Value) -> Result<BackendResponse> {
        let url = format!("{}/functions/v1/{name}", self.config.url);
        let request = self.request(Method::POST, url).json(body);
        self.send(request).await
    }

    async fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        body: &[u8],
        options: &UploadOptions,
    ) -> Result<BackendResponse> {
        let url = format!(
            "{}/storage/v1/object/{}",
            self.config.url,
            object_path(bucket, path)
        );
        let mut request = self
            .request(Method::POST, url)
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .header(
                "Content-Type",
                options
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .body(body.to_vec());
        if let Some(max_age) = &options.cache_control {
            request = request.header("Cache-Control", format!("max-age={max_age}"));
        }
        self.send(request).await
    }

    async fn fetch_by_id(
        &self,
        table: &str,
        id_column: &str,
        id: &Value,
    ) -> Result<BackendResponse> {
        let mut filter = Filter::new();
        filter.insert(id_column.to_string(), id.clone());
        let mut query = filter_query(&filter);
        query.push(("select".to_string(), "*".to_string()));

        let request = self
            .request(Method::GET, self.rest_url(table))
            .query(&query)
            .header("Accept", "application/vnd.pgrst.object+json");
        self.send(request).await
    }
}

/// Equality filter as `PostgREST` query parameters.
fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    filter
        .iter()
        .map(|(column, value)| {
            let condition = id_to_text(value).map_or_else(
                || "is.null".to_string(),
                |text| format!("eq.{text}"),
            );
            (column.clone(), condition)
        })
        .collect()
}

/// `bucket/path` with every segment percent-encoded.
fn object_path(bucket: &str, path: &str) -> String {
    std::iter::once(bucket)
        .chain(path.trim_start_matches('/').split('/'))
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_body(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

fn parse_backend_error(status: StatusCode, body: &str) -> BackendError {
    let status_code = Some(status.as_u16());

    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        let message = payload
            .message
            .or(payload.error)
            .or(payload.details)
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty());
        if let Some(message) = message {
            return BackendError {
                code: payload.code.as_ref().and_then(id_to_text),
                message,
                status: status_code,
            };
        }
    }

    let trimmed = compact_text(body);
    BackendError {
        code: None,
        message: if trimmed.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            trimmed
        },
        status: status_code,
    }
}
