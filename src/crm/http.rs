//! Shared HTTP client and response helpers.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::{CrmError, Result};

/// Default per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base-URL-scoped HTTP client for the provider's REST API.
#[derive(Debug, Clone)]
pub struct ApiHttp {
    client: reqwest::Client,
    base_url: String,
}

impl ApiHttp {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(json_headers())
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path relative to the API base.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Read a failed response body for diagnostics.
pub async fn error_body(response: Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(err) => format!("<unreadable body: {err}>"),
    }
}

/// Map a non-2xx contact API response to an error.
pub fn status_to_error(status: u16, body: &str) -> CrmError {
    match status {
        401 => CrmError::Auth(format!("request unauthorized after token refresh: {body}")),
        _ => CrmError::provider(status, body),
    }
}
