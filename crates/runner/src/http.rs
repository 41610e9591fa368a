//! Shared HTTP client for the conformance server
//!
//! Wraps a `reqwest::Client` configured with a per-request timeout, the
//! server base URL and the bearer token attached to every call.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{RunnerError, RunnerResult};

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpClient {
    /// Create a client for `base_url`; the request timeout applies to each call
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> RunnerResult<Self> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| RunnerError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Underlying client, shared by action requests
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Resolve an endpoint against the base URL
    ///
    /// Absolute URLs are returned unchanged.
    pub fn build_url(&self, endpoint: &str) -> RunnerResult<Url> {
        if let Ok(absolute) = Url::parse(endpoint) {
            return Ok(absolute);
        }
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| RunnerError::InvalidUrl {
                url: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    /// Default headers: JSON content type and bearer authorization
    pub fn auth_headers(&self) -> RunnerResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| RunnerError::InvalidRequest(format!("invalid token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Send a request and parse the JSON response
    ///
    /// Any status outside `expected` is an error carrying the response body.
    /// An empty body parses as `{}`.
    pub async fn request_json(
        &self,
        method: Method,
        url: Url,
        expected: &[u16],
    ) -> RunnerResult<Value> {
        debug!("{} {}", method, url);
        let response = self
            .client
            .request(method, url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if !expected.contains(&status) {
            return Err(RunnerError::Http { status, body });
        }

        if body.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }
}
