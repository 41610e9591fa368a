//! Conformance suite API
//!
//! [`ConformanceApi`] is the seam the poller and plan runner talk to;
//! [`ConformanceClient`] implements it over HTTP.

use async_trait::async_trait;
use conformance_common::{TestResult, TestState};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{RunnerError, RunnerResult};
use crate::http::HttpClient;

/// Response of a module registration
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: String,
    pub raw: Value,
}

/// Module status as reported by `api/info/<id>`
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub status: TestState,
    pub result: TestResult,
    /// Full response, scanned for capturable fields
    pub raw: Value,
}

impl ModuleInfo {
    pub fn from_value(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(TestState::parse)
            .unwrap_or_default();
        let result = raw
            .get("result")
            .and_then(Value::as_str)
            .map(TestResult::parse)
            .unwrap_or_default();
        Self {
            status,
            result,
            raw,
        }
    }
}

/// Runner details from `api/runner/<id>`, including browser redirect targets
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerInfo {
    pub status: TestState,
    pub browser: Option<BrowserTargets>,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTargets {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub urls_with_method: Vec<UrlWithMethod>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UrlWithMethod {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RunnerInfo {
    /// Parse a runner response
    ///
    /// A malformed `browser` block is logged and treated as absent, so the
    /// poller falls through to "no browser URL found".
    pub fn from_value(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(TestState::parse)
            .unwrap_or_default();
        let browser = match raw.get("browser") {
            None | Some(Value::Null) => None,
            Some(browser) => match BrowserTargets::deserialize(browser) {
                Ok(targets) => Some(targets),
                Err(e) => {
                    warn!("Ignoring malformed browser targets: {}", e);
                    None
                }
            },
        };
        Self {
            status,
            browser,
            raw,
        }
    }

    /// URL to open for the redirect step
    ///
    /// Prefers the first direct URL, then the first GET entry of
    /// `urlsWithMethod`.
    pub fn browser_url(&self) -> Option<&str> {
        let browser = self.browser.as_ref()?;
        browser.urls.first().map(String::as_str).or_else(|| {
            browser
                .urls_with_method
                .iter()
                .find(|entry| entry.method.eq_ignore_ascii_case("GET"))
                .map(|entry| entry.url.as_str())
        })
    }
}

/// Operations the execution engine needs from the conformance suite
#[async_trait]
pub trait ConformanceApi: Send + Sync {
    /// Create a runner for `module_name` within `plan_id`
    async fn register_runner(&self, plan_id: &str, module_name: &str) -> RunnerResult<Registration>;

    async fn get_module_info(&self, runner_id: &str) -> RunnerResult<ModuleInfo>;

    async fn get_runner_info(&self, runner_id: &str) -> RunnerResult<RunnerInfo>;

    /// Log entries; non-array responses are treated as empty
    async fn get_module_logs(&self, runner_id: &str) -> RunnerResult<Vec<Value>>;

    async fn start_module(&self, runner_id: &str) -> RunnerResult<()>;
}

/// HTTP implementation of [`ConformanceApi`]
#[derive(Debug, Clone)]
pub struct ConformanceClient {
    http: HttpClient,
}

impl ConformanceClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Plan names offered by the server
    pub async fn available_plans(&self) -> RunnerResult<Vec<String>> {
        let url = self.http.build_url("api/plan/available")?;
        let value = self.http.request_json(Method::GET, url, &[200]).await?;
        let names = match value {
            Value::Array(entries) => entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(name) => Some(name.clone()),
                    other => other
                        .get("planName")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(names)
    }

    /// Plan description, including its module list
    pub async fn plan_info(&self, plan_name: &str) -> RunnerResult<Value> {
        let url = self
            .http
            .build_url(&format!("api/plan/info/{}", encode_segment(plan_name)))?;
        self.http.request_json(Method::GET, url, &[200]).await
    }
}

#[async_trait]
impl ConformanceApi for ConformanceClient {
    async fn register_runner(&self, plan_id: &str, module_name: &str) -> RunnerResult<Registration> {
        let mut url = self.http.build_url("api/runner")?;
        url.query_pairs_mut()
            .append_pair("plan", plan_id)
            .append_pair("test", module_name);

        let raw = self.http.request_json(Method::POST, url, &[200, 201]).await?;
        let id = match raw.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(RunnerError::Protocol(format!(
                    "registration of '{}' returned no runner id",
                    module_name
                )))
            }
        };
        Ok(Registration { id, raw })
    }

    async fn get_module_info(&self, runner_id: &str) -> RunnerResult<ModuleInfo> {
        let url = self
            .http
            .build_url(&format!("api/info/{}", encode_segment(runner_id)))?;
        let raw = self.http.request_json(Method::GET, url, &[200]).await?;
        Ok(ModuleInfo::from_value(raw))
    }

    async fn get_runner_info(&self, runner_id: &str) -> RunnerResult<RunnerInfo> {
        let url = self
            .http
            .build_url(&format!("api/runner/{}", encode_segment(runner_id)))?;
        let raw = self.http.request_json(Method::GET, url, &[200]).await?;
        Ok(RunnerInfo::from_value(raw))
    }

    async fn get_module_logs(&self, runner_id: &str) -> RunnerResult<Vec<Value>> {
        let url = self
            .http
            .build_url(&format!("api/log/{}", encode_segment(runner_id)))?;
        match self.http.request_json(Method::GET, url, &[200]).await? {
            Value::Array(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    async fn start_module(&self, runner_id: &str) -> RunnerResult<()> {
        let url = self
            .http
            .build_url(&format!("api/runner/{}", encode_segment(runner_id)))?;
        self.http.request_json(Method::POST, url, &[200, 201]).await?;
        Ok(())
    }
}

/// Percent-encode a single path segment
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
