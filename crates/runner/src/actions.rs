//! Action execution
//!
//! Renders a named action against the merged variable layers, performs the
//! HTTP call or browser navigation, and returns the variables captured from
//! the outcome. Merging the result into the module store is left to the
//! caller.

use std::collections::HashMap;

use conformance_common::{
    apply, apply_str, capture_from_url, capture_from_value, merge_layers, ActionConfig, ApiAction,
    BrowserAction, PlanConfig, Variables,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::error::{RunnerError, RunnerResult};
use crate::http::HttpClient;
use crate::playwright::BrowserSession;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Executes the actions declared in a plan configuration
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    actions: HashMap<String, ActionConfig>,
    capture_vars: Vec<String>,
    global: Variables,
    http: HttpClient,
}

impl ActionExecutor {
    pub fn new(config: &PlanConfig, http: HttpClient) -> Self {
        let actions = config
            .actions
            .iter()
            .map(|action| (action.name().to_string(), action.clone()))
            .collect();
        Self {
            actions,
            capture_vars: config.capture_vars.clone(),
            global: config.variables.clone(),
            http,
        }
    }

    pub fn capture_vars(&self) -> &[String] {
        &self.capture_vars
    }

    pub fn action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.get(name)
    }

    /// Run action `name` and return what it captured
    ///
    /// Variables resolve with precedence captured > module > plan.
    pub async fn execute_action(
        &self,
        name: &str,
        captured: &Variables,
        module_vars: &Variables,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<Variables> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| RunnerError::ActionNotFound(name.to_string()))?;
        let merged = merge_layers(&[&self.global, module_vars, captured]);

        match action {
            ActionConfig::Api(api) => self.execute_api(api, &merged).await,
            ActionConfig::Browser(nav) => self.execute_browser(nav, &merged, browser).await,
        }
    }

    async fn execute_api(&self, action: &ApiAction, vars: &Variables) -> RunnerResult<Variables> {
        let url = self.http.build_url(&apply_str(&action.endpoint, vars))?;
        let method = Method::from_bytes(action.method.trim().to_uppercase().as_bytes())
            .map_err(|_| {
                RunnerError::InvalidRequest(format!(
                    "action '{}' has invalid method '{}'",
                    action.name, action.method
                ))
            })?;

        let mut headers = self.http.auth_headers()?;
        if let Some(extra) = &action.headers {
            for (key, value) in extra {
                let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    RunnerError::InvalidRequest(format!("invalid header name '{}': {}", key, e))
                })?;
                let value = HeaderValue::from_str(&apply_str(value, vars)).map_err(|e| {
                    RunnerError::InvalidRequest(format!("invalid value for header '{}': {}", key, e))
                })?;
                headers.insert(name, value);
            }
        }

        let payload = action
            .payload
            .as_ref()
            .map(|payload| apply(&Value::Object(payload.clone()), vars));

        debug!("Action '{}': {} {}", action.name, method, url);
        let mut request = self.http.inner().request(method, url);
        if let Some(payload) = &payload {
            let body = if is_form(&headers) {
                form_encode(payload)
            } else {
                payload.to_string()
            };
            request = request.body(body);
        }

        let response = request.headers(headers).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RunnerError::ActionHttp {
                action: action.name.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::Object(Default::default()))
        };

        let mut out = Variables::new();
        capture_from_value(&body, &self.capture_vars, &mut out);
        Ok(out)
    }

    async fn execute_browser(
        &self,
        action: &BrowserAction,
        vars: &Variables,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<Variables> {
        let url = apply_str(&action.url, vars);
        debug!("Action '{}': navigate {}", action.name, url);
        let final_url = browser.navigate(&url, action.wait_for).await?;

        let mut out = Variables::new();
        capture_from_url(&final_url, &self.capture_vars, &mut out);
        Ok(out)
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

/// URL-encode a rendered payload object as form fields
///
/// Strings are sent as-is; every other value is sent as its JSON text.
fn form_encode(payload: &Value) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Value::Object(map) = payload {
        for (key, value) in map {
            match value {
                Value::String(s) => serializer.append_pair(key, s),
                other => serializer.append_pair(key, &other.to_string()),
            };
        }
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conformance_common::WaitUntil;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingBrowser {
        visited: Vec<(String, WaitUntil)>,
        final_url: String,
    }

    #[async_trait]
    impl BrowserSession for RecordingBrowser {
        async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> RunnerResult<String> {
            self.visited.push((url.to_string(), wait_until));
            Ok(self.final_url.clone())
        }

        async fn close(&mut self) {}
    }

    fn browser() -> RecordingBrowser {
        RecordingBrowser {
            visited: Vec::new(),
            final_url: String::new(),
        }
    }

    fn executor(server: &str, config_json: &str) -> ActionExecutor {
        let config = PlanConfig::from_json(config_json).unwrap();
        let http = HttpClient::new(server, "suite-token", Duration::from_secs(5)).unwrap();
        ActionExecutor::new(&config, http)
    }

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_form_encode_value_kinds() {
        let payload = json!({
            "grant_type": "authorization_code",
            "count": 3,
            "flag": true,
            "nested": {"a": 1}
        });
        assert_eq!(
            form_encode(&payload),
            "grant_type=authorization_code&count=3&flag=true&nested=%7B%22a%22%3A1%7D"
        );
    }

    #[test]
    fn test_is_form_ignores_case_and_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/X-WWW-Form-Urlencoded; charset=UTF-8"),
        );
        assert!(is_form(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_form(&headers));
    }

    #[tokio::test]
    async fn test_unknown_action_is_error() {
        let exec = executor("http://127.0.0.1:9", r#"{"actions": []}"#);
        let err = exec
            .execute_action("missing", &Variables::new(), &Variables::new(), &mut browser())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ActionNotFound(ref name) if name == "missing"));
        assert_eq!(err.to_string(), "Action 'missing' not found in config");
    }

    #[tokio::test]
    async fn test_form_encoded_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("client_id=test&client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = format!(
            r#"{{
                "capture_vars": ["access_token"],
                "actions": [{{
                    "name": "token",
                    "type": "api",
                    "endpoint": "{}/token",
                    "headers": {{"Content-Type": "application/x-www-form-urlencoded"}},
                    "payload": {{"client_id": "{{{{client_id}}}}", "client_secret": "secret"}}
                }}]
            }}"#,
            server.uri()
        );
        let exec = executor(&server.uri(), &config);
        let out = exec
            .execute_action(
                "token",
                &Variables::new(),
                &vars(&[("client_id", "test")]),
                &mut browser(),
            )
            .await
            .unwrap();
        assert_eq!(out, vars(&[("access_token", "at-1")]));
    }

    #[tokio::test]
    async fn test_json_action_uses_precedence_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/items/captured"))
            .and(header("authorization", "Bearer suite-token"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"who": "module", "what": "global"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let exec = executor(
            &server.uri(),
            r#"{
                "variables": {"id": "global", "who": "global", "what": "global"},
                "actions": [{
                    "name": "update",
                    "type": "api",
                    "endpoint": "api/items/{{id}}",
                    "method": "put",
                    "payload": {"who": "{{who}}", "what": "{{what}}"}
                }]
            }"#,
        );
        let out = exec
            .execute_action(
                "update",
                &vars(&[("id", "captured")]),
                &vars(&[("id", "module"), ("who", "module")]),
                &mut browser(),
            )
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_action_headers_override_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(header("authorization", "Basic abc"))
            .respond_with(ResponseTemplate::new(201).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let exec = executor(
            &server.uri(),
            r#"{
                "capture_vars": ["active"],
                "actions": [{
                    "name": "introspect",
                    "type": "api",
                    "endpoint": "/introspect",
                    "headers": {"authorization": "Basic {{creds}}"}
                }]
            }"#,
        );
        let out = exec
            .execute_action(
                "introspect",
                &vars(&[("creds", "abc")]),
                &Variables::new(),
                &mut browser(),
            )
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_action_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let exec = executor(
            &server.uri(),
            r#"{"actions": [{"name": "token", "type": "api", "endpoint": "token"}]}"#,
        );
        let err = exec
            .execute_action("token", &Variables::new(), &Variables::new(), &mut browser())
            .await
            .unwrap_err();
        match err {
            RunnerError::ActionHttp { action, status, body } => {
                assert_eq!(action, "token");
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_browser_action_captures_from_final_url() {
        let exec = executor(
            "http://127.0.0.1:9",
            r#"{
                "capture_vars": ["code", "state"],
                "actions": [{
                    "name": "login",
                    "type": "browser",
                    "operation": "navigate",
                    "url": "https://as.example.com/authorize?client_id={{client_id}}",
                    "wait_for": "load"
                }]
            }"#,
        );
        let mut session = RecordingBrowser {
            visited: Vec::new(),
            final_url: "https://rp.example.com/cb?code=xyz&state=&other=1".to_string(),
        };
        let out = exec
            .execute_action(
                "login",
                &Variables::new(),
                &vars(&[("client_id", "c1")]),
                &mut session,
            )
            .await
            .unwrap();

        assert_eq!(
            session.visited,
            vec![(
                "https://as.example.com/authorize?client_id=c1".to_string(),
                WaitUntil::Load
            )]
        );
        assert_eq!(out, vars(&[("code", "xyz")]));
    }
}
