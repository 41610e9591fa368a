//! Dashboard HTTP server

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use conformance_common::{config::check_file_name, PlanConfig, CONFIG_SUFFIX};
use conformance_runner::{
    ConformanceClient, HttpClient, PlanRunner, PlaywrightConfig, PlaywrightLauncher, PollSettings,
    Reporter, POLL_INTERVAL_SECONDS_DEFAULT, TIMEOUT_SECONDS_DEFAULT,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::state::{DashboardConfig, DashboardState};

pub const ENV_PLAN_ID: &str = "CONFORMANCE_PLAN_ID";
pub const ENV_SERVER_URL: &str = "CONFORMANCE_SERVER_URL";
pub const ENV_TOKEN: &str = "CONFORMANCE_TOKEN";

/// Dashboard web server
#[derive(Clone)]
pub struct DashboardServer {
    state: Arc<DashboardState>,
}

/// Run the dashboard on `addr` until the process exits
pub async fn serve(addr: SocketAddr, config: DashboardConfig) -> anyhow::Result<()> {
    DashboardServer::new(config).serve(addr).await
}

impl DashboardServer {
    /// Must be called inside a tokio runtime
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            state: DashboardState::new(config),
        }
    }

    pub fn state(&self) -> &Arc<DashboardState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/configs", get(list_configs_handler))
            .route("/api/env-defaults", get(env_defaults_handler))
            .route("/api/launch", post(launch_handler))
            .route("/api/stop", post(stop_handler))
            .route(
                "/api/config/:filename",
                get(get_config_handler)
                    .put(put_config_handler)
                    .delete(delete_config_handler),
            )
            .route("/api/plan-names", get(plan_names_handler))
            .route("/api/plan/info/:plan_name", get(plan_info_handler))
            .route("/api/feed", get(feed_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Dashboard starting on http://{}", addr);
        info!("Config directory: {}", self.state.config.configs_dir.display());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

fn env_or_empty(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

/// Request value, falling back to the environment when empty
fn or_env(value: Option<String>, key: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| env_or_empty(key))
}

// ============================================================================
// Run control
// ============================================================================

async fn health_handler(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    Json(state.run.read().await.health())
}

async fn env_defaults_handler() -> impl IntoResponse {
    Json(json!({
        "planId": env_or_empty(ENV_PLAN_ID),
        "token": env_or_empty(ENV_TOKEN),
        "serverUrl": env_or_empty(ENV_SERVER_URL),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchRequest {
    config_path: String,
    plan_id: Option<String>,
    token: Option<String>,
    server_url: Option<String>,
    poll_interval: Option<u64>,
    timeout: Option<u64>,
    headless: Option<bool>,
}

async fn launch_handler(
    State(state): State<Arc<DashboardState>>,
    Json(req): Json<LaunchRequest>,
) -> Response {
    if state.run.read().await.in_flight {
        return error_response(StatusCode::CONFLICT, "An execution is already in flight");
    }

    let config_path = resolve_config_path(&state.config.configs_dir, &req.config_path);
    let plan = match PlanConfig::load(&config_path) {
        Ok(plan) => plan,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let plan_id = or_env(req.plan_id, ENV_PLAN_ID);
    let server_url = or_env(req.server_url, ENV_SERVER_URL);
    let token = or_env(req.token, ENV_TOKEN);
    if plan_id.is_empty() || server_url.is_empty() || token.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "planId, serverUrl and token are required",
        );
    }

    let http = match HttpClient::new(&server_url, &token, state.config.request_timeout) {
        Ok(http) => http,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let settings = PollSettings::from_seconds(
        req.poll_interval.unwrap_or(POLL_INTERVAL_SECONDS_DEFAULT),
        req.timeout.unwrap_or(TIMEOUT_SECONDS_DEFAULT),
    );
    let launcher = PlaywrightLauncher::new(PlaywrightConfig {
        headless: req.headless.unwrap_or(true),
        working_dir: state.config.playwright_dir.clone(),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    if !state.run.write().await.begin(cancel.clone()) {
        return error_response(StatusCode::CONFLICT, "An execution is already in flight");
    }

    let reporter = Reporter::with_channel(state.events.clone());
    let runner = PlanRunner::new(ConformanceClient::new(http.clone()), launcher, http, settings)
        .with_reporter(reporter.clone())
        .with_cancellation(cancel);

    info!(
        "Launching plan {} with {} ({} modules)",
        plan_id,
        config_path.display(),
        plan.modules.len()
    );

    let task_state = state.clone();
    let task_plan_id = plan_id.clone();
    tokio::spawn(async move {
        let (outcome, error) = match runner.execute_plan(&task_plan_id, &plan).await {
            Ok(summary) => (Some(summary), None),
            Err(aborted) => {
                let message = aborted.to_string();
                reporter.error(None, message.clone());
                (Some(*aborted.partial), Some(message))
            }
        };
        task_state.run.write().await.finish(outcome, error);
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "started", "planId": plan_id})),
    )
        .into_response()
}

async fn stop_handler(State(state): State<Arc<DashboardState>>) -> Response {
    if state.run.write().await.stop() {
        info!("Stop requested");
        Json(json!({"status": "stopping"})).into_response()
    } else {
        error_response(StatusCode::CONFLICT, "No execution in flight")
    }
}

async fn feed_handler(
    State(state): State<Arc<DashboardState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(sse) = Event::default().event(event.name()).json_data(event.data()) {
                        yield Ok(sse);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Feed client lagged, {} events dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================================================
// Config files
// ============================================================================

fn resolve_config_path(dir: &FsPath, config_path: &str) -> PathBuf {
    let path = PathBuf::from(config_path);
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

/// Validate a bare config file name from the URL
fn config_file(dir: &FsPath, filename: &str) -> Result<PathBuf, Response> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid name of \"{}\".", filename),
        ));
    }
    let path = dir.join(filename);
    check_file_name(&path).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(path)
}

async fn list_configs_handler(State(state): State<Arc<DashboardState>>) -> Response {
    let mut entries = match tokio::fs::read_dir(&state.config.configs_dir).await {
        Ok(entries) => entries,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.ends_with(CONFIG_SUFFIX) {
            files.push(name);
        }
    }
    files.sort();

    Json(json!({"files": files})).into_response()
}

async fn get_config_handler(
    State(state): State<Arc<DashboardState>>,
    Path(filename): Path<String>,
) -> Response {
    let path = match config_file(&state.config.configs_dir, &filename) {
        Ok(path) => path,
        Err(response) => return response,
    };

    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error_response(StatusCode::NOT_FOUND, format!("{} not found", filename))
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

async fn put_config_handler(
    State(state): State<Arc<DashboardState>>,
    Path(filename): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let path = match config_file(&state.config.configs_dir, &filename) {
        Ok(path) => path,
        Err(response) => return response,
    };

    let plan: PlanConfig = match serde_json::from_value(body) {
        Ok(plan) => plan,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    if let Err(e) = plan.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match plan.save(&path) {
        Ok(()) => {
            info!("Saved config {}", filename);
            Json(json!({"saved": filename})).into_response()
        }
        Err(e) => {
            error!("Failed to save {}: {}", filename, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_config_handler(
    State(state): State<Arc<DashboardState>>,
    Path(filename): Path<String>,
) -> Response {
    let path = match config_file(&state.config.configs_dir, &filename) {
        Ok(path) => path,
        Err(response) => return response,
    };

    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            info!("Deleted config {}", filename);
            Json(json!({"deleted": filename})).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, format!("{} not found", filename))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Conformance server proxy
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiteQuery {
    server_url: Option<String>,
    token: Option<String>,
}

fn suite_client(query: SuiteQuery, timeout: Duration) -> Result<ConformanceClient, Response> {
    let server_url = or_env(query.server_url, ENV_SERVER_URL);
    let token = or_env(query.token, ENV_TOKEN);
    if server_url.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "serverUrl is required"));
    }
    HttpClient::new(&server_url, &token, timeout)
        .map(ConformanceClient::new)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn plan_names_handler(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<SuiteQuery>,
) -> Response {
    let client = match suite_client(query, state.config.request_timeout) {
        Ok(client) => client,
        Err(response) => return response,
    };
    match client.available_plans().await {
        Ok(names) => Json(json!({"planNames": names})).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn plan_info_handler(
    State(state): State<Arc<DashboardState>>,
    Path(plan_name): Path<String>,
    Query(query): Query<SuiteQuery>,
) -> Response {
    let client = match suite_client(query, state.config.request_timeout) {
        Ok(client) => client,
        Err(response) => return response,
    };
    match client.plan_info(&plan_name).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path as StdPath;

    #[test]
    fn test_config_file_rejects_traversal_and_bad_suffix() {
        let dir = StdPath::new("/configs");
        assert!(config_file(dir, "plan.config.json").is_ok());
        assert!(config_file(dir, "../plan.config.json").is_err());
        assert!(config_file(dir, "nested\\plan.config.json").is_err());
        assert!(config_file(dir, "plan.json").is_err());
    }

    #[test]
    fn test_resolve_config_path() {
        let dir = StdPath::new("/configs");
        assert_eq!(
            resolve_config_path(dir, "a.config.json"),
            PathBuf::from("/configs/a.config.json")
        );
        assert_eq!(
            resolve_config_path(dir, "/abs/a.config.json"),
            PathBuf::from("/abs/a.config.json")
        );
    }

    #[test]
    fn test_or_env_prefers_request_value() {
        assert_eq!(
            or_env(Some("  from-request ".to_string()), "CONFORMANCE_TEST_UNSET_VAR"),
            "from-request"
        );
        assert_eq!(or_env(Some("   ".to_string()), "CONFORMANCE_TEST_UNSET_VAR"), "");
        assert_eq!(or_env(None, "CONFORMANCE_TEST_UNSET_VAR"), "");
    }
}
