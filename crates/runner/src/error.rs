//! Error types for plan execution

use conformance_common::ExecutionSummary;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Action '{0}' not found in config")]
    ActionNotFound(String),

    #[error("Action '{action}' failed: HTTP {status}: {body}")]
    ActionHttp {
        action: String,
        status: u16,
        body: String,
    },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timeout waiting for runner {runner_id}")]
    PollTimeout { runner_id: String },

    #[error("Execution stopped")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// A module failure that aborted the whole plan
///
/// Carries the results of the modules that completed before the failure.
#[derive(Error, Debug)]
#[error("plan aborted at module '{module}': {source}")]
pub struct PlanAborted {
    pub module: String,
    #[source]
    pub source: RunnerError,
    pub partial: Box<ExecutionSummary>,
}
