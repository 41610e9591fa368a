//! Core types for conformance plan execution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat variable set used for templating and capture
pub type Variables = BTreeMap<String, String>;

/// Server-reported lifecycle state of a test module
///
/// Values coming from the server are normalized to uppercase. A missing or
/// blank status is `Created`; anything unknown is kept verbatim in
/// `Unrecognized` and treated as a non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestState {
    Created,
    Configured,
    Waiting,
    Running,
    Finished,
    Interrupted,
    Unrecognized(String),
}

impl TestState {
    /// Normalize a raw server status
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "" | "CREATED" => TestState::Created,
            "CONFIGURED" => TestState::Configured,
            "WAITING" => TestState::Waiting,
            "RUNNING" => TestState::Running,
            "FINISHED" => TestState::Finished,
            "INTERRUPTED" => TestState::Interrupted,
            _ => TestState::Unrecognized(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TestState::Created => "CREATED",
            TestState::Configured => "CONFIGURED",
            TestState::Waiting => "WAITING",
            TestState::Running => "RUNNING",
            TestState::Finished => "FINISHED",
            TestState::Interrupted => "INTERRUPTED",
            TestState::Unrecognized(raw) => raw,
        }
    }

    /// Whether polling stops at this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Finished | TestState::Interrupted)
    }
}

impl Default for TestState {
    fn default() -> Self {
        Self::Created
    }
}

impl From<String> for TestState {
    fn from(raw: String) -> Self {
        TestState::parse(&raw)
    }
}

impl From<TestState> for String {
    fn from(state: TestState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for TestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome classification reported by the conformance server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestResult {
    Passed,
    Failed,
    Warning,
    Skipped,
    Review,
    Unknown,
}

impl TestResult {
    /// Case-insensitive match against the known set; anything else is `Unknown`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASSED" => TestResult::Passed,
            "FAILED" => TestResult::Failed,
            "WARNING" => TestResult::Warning,
            "SKIPPED" => TestResult::Skipped,
            "REVIEW" => TestResult::Review,
            _ => TestResult::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Passed => "PASSED",
            TestResult::Failed => "FAILED",
            TestResult::Warning => "WARNING",
            TestResult::Skipped => "SKIPPED",
            TestResult::Review => "REVIEW",
            TestResult::Unknown => "UNKNOWN",
        }
    }
}

impl Default for TestResult {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<String> for TestResult {
    fn from(raw: String) -> Self {
        TestResult::parse(&raw)
    }
}

impl From<TestResult> for String {
    fn from(result: TestResult) -> Self {
        result.as_str().to_string()
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of executing one module of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResult {
    pub name: String,
    pub runner_id: String,
    pub state: TestState,
    pub result: TestResult,
    #[serde(default)]
    pub captured: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Aggregated outcome of a plan run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub plan_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warning: usize,
    /// Modules the suite reported as SKIPPED
    pub skipped: usize,
    pub interrupted: usize,
    /// Modules never registered because the run stopped first
    ///
    /// These carry `result = SKIPPED` but are counted here, not in `skipped`.
    #[serde(default)]
    pub not_run: usize,
    /// Set when the run was cancelled before every module completed
    #[serde(default)]
    pub stopped: bool,
    pub modules: Vec<ModuleResult>,
}

impl ExecutionSummary {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            ..Default::default()
        }
    }

    /// Append a module result and update the counters
    ///
    /// Interruption is counted independently of the result classification.
    /// A module still in CREATED never ran and only counts as `not_run`.
    pub fn record(&mut self, module: ModuleResult) {
        self.total += 1;
        if module.state == TestState::Created {
            self.not_run += 1;
            self.modules.push(module);
            return;
        }
        match module.result {
            TestResult::Passed => self.passed += 1,
            TestResult::Failed => self.failed += 1,
            TestResult::Warning => self.warning += 1,
            TestResult::Skipped => self.skipped += 1,
            TestResult::Review | TestResult::Unknown => {}
        }
        if module.state == TestState::Interrupted {
            self.interrupted += 1;
        }
        self.modules.push(module);
    }

    /// True when the run should be reported as unsuccessful
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.interrupted > 0 || self.stopped
    }
}
