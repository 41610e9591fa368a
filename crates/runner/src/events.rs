//! Progress events emitted during a plan run
//!
//! Every message goes to `tracing`; when a broadcast sender is attached the
//! same message is also published as a [`RunEvent`] for live consumers such
//! as the dashboard feed.

use conformance_common::{ExecutionSummary, TestResult, TestState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Log severity carried by [`LogLine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One human-readable progress line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub severity: Severity,
    pub message: String,
    pub module_name: Option<String>,
    pub action_name: Option<String>,
    /// Unix epoch milliseconds
    pub at: i64,
}

impl LogLine {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            module_name: None,
            action_name: None,
            at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn module(mut self, name: &str) -> Self {
        self.module_name = Some(name.to_string());
        self
    }

    pub fn action(mut self, name: &str) -> Self {
        self.action_name = Some(name.to_string());
        self
    }
}

/// Live status of one module, as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCard {
    pub name: String,
    pub status: String,
    pub result: String,
    pub last_message: String,
}

impl ModuleCard {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "PENDING".to_string(),
            result: String::new(),
            last_message: String::new(),
        }
    }

    pub fn update(name: &str, state: &TestState, result: TestResult, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: state.as_str().to_string(),
            result: result.as_str().to_string(),
            last_message: message.to_string(),
        }
    }
}

/// Event published on the progress channel
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Message(LogLine),
    ModuleList(Vec<ModuleCard>),
    ModuleUpdate(ModuleCard),
    PlanDone(ExecutionSummary),
    Stopped(Vec<ModuleCard>),
}

impl RunEvent {
    /// Event name used on the SSE feed
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Message(_) => "message",
            RunEvent::ModuleList(_) => "moduleList",
            RunEvent::ModuleUpdate(_) => "moduleUpdate",
            RunEvent::PlanDone(_) => "planDone",
            RunEvent::Stopped(_) => "stopped",
        }
    }

    /// JSON payload of the event
    pub fn data(&self) -> Value {
        let result = match self {
            RunEvent::Message(line) => serde_json::to_value(line),
            RunEvent::ModuleList(cards) => serde_json::to_value(cards),
            RunEvent::ModuleUpdate(card) => serde_json::to_value(card),
            RunEvent::PlanDone(summary) => serde_json::to_value(summary),
            RunEvent::Stopped(cards) => return json!({ "cards": cards }),
        };
        result.unwrap_or(Value::Null)
    }
}

/// Logs progress and forwards it to an optional broadcast channel
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<broadcast::Sender<RunEvent>>,
}

impl Reporter {
    /// Reporter that only logs
    pub fn new() -> Self {
        Self { tx: None }
    }

    pub fn with_channel(tx: broadcast::Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, line: LogLine) {
        let prefix = match (&line.module_name, &line.action_name) {
            (Some(module), Some(action)) => format!("[{}:{}] ", module, action),
            (Some(module), None) => format!("[{}] ", module),
            _ => String::new(),
        };
        match line.severity {
            Severity::Info => info!("{}{}", prefix, line.message),
            Severity::Warn => warn!("{}{}", prefix, line.message),
            Severity::Error => error!("{}{}", prefix, line.message),
        }
        self.emit(RunEvent::Message(line));
    }

    pub fn info(&self, module: Option<&str>, message: impl Into<String>) {
        self.log(with_module(LogLine::new(Severity::Info, message), module));
    }

    pub fn warn(&self, module: Option<&str>, message: impl Into<String>) {
        self.log(with_module(LogLine::new(Severity::Warn, message), module));
    }

    pub fn error(&self, module: Option<&str>, message: impl Into<String>) {
        self.log(with_module(LogLine::new(Severity::Error, message), module));
    }
}

fn with_module(line: LogLine, module: Option<&str>) -> LogLine {
    match module {
        Some(name) => line.module(name),
        None => line,
    }
}
