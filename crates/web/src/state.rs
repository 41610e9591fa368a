//! Dashboard run state
//!
//! Holds the progress of the current (or last) plan run as seen by the
//! dashboard. Progress events are folded into [`RunState`] by a recorder
//! task so late-joining browsers can fetch a snapshot from `/api/health`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use conformance_common::ExecutionSummary;
use conformance_runner::events::{LogLine, ModuleCard};
use conformance_runner::RunEvent;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Log lines kept for `/api/health` and the log drawer
pub const MAX_LOG_LINES: usize = 5000;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Snapshot returned by `GET /api/health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub execution_in_flight: bool,
    pub line_count: usize,
    pub outcome: Option<ExecutionSummary>,
    pub error: Option<String>,
    pub module_cards: Vec<ModuleCard>,
}

#[derive(Debug, Default)]
pub struct RunState {
    pub in_flight: bool,
    pub lines: VecDeque<LogLine>,
    pub cards: Vec<ModuleCard>,
    pub outcome: Option<ExecutionSummary>,
    pub error: Option<String>,
    cancel: Option<CancellationToken>,
}

impl RunState {
    /// Mark a run as started and clear the previous one
    ///
    /// Returns false when a run is already in flight.
    pub fn begin(&mut self, cancel: CancellationToken) -> bool {
        if self.in_flight {
            return false;
        }
        *self = RunState {
            in_flight: true,
            cancel: Some(cancel),
            ..Default::default()
        };
        true
    }

    pub fn finish(&mut self, outcome: Option<ExecutionSummary>, error: Option<String>) {
        self.in_flight = false;
        self.cancel = None;
        if outcome.is_some() {
            self.outcome = outcome;
        }
        self.error = error;
    }

    /// Cancel the in-flight run; false when there is none
    pub fn stop(&mut self) -> bool {
        match (&self.cancel, self.in_flight) {
            (Some(cancel), true) => {
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Message(line) => {
                if self.lines.len() == MAX_LOG_LINES {
                    self.lines.pop_front();
                }
                self.lines.push_back(line.clone());
            }
            RunEvent::ModuleList(cards) | RunEvent::Stopped(cards) => {
                self.cards = cards.clone();
            }
            RunEvent::ModuleUpdate(card) => {
                match self.cards.iter_mut().find(|c| c.name == card.name) {
                    Some(slot) => *slot = card.clone(),
                    None => self.cards.push(card.clone()),
                }
            }
            RunEvent::PlanDone(summary) => {
                self.outcome = Some(summary.clone());
            }
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            execution_in_flight: self.in_flight,
            line_count: self.lines.len(),
            outcome: self.outcome.clone(),
            error: self.error.clone(),
            module_cards: self.cards.clone(),
        }
    }
}

/// Options for the dashboard server
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Directory holding `*.config.json` plan files
    pub configs_dir: PathBuf,
    pub request_timeout: Duration,
    /// Directory the Playwright driver resolves `playwright` from
    pub playwright_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            configs_dir: PathBuf::from("."),
            request_timeout: Duration::from_secs(conformance_runner::REQUEST_TIMEOUT_SECONDS_DEFAULT),
            playwright_dir: None,
        }
    }
}

/// Shared handler state
pub struct DashboardState {
    pub config: DashboardConfig,
    pub run: RwLock<RunState>,
    pub events: broadcast::Sender<RunEvent>,
}

impl DashboardState {
    /// Create the state and spawn the recorder task folding events into it
    pub fn new(config: DashboardConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(Self {
            config,
            run: RwLock::new(RunState::default()),
            events,
        });

        let recorder = state.clone();
        let mut rx = state.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => recorder.run.write().await.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("Recorder lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conformance_common::{TestResult, TestState};
    use conformance_runner::events::Severity;

    #[test]
    fn test_begin_rejects_concurrent_runs() {
        let mut run = RunState::default();
        assert!(run.begin(CancellationToken::new()));
        assert!(!run.begin(CancellationToken::new()));
        run.finish(None, None);
        assert!(run.begin(CancellationToken::new()));
    }

    #[test]
    fn test_begin_clears_previous_run() {
        let mut run = RunState::default();
        run.apply(&RunEvent::Message(LogLine::new(Severity::Info, "old")));
        run.finish(Some(ExecutionSummary::new("p")), Some("boom".to_string()));

        assert!(run.begin(CancellationToken::new()));
        let health = run.health();
        assert!(health.execution_in_flight);
        assert_eq!(health.line_count, 0);
        assert!(health.outcome.is_none());
        assert!(health.error.is_none());
    }

    #[test]
    fn test_stop_cancels_token() {
        let mut run = RunState::default();
        assert!(!run.stop());

        let cancel = CancellationToken::new();
        run.begin(cancel.clone());
        assert!(run.stop());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_log_lines_are_capped() {
        let mut run = RunState::default();
        for i in 0..MAX_LOG_LINES + 10 {
            run.apply(&RunEvent::Message(LogLine::new(Severity::Info, format!("line {}", i))));
        }
        assert_eq!(run.lines.len(), MAX_LOG_LINES);
        assert_eq!(run.lines.front().unwrap().message, "line 10");
    }

    #[test]
    fn test_module_updates_replace_cards_by_name() {
        let mut run = RunState::default();
        run.apply(&RunEvent::ModuleList(vec![
            ModuleCard::pending("a"),
            ModuleCard::pending("b"),
        ]));
        run.apply(&RunEvent::ModuleUpdate(ModuleCard::update(
            "b",
            &TestState::Finished,
            TestResult::Passed,
            "done",
        )));

        let health = run.health();
        assert_eq!(health.module_cards.len(), 2);
        assert_eq!(health.module_cards[0].status, "PENDING");
        assert_eq!(health.module_cards[1].status, "FINISHED");
        assert_eq!(health.module_cards[1].result, "PASSED");
    }

    #[test]
    fn test_health_serializes_camel_case() {
        let value = serde_json::to_value(RunState::default().health()).unwrap();
        assert_eq!(value["executionInFlight"], false);
        assert_eq!(value["lineCount"], 0);
        assert!(value["outcome"].is_null());
        assert!(value["moduleCards"].as_array().unwrap().is_empty());
    }
}
