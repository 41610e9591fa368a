//! Module poll loop
//!
//! Drives one registered module to a terminal state:
//!
//! ```text
//! loop until FINISHED / INTERRUPTED / timeout / cancellation
//!   info   = GET api/info/<id>          capture
//!   WAITING, not navigated:
//!     runner = GET api/runner/<id>      capture
//!     navigate(browser url)             capture final URL, once per module
//!     navigate(redirect_to) if captured capture final URL
//!   WAITING, navigated, has actions:
//!     logs = GET api/log/<id>           capture
//!     run each pending action in order  merge result immediately
//!   sleep(poll interval)
//! ```

use std::collections::HashSet;
use std::time::Duration;

use conformance_common::{
    capture_from_url, capture_from_value, ModuleConfig, TestState, Variables, WaitUntil,
};
use serde_json::Value;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::actions::ActionExecutor;
use crate::api::{ConformanceApi, ModuleInfo};
use crate::error::{RunnerError, RunnerResult};
use crate::events::{LogLine, ModuleCard, Reporter, RunEvent, Severity};
use crate::playwright::BrowserSession;
use crate::{CALLBACK_VARIABLE_NAME, POLL_INTERVAL_SECONDS_DEFAULT, TIMEOUT_SECONDS_DEFAULT};

/// Timing knobs for the poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Start modules that stop in CONFIGURED instead of waiting for the suite
    pub auto_start: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_seconds(POLL_INTERVAL_SECONDS_DEFAULT, TIMEOUT_SECONDS_DEFAULT)
    }
}

impl PollSettings {
    pub fn from_seconds(poll_interval: u64, timeout: u64) -> Self {
        Self {
            poll_interval: Duration::from_secs(poll_interval),
            timeout: Duration::from_secs(timeout),
            auto_start: false,
        }
    }
}

/// Mutable state of one module execution
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    pub module_name: String,
    pub runner_id: String,
    /// Variables captured so far; highest templating precedence
    pub captured: Variables,
    pub executed_actions: HashSet<String>,
    pub navigation_done: bool,
    pub started: bool,
    pub actions: Vec<String>,
    pub module_vars: Variables,
    pub wait_for: WaitUntil,
}

impl ModuleContext {
    pub fn new(module: &ModuleConfig, runner_id: impl Into<String>) -> Self {
        Self {
            module_name: module.name.clone(),
            runner_id: runner_id.into(),
            actions: module.action_names().to_vec(),
            module_vars: module.variables.clone(),
            wait_for: module.wait_for,
            ..Default::default()
        }
    }
}

/// Terminal status reached by a module
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalState {
    pub state: TestState,
    pub info: ModuleInfo,
}

/// Polls a single module until it finishes
pub struct ModulePoller<'a, A: ConformanceApi + ?Sized> {
    api: &'a A,
    executor: &'a ActionExecutor,
    settings: &'a PollSettings,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl<'a, A: ConformanceApi + ?Sized> ModulePoller<'a, A> {
    pub fn new(api: &'a A, executor: &'a ActionExecutor, settings: &'a PollSettings) -> Self {
        Self {
            api,
            executor,
            settings,
            cancel: CancellationToken::new(),
            reporter: Reporter::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Poll until the module reaches FINISHED or INTERRUPTED
    pub async fn poll(
        &self,
        ctx: &mut ModuleContext,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<TerminalState> {
        let deadline = Instant::now() + self.settings.timeout;
        let capture_vars = self.executor.capture_vars();

        while Instant::now() < deadline {
            if self.cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            let info = self.api.get_module_info(&ctx.runner_id).await?;
            capture_from_value(&info.raw, capture_vars, &mut ctx.captured);

            let message = format!("Polling... State: {}", info.status);
            self.reporter.info(Some(&ctx.module_name), message.clone());
            self.reporter.emit(RunEvent::ModuleUpdate(ModuleCard::update(
                &ctx.module_name,
                &info.status,
                info.result,
                &message,
            )));

            match info.status.clone() {
                state @ (TestState::Finished | TestState::Interrupted) => {
                    return Ok(TerminalState { state, info });
                }
                TestState::Waiting => {
                    if !ctx.navigation_done {
                        self.navigate_if_needed(ctx, browser).await?;
                    }
                    // Actions act on the redirect, so they wait for it
                    if ctx.navigation_done && !ctx.actions.is_empty() {
                        self.run_pending_actions(ctx, browser).await?;
                    }
                }
                TestState::Configured if self.settings.auto_start && !ctx.started => {
                    self.reporter.info(Some(&ctx.module_name), "Starting module");
                    self.api.start_module(&ctx.runner_id).await?;
                    ctx.started = true;
                }
                TestState::Unrecognized(ref raw) => {
                    self.reporter.warn(
                        Some(&ctx.module_name),
                        format!("Unrecognized state '{}', still polling", raw),
                    );
                }
                _ => {}
            }

            let wake = (Instant::now() + self.settings.poll_interval).min(deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RunnerError::Cancelled),
                _ = sleep_until(wake) => {}
            }
        }

        Err(RunnerError::PollTimeout {
            runner_id: ctx.runner_id.clone(),
        })
    }

    async fn navigate_if_needed(
        &self,
        ctx: &mut ModuleContext,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<()> {
        let capture_vars = self.executor.capture_vars();
        let runner = self.api.get_runner_info(&ctx.runner_id).await?;
        capture_from_value(&runner.raw, capture_vars, &mut ctx.captured);

        let Some(target) = runner.browser_url() else {
            self.reporter
                .info(Some(&ctx.module_name), "no browser URL found");
            return Ok(());
        };

        self.reporter
            .info(Some(&ctx.module_name), format!("Navigating to {}", target));
        let final_url = browser.navigate(target, ctx.wait_for).await?;
        capture_from_url(&final_url, capture_vars, &mut ctx.captured);
        self.reporter.info(
            Some(&ctx.module_name),
            format!("Navigation finished at {}", final_url),
        );

        if let Some(callback) = ctx.captured.get(CALLBACK_VARIABLE_NAME).cloned() {
            self.reporter.info(
                Some(&ctx.module_name),
                format!("Navigating to callback {}", callback),
            );
            let callback_url = browser.navigate(&callback, ctx.wait_for).await?;
            capture_from_url(&callback_url, capture_vars, &mut ctx.captured);
            self.reporter.info(
                Some(&ctx.module_name),
                format!("Callback finished at {}", callback_url),
            );
        }

        ctx.navigation_done = true;
        Ok(())
    }

    async fn run_pending_actions(
        &self,
        ctx: &mut ModuleContext,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<()> {
        let capture_vars = self.executor.capture_vars();
        let logs = self.api.get_module_logs(&ctx.runner_id).await?;
        capture_from_value(&Value::Array(logs), capture_vars, &mut ctx.captured);

        let names = ctx.actions.clone();
        for name in names {
            if ctx.executed_actions.contains(&name) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            self.reporter.log(
                LogLine::new(Severity::Info, "Executing action")
                    .module(&ctx.module_name)
                    .action(&name),
            );
            let captured = self
                .executor
                .execute_action(&name, &ctx.captured, &ctx.module_vars, browser)
                .await?;
            if !captured.is_empty() {
                let keys: Vec<&str> = captured.keys().map(String::as_str).collect();
                self.reporter.log(
                    LogLine::new(Severity::Info, format!("Captured {}", keys.join(", ")))
                        .module(&ctx.module_name)
                        .action(&name),
                );
            }
            ctx.captured.extend(captured);
            ctx.executed_actions.insert(name);
        }
        Ok(())
    }
}
