//! Plan execution
//!
//! Runs the modules of a plan one after another, each with its own browser
//! session, and aggregates their outcomes into an [`ExecutionSummary`].

use conformance_common::{
    capture_from_value, ExecutionSummary, ModuleConfig, ModuleResult, PlanConfig, TestResult,
    TestState,
};
use tokio_util::sync::CancellationToken;

use crate::actions::ActionExecutor;
use crate::api::ConformanceApi;
use crate::error::{PlanAborted, RunnerError, RunnerResult};
use crate::events::{ModuleCard, Reporter, RunEvent};
use crate::http::HttpClient;
use crate::playwright::{BrowserLauncher, BrowserSession};
use crate::poller::{ModuleContext, ModulePoller, PollSettings, TerminalState};

/// Sequential plan executor
pub struct PlanRunner<A: ConformanceApi, L: BrowserLauncher> {
    api: A,
    launcher: L,
    http: HttpClient,
    settings: PollSettings,
    reporter: Reporter,
    cancel: CancellationToken,
}

impl<A: ConformanceApi, L: BrowserLauncher> PlanRunner<A, L> {
    /// `http` is used for action requests
    pub fn new(api: A, launcher: L, http: HttpClient, settings: PollSettings) -> Self {
        Self {
            api,
            launcher,
            http,
            settings,
            reporter: Reporter::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Execute every module of `config` in declared order
    ///
    /// The first module failure aborts the plan. Cancellation is not a
    /// failure: the summary is returned with `stopped` set.
    pub async fn execute_plan(
        &self,
        plan_id: &str,
        config: &PlanConfig,
    ) -> Result<ExecutionSummary, PlanAborted> {
        let executor = ActionExecutor::new(config, self.http.clone());
        let mut summary = ExecutionSummary::new(plan_id);
        let mut cards: Vec<ModuleCard> = config
            .modules
            .iter()
            .map(|module| ModuleCard::pending(&module.name))
            .collect();

        self.reporter.emit(RunEvent::ModuleList(cards.clone()));
        self.reporter.info(
            None,
            format!("Executing plan {} ({} modules)", plan_id, config.modules.len()),
        );

        for (index, module) in config.modules.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.skip_remaining(&mut summary, &config.modules[index..], &mut cards);
                return Ok(self.finish_stopped(summary, cards));
            }

            let mut ctx = ModuleContext::new(module, String::new());
            let mut browser = self.launcher.launch();
            let outcome = self
                .execute_module(plan_id, &executor, &mut ctx, browser.as_mut())
                .await;
            browser.close().await;

            match outcome {
                Ok(terminal) => {
                    let message = format!("{} ({})", terminal.state, terminal.info.result);
                    self.reporter
                        .info(Some(&module.name), format!("Finished: {}", message));
                    self.update_card(
                        &mut cards[index],
                        ModuleCard::update(&module.name, &terminal.state, terminal.info.result, &message),
                    );
                    summary.record(ModuleResult {
                        name: ctx.module_name,
                        runner_id: ctx.runner_id,
                        state: terminal.state,
                        result: terminal.info.result,
                        captured: ctx.captured,
                        error_message: None,
                    });
                }
                Err(RunnerError::Cancelled) => {
                    self.reporter.warn(Some(&module.name), "Stopped");
                    self.update_card(
                        &mut cards[index],
                        ModuleCard::update(&module.name, &TestState::Interrupted, TestResult::Unknown, "stopped"),
                    );
                    summary.record(ModuleResult {
                        name: ctx.module_name,
                        runner_id: ctx.runner_id,
                        state: TestState::Interrupted,
                        result: TestResult::Unknown,
                        captured: ctx.captured,
                        error_message: Some("stopped".to_string()),
                    });
                    self.skip_remaining(&mut summary, &config.modules[index + 1..], &mut cards);
                    return Ok(self.finish_stopped(summary, cards));
                }
                Err(source) => {
                    let message = source.to_string();
                    self.reporter.error(Some(&module.name), message.clone());
                    self.update_card(
                        &mut cards[index],
                        ModuleCard {
                            name: module.name.clone(),
                            status: "ERROR".to_string(),
                            result: String::new(),
                            last_message: message,
                        },
                    );
                    return Err(PlanAborted {
                        module: module.name.clone(),
                        source,
                        partial: Box::new(summary),
                    });
                }
            }
        }

        self.reporter.info(
            None,
            format!(
                "Plan {} done: {} total, {} passed, {} failed, {} warning, {} skipped, {} interrupted, {} not run",
                summary.plan_id,
                summary.total,
                summary.passed,
                summary.failed,
                summary.warning,
                summary.skipped,
                summary.interrupted,
                summary.not_run
            ),
        );
        self.reporter.emit(RunEvent::PlanDone(summary.clone()));
        Ok(summary)
    }

    async fn execute_module(
        &self,
        plan_id: &str,
        executor: &ActionExecutor,
        ctx: &mut ModuleContext,
        browser: &mut dyn BrowserSession,
    ) -> RunnerResult<TerminalState> {
        self.reporter.info(Some(&ctx.module_name), "Registering...");
        let registration = self.api.register_runner(plan_id, &ctx.module_name).await?;
        capture_from_value(&registration.raw, executor.capture_vars(), &mut ctx.captured);
        ctx.runner_id = registration.id;
        self.reporter.info(
            Some(&ctx.module_name),
            format!("Registering... OK (ID: {})", ctx.runner_id),
        );

        ModulePoller::new(&self.api, executor, &self.settings)
            .with_cancellation(self.cancel.clone())
            .with_reporter(self.reporter.clone())
            .poll(ctx, browser)
            .await
    }

    fn skip_remaining(
        &self,
        summary: &mut ExecutionSummary,
        remaining: &[ModuleConfig],
        cards: &mut [ModuleCard],
    ) {
        let offset = cards.len() - remaining.len();
        for (module, card) in remaining.iter().zip(cards[offset..].iter_mut()) {
            self.update_card(
                card,
                ModuleCard::update(&module.name, &TestState::Created, TestResult::Skipped, "not run"),
            );
            summary.record(ModuleResult {
                name: module.name.clone(),
                runner_id: String::new(),
                state: TestState::Created,
                result: TestResult::Skipped,
                captured: Default::default(),
                error_message: Some("not run".to_string()),
            });
        }
    }

    fn finish_stopped(&self, mut summary: ExecutionSummary, cards: Vec<ModuleCard>) -> ExecutionSummary {
        summary.stopped = true;
        self.reporter.warn(None, "Execution stopped");
        self.reporter.emit(RunEvent::Stopped(cards));
        summary
    }

    fn update_card(&self, slot: &mut ModuleCard, card: ModuleCard) {
        *slot = card.clone();
        self.reporter.emit(RunEvent::ModuleUpdate(card));
    }
}
