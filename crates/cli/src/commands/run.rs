//! Run Command
//!
//! Executes every module of a plan configuration against a conformance
//! server and prints the summary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use conformance_common::{ExecutionSummary, PlanConfig};
use conformance_runner::{
    ConformanceClient, HttpClient, PlanRunner, PlaywrightConfig, PlaywrightLauncher, PollSettings,
    POLL_INTERVAL_SECONDS_DEFAULT, REQUEST_TIMEOUT_SECONDS_DEFAULT,
    TIMEOUT_SECONDS_DEFAULT,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::{EXIT_ABORTED, EXIT_FAILURES, EXIT_OK};
use crate::output::{print_error, print_success, print_warning, render_summary, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Plan configuration file (*.config.json)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Test plan ID on the conformance server
    #[arg(long, env = "CONFORMANCE_PLAN_ID")]
    pub plan_id: String,

    /// Conformance server base URL
    #[arg(long, env = "CONFORMANCE_SERVER_URL")]
    pub server_url: String,

    /// Bearer token for the conformance API
    #[arg(long, env = "CONFORMANCE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Seconds between status polls
    #[arg(long, default_value_t = POLL_INTERVAL_SECONDS_DEFAULT)]
    pub poll_interval: u64,

    /// Seconds before a module is considered stuck
    #[arg(long, default_value_t = TIMEOUT_SECONDS_DEFAULT)]
    pub timeout: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECONDS_DEFAULT)]
    pub request_timeout: u64,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Start modules that stop in CONFIGURED
    #[arg(long)]
    pub auto_start: bool,

    /// Also write the summary to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: RunArgs, format: OutputFormat) -> Result<i32> {
    let plan = match PlanConfig::load(&args.config) {
        Ok(plan) => plan,
        Err(e) => {
            print_error(&format!("{}: {}", args.config.display(), e));
            return Ok(EXIT_ABORTED);
        }
    };

    let http = match HttpClient::new(
        &args.server_url,
        &args.token,
        Duration::from_secs(args.request_timeout),
    ) {
        Ok(http) => http,
        Err(e) => {
            print_error(&e.to_string());
            return Ok(EXIT_ABORTED);
        }
    };

    let mut settings = PollSettings::from_seconds(args.poll_interval, args.timeout);
    settings.auto_start = args.auto_start;
    let launcher = PlaywrightLauncher::new(PlaywrightConfig {
        headless: !args.headed,
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current poll");
            ctrl_c.cancel();
        }
    });

    let runner = PlanRunner::new(ConformanceClient::new(http.clone()), launcher, http, settings)
        .with_cancellation(cancel);

    info!(
        "Running {} module(s) from {} against {}",
        plan.modules.len(),
        args.config.display(),
        args.server_url
    );

    let (summary, code) = match runner.execute_plan(&args.plan_id, &plan).await {
        Ok(summary) => {
            let code = if summary.has_failures() {
                EXIT_FAILURES
            } else {
                EXIT_OK
            };
            (summary, code)
        }
        Err(aborted) => {
            print_error(&aborted.to_string());
            (*aborted.partial, EXIT_ABORTED)
        }
    };

    report(&summary, format, args.output.as_ref())?;
    Ok(code)
}

fn report(summary: &ExecutionSummary, format: OutputFormat, output: Option<&PathBuf>) -> Result<()> {
    let rendered = render_summary(summary, format)?;
    println!("{}", rendered);

    if let Some(path) = output {
        std::fs::write(path, format!("{}\n", rendered))?;
        print_success(&format!("Summary written to {}", path.display()));
    }

    if summary.stopped {
        print_warning("Execution was stopped before all modules ran");
    }
    Ok(())
}
