//! Serve Command
//!
//! Starts the dashboard web server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use conformance_runner::REQUEST_TIMEOUT_SECONDS_DEFAULT;
use conformance_web::DashboardConfig;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:3000", env = "CONFORMANCE_DASHBOARD_ADDR")]
    pub addr: String,

    /// Directory containing *.config.json plan files
    #[arg(long, default_value = ".")]
    pub configs_dir: PathBuf,

    /// Per-request timeout in seconds for runs launched from the dashboard
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECONDS_DEFAULT)]
    pub request_timeout: u64,

    /// Directory to resolve the `playwright` package from
    #[arg(long)]
    pub playwright_dir: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = args
        .addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", args.addr))?;

    if !args.configs_dir.is_dir() {
        anyhow::bail!("config directory {} does not exist", args.configs_dir.display());
    }

    conformance_web::serve(
        addr,
        DashboardConfig {
            configs_dir: args.configs_dir,
            request_timeout: Duration::from_secs(args.request_timeout),
            playwright_dir: args.playwright_dir,
        },
    )
    .await
}
