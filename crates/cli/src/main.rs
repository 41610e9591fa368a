//! Conformance Autopilot CLI - Main Entry Point

use clap::{Parser, Subcommand};

use conformance_cli::commands::{run, serve, validate};
use conformance_cli::output;

/// Conformance Autopilot - automated OpenID Connect / FAPI conformance runs
#[derive(Parser)]
#[command(name = "conformance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a test plan
    Run(run::RunArgs),

    /// Check a plan configuration file
    Validate(validate::ValidateArgs),

    /// Start the dashboard
    Serve(serve::ServeArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let code = match cli.command {
        Commands::Run(args) => run::execute(args, cli.format).await?,
        Commands::Validate(args) => validate::execute(args).await?,
        Commands::Serve(args) => {
            serve::execute(args).await?;
            0
        }
        Commands::Version => {
            println!("Conformance Autopilot v{}", conformance_common::VERSION);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
