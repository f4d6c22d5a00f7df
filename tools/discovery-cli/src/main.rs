//! Discovery CLI - Demo driver for the frontend discovery service.
//!
//! Commands:
//! - `discovery setup` - Create the demo project, micro-frontend and versions
//! - `discovery deploy` - Start a gradual deployment of the new version
//! - `discovery consume` - Watch simulated users move to the new version
//! - `discovery versions` - List versions and their traffic share
//! - `discovery cancel` - Cancel a running deployment
//! - `discovery teardown` - Remove a leftover admin user
//! - `discovery config` - Manage configuration

mod aws;
mod commands;
mod config;
mod context;
mod identity;
mod output;
mod stack;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CancelArgs, ConfigArgs, ConsumeArgs, DeployArgs, SetupArgs, VersionsArgs};

/// Discovery CLI - Set up, deploy and watch micro-frontend rollouts
#[derive(Parser)]
#[command(name = "discovery")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the demo project, micro-frontend and versions
    Setup(SetupArgs),

    /// Start a deployment of the target version
    Deploy(DeployArgs),

    /// Poll as simulated users until all are on the new version
    Consume(ConsumeArgs),

    /// List versions and their traffic share
    Versions(VersionsArgs),

    /// Cancel a running deployment
    Cancel(CancelArgs),

    /// Remove the temporary admin user
    Teardown,

    /// Manage configuration
    Config(ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "discovery={0},discovery_client={0},discovery_rollout={0}",
            level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    // Execute command
    let result = match cli.command {
        Commands::Setup(args) => commands::setup::run(args, &ctx).await.map(|()| 0),
        Commands::Deploy(args) => commands::deploy::run(args, &ctx).await.map(|()| 0),
        Commands::Consume(args) => commands::consume::run(args, &ctx)
            .await
            .map(|outcome| outcome.exit_code()),
        Commands::Versions(args) => commands::versions::run(args, &ctx).await.map(|()| 0),
        Commands::Cancel(args) => commands::cancel::run(args, &ctx).await.map(|()| 0),
        Commands::Teardown => commands::teardown::run(&ctx).await.map(|()| 0),
        Commands::Config(args) => commands::config::run(args, &ctx).await.map(|()| 0),
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
