//! CLI command implementations.

pub mod cancel;
pub mod config;
pub mod consume;
pub mod deploy;
pub mod setup;
pub mod teardown;
pub mod versions;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use discovery_client::DeploymentStrategy;
use discovery_rollout::CompletionMode;

use crate::aws::AwsCli;
use crate::context::Context;
use crate::stack::{describe_stack, StackOutputs};

/// Arguments for the setup command.
#[derive(Args)]
pub struct SetupArgs {
    /// Stack to read outputs from (default: stack.name).
    pub stack: Option<String>,

    /// Don't write the created IDs back to the config file.
    #[arg(long)]
    pub no_save: bool,
}

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Version to roll out (default: deploy.target_version).
    #[arg(short, long)]
    pub target: Option<String>,

    /// Deployment strategy (default: deploy.strategy).
    #[arg(short, long)]
    pub strategy: Option<DeploymentStrategy>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run (don't actually deploy).
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the consume command.
#[derive(Args)]
pub struct ConsumeArgs {
    /// Number of simulated users.
    #[arg(short, long)]
    pub users: Option<usize>,

    /// Version served before the rollout.
    #[arg(short, long)]
    pub baseline: Option<String>,

    /// Version being rolled out.
    #[arg(short, long)]
    pub target: Option<String>,

    /// When the rollout counts as finished (all-updated, all-on-target).
    #[arg(long)]
    pub completion: Option<CompletionMode>,

    /// Seconds between rounds.
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Give up after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Poll all users of a round at once.
    #[arg(long)]
    pub concurrent: bool,
}

/// Arguments for the versions command.
#[derive(Args)]
pub struct VersionsArgs {
    /// Show only the last N versions.
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for the cancel command.
#[derive(Args)]
pub struct CancelArgs {
    /// Deployment to cancel (default: the last one started by `deploy`).
    pub deployment_id: Option<String>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Print the path of the config file in use.
    Path,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

/// Stack outputs with configured API URLs taking precedence.
pub(crate) fn resolve_stack(aws: &dyn AwsCli, ctx: &Context, stack_name: &str) -> Result<StackOutputs> {
    let spinner = ctx
        .output
        .spinner(&format!("Reading outputs of stack {}", stack_name));
    let result = describe_stack(aws, stack_name);
    spinner.finish_and_clear();

    let mut stack = result?;
    if let Some(url) = &ctx.config.stack.admin_api {
        stack.admin_api = url.clone();
    }
    if let Some(url) = &ctx.config.stack.consumer_api {
        stack.consumer_api = url.clone();
    }
    ctx.output.debug(&format!("Admin API: {}", stack.admin_api));
    ctx.output.debug(&format!("Consumer API: {}", stack.consumer_api));
    Ok(stack)
}

/// Project and micro-frontend IDs written by `setup`.
pub(crate) fn project_ids(ctx: &Context) -> Result<(String, String)> {
    let project_id = ctx
        .config
        .project
        .id
        .clone()
        .ok_or_else(|| anyhow!("No project ID. Run `discovery setup` or set PROJECT_ID"))?;
    let mfe_id = ctx
        .config
        .project
        .micro_frontend_id
        .clone()
        .ok_or_else(|| anyhow!("No micro-frontend ID. Run `discovery setup` or set MFE_ID"))?;
    Ok((project_id, mfe_id))
}
