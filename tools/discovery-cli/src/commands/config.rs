//! Configuration management commands.

use std::fs;

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig, CONFIG_FILE};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Path => show_path(ctx),
        ConfigCommand::Init { force } => init_config(force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    let config = &ctx.config;

    ctx.output.info("[stack]");
    ctx.output.kv("name", &config.stack.name);
    if let Some(ref url) = config.stack.consumer_api {
        ctx.output.kv("consumer_api", url);
    }
    if let Some(ref url) = config.stack.admin_api {
        ctx.output.kv("admin_api", url);
    }
    if let Some(ref region) = config.stack.region {
        ctx.output.kv("region", region);
    }

    ctx.output.info("");
    ctx.output.info("[project]");
    ctx.output.kv("name", &config.project.name);
    ctx.output.kv("micro_frontend", &config.project.micro_frontend);
    ctx.output.kv("id", config.project.id.as_deref().unwrap_or("-"));
    ctx.output.kv(
        "micro_frontend_id",
        config.project.micro_frontend_id.as_deref().unwrap_or("-"),
    );

    ctx.output.info("");
    ctx.output.info("[monitor]");
    ctx.output.kv("users", &config.monitor.users.to_string());
    ctx.output.kv("baseline_version", &config.monitor.baseline_version);
    ctx.output.kv("completion", &config.monitor.completion.to_string());
    ctx.output.kv("poll_interval_secs", &config.monitor.poll_interval_secs.to_string());
    ctx.output.kv("poll_mode", &config.monitor.poll_mode.to_string());
    if let Some(secs) = config.monitor.timeout_secs {
        ctx.output.kv("timeout_secs", &secs.to_string());
    }

    ctx.output.info("");
    ctx.output.info("[deploy]");
    ctx.output.kv("target_version", &config.deploy.target_version);
    ctx.output.kv("strategy", config.deploy.strategy.as_str());
    if let Some(ref id) = config.deploy.last_deployment_id {
        ctx.output.kv("last_deployment_id", id);
    }

    ctx.output.info("");
    ctx.output.info("Versions:");
    for version in &config.versions {
        ctx.output.kv(&version.version, &version.url);
    }

    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    match &ctx.config_path {
        Some(path) => println!("{}", path.display()),
        None => ctx.output.warn(&format!(
            "No config file found; defaults are in use. Run `discovery config init` to create {}",
            CONFIG_FILE
        )),
    }
    Ok(())
}

fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join(CONFIG_FILE);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, generate_default_config())?;
    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let (errors, warnings) = check(&ctx.config);

    for warning in &warnings {
        ctx.output.warn(warning);
    }
    for error in &errors {
        ctx.output.error(error);
    }

    if !errors.is_empty() {
        bail!("Configuration has {} error(s)", errors.len());
    }

    ctx.output.success("Configuration is valid");
    Ok(())
}

/// Errors and warnings for `config`.
fn check(config: &CliConfig) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Err(e) = config.monitor_config().validate() {
        errors.push(format!("monitor: {}", e));
    }
    if config.monitor.poll_interval_secs == 0 {
        warnings.push("monitor.poll_interval_secs is 0; rounds will run back to back".to_string());
    }
    if config.project.name.trim().is_empty() || config.project.micro_frontend.trim().is_empty() {
        errors.push("project.name and project.micro_frontend are required".to_string());
    }
    if config.project.id.is_none() {
        warnings.push("project.id is not set; run `discovery setup`".to_string());
    }
    if !config
        .versions
        .iter()
        .any(|v| v.version == config.monitor.baseline_version)
    {
        warnings.push(format!(
            "baseline version {} is not among [[versions]]",
            config.monitor.baseline_version
        ));
    }
    if !config
        .versions
        .iter()
        .any(|v| v.version == config.deploy.target_version)
    {
        errors.push(format!(
            "deploy.target_version {} is not among [[versions]]",
            config.deploy.target_version
        ));
    }

    (errors, warnings)
}
