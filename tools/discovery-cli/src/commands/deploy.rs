//! Start a deployment of the target version.

use anyhow::{Context as _, Result};
use dialoguer::Confirm;
use discovery_client::{AdminClient, DeploymentRequest};

use super::{project_ids, resolve_stack, DeployArgs};
use crate::context::Context;
use crate::identity::{with_admin, AdminIdentity};

/// Run the deploy command.
pub async fn run(args: DeployArgs, ctx: &Context) -> Result<()> {
    let (project_id, mfe_id) = project_ids(ctx)?;
    let request = DeploymentRequest {
        target_version: args
            .target
            .clone()
            .unwrap_or_else(|| ctx.config.deploy.target_version.clone()),
        deployment_strategy: args.strategy.unwrap_or(ctx.config.deploy.strategy),
    };

    ctx.output.header(&format!("Deploying {}", ctx.config.frontend_key()));

    ctx.output.step(1, 4, "Validating configuration");
    ctx.output.kv("Project", &project_id);
    ctx.output.kv("Micro-frontend", &mfe_id);
    ctx.output.kv("Target version", &request.target_version);
    ctx.output.kv("Strategy", request.deployment_strategy.as_str());

    if !args.yes && !args.dry_run && !ctx.output.is_json() {
        ctx.output.info("");
        let confirmed = Confirm::new()
            .with_prompt("Proceed with deployment?")
            .default(true)
            .interact()?;

        if !confirmed {
            ctx.output.warn("Deployment cancelled");
            return Ok(());
        }
    }

    if args.dry_run {
        ctx.output.step(2, 4, "Dry run - skipping admin user");
        ctx.output.step(3, 4, "Dry run - skipping deployment");
        ctx.output.step(4, 4, "Done (dry run)");
        ctx.output.json(&request);
        ctx.output.success("Dry run completed successfully");
        return Ok(());
    }

    ctx.output.step(2, 4, "Provisioning admin user");
    let aws = ctx.aws();
    let stack = resolve_stack(&aws, ctx, &ctx.config.stack.name)?;
    let identity = AdminIdentity::new(&aws, &stack);

    let admin_api = stack.admin_api.as_str();
    let request_ref = &request;
    let deployment = with_admin(&identity, |id_token| async move {
        ctx.output.step(3, 4, "Starting deployment");
        let admin = AdminClient::new(admin_api, id_token, &ctx.config.fetch_policy())?;

        let spinner = ctx.output.spinner("Deploying...");
        let result = admin
            .create_deployment(&project_id, &mfe_id, request_ref)
            .await;
        spinner.finish_and_clear();

        result.context("Deployment was not created")
    })
    .await?;

    ctx.output.step(4, 4, "Recording deployment");
    let deployment_id = deployment.deployment_id.clone();
    let path = ctx.update_config(|config| {
        config.deploy.last_deployment_id = Some(deployment_id);
    })?;
    ctx.output.debug(&format!("Updated {}", path.display()));

    if ctx.output.is_json() {
        ctx.output.json(&deployment);
        return Ok(());
    }

    ctx.output.success("Deployment started");
    ctx.output.kv("Deployment ID", &deployment.deployment_id);
    ctx.output.info("");
    ctx.output.info("Run `discovery consume` to watch users move to the new version.");

    Ok(())
}
