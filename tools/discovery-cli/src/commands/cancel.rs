//! Cancel a running deployment.

use anyhow::{anyhow, Result};
use dialoguer::Confirm;
use discovery_client::AdminClient;

use super::{project_ids, resolve_stack, CancelArgs};
use crate::context::Context;
use crate::identity::{with_admin, AdminIdentity};

/// Run the cancel command.
pub async fn run(args: CancelArgs, ctx: &Context) -> Result<()> {
    let (project_id, mfe_id) = project_ids(ctx)?;
    let deployment_id = args
        .deployment_id
        .clone()
        .or_else(|| ctx.config.deploy.last_deployment_id.clone())
        .ok_or_else(|| anyhow!("No deployment to cancel. Pass a deployment ID"))?;

    ctx.output.header("Cancelling deployment");
    ctx.output.kv("Deployment ID", &deployment_id);

    if !args.yes && !ctx.output.is_json() {
        let confirmed = Confirm::new()
            .with_prompt(format!("Cancel deployment {}?", deployment_id))
            .default(false)
            .interact()?;

        if !confirmed {
            ctx.output.warn("Cancel aborted");
            return Ok(());
        }
    }

    let aws = ctx.aws();
    let stack = resolve_stack(&aws, ctx, &ctx.config.stack.name)?;
    let identity = AdminIdentity::new(&aws, &stack);

    let admin_api = stack.admin_api.as_str();
    let id = deployment_id.as_str();
    with_admin(&identity, |id_token| async move {
        let admin = AdminClient::new(admin_api, id_token, &ctx.config.fetch_policy())?;
        admin.cancel_deployment(&project_id, &mfe_id, id).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await?;

    if ctx.config.deploy.last_deployment_id.as_deref() == Some(deployment_id.as_str()) {
        ctx.update_config(|config| config.deploy.last_deployment_id = None)?;
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "cancelled": deployment_id }));
    } else {
        ctx.output.success("Deployment cancelled; traffic returns to the previous version");
    }

    Ok(())
}
