//! Create the demo project, micro-frontend and versions.

use anyhow::Result;
use discovery_client::{AdminClient, NewVersion};
use serde_json::json;

use super::{resolve_stack, SetupArgs};
use crate::context::Context;
use crate::identity::{with_admin, AdminIdentity};

/// Run the setup command.
pub async fn run(args: SetupArgs, ctx: &Context) -> Result<()> {
    ctx.output.header("Setting up demo project");

    ctx.output.step(1, 4, "Reading stack outputs");
    let stack_name = args.stack.as_deref().unwrap_or(&ctx.config.stack.name);
    ctx.output.kv("Stack", stack_name);
    let aws = ctx.aws();
    let stack = resolve_stack(&aws, ctx, stack_name)?;

    ctx.output.step(2, 4, "Provisioning admin user");
    let identity = AdminIdentity::new(&aws, &stack);
    ctx.output.kv("User", identity.username());

    let admin_api = stack.admin_api.as_str();
    let (project_id, mfe_id, created) = with_admin(&identity, |id_token| async move {
        ctx.output.step(3, 4, "Creating project, micro-frontend and versions");
        let admin = AdminClient::new(admin_api, id_token, &ctx.config.fetch_policy())?;

        let project = admin.create_project(&ctx.config.project.name).await?;
        print_response(ctx, "Project", &project);

        let mfe = admin
            .create_micro_frontend(&project.id, &ctx.config.project.micro_frontend)
            .await?;
        print_response(ctx, "Micro-frontend", &mfe);

        let mut created = Vec::with_capacity(ctx.config.versions.len());
        for seed in &ctx.config.versions {
            let request = NewVersion {
                version: seed.descriptor(),
                deployment_strategy: None,
            };
            let version = admin
                .create_version(&project.id, &mfe.micro_frontend_id, &request)
                .await?;
            print_response(ctx, &format!("Version {}", seed.version), &version);
            created.push(seed.version.clone());
        }

        Ok::<_, anyhow::Error>((project.id, mfe.micro_frontend_id, created))
    })
    .await?;

    if args.no_save {
        ctx.output.step(4, 4, "Skipping config update (--no-save)");
    } else {
        ctx.output.step(4, 4, "Saving IDs to config");
        let path = ctx.update_config(|config| {
            config.stack.name = stack_name.to_string();
            config.stack.consumer_api = Some(stack.consumer_api.clone());
            config.project.id = Some(project_id.clone());
            config.project.micro_frontend_id = Some(mfe_id.clone());
        })?;
        ctx.output.debug(&format!("Updated {}", path.display()));
    }

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "projectId": project_id,
            "microFrontendId": mfe_id,
            "versions": created,
        }));
        return Ok(());
    }

    ctx.output.success("Setup complete");
    ctx.output.kv("PROJECT_ID", &project_id);
    ctx.output.kv("MFE_ID", &mfe_id);
    ctx.output.kv("Consumer API", &stack.consumer_api);

    Ok(())
}

fn print_response<T: serde::Serialize>(ctx: &Context, label: &str, value: &T) {
    if ctx.output.is_json() {
        return;
    }
    ctx.output.kv(label, "");
    ctx.output.json(value);
}
