//! Remove the admin user left behind by an interrupted run.

use anyhow::Result;

use super::resolve_stack;
use crate::context::Context;
use crate::identity::AdminIdentity;

/// Run the teardown command.
pub async fn run(ctx: &Context) -> Result<()> {
    let aws = ctx.aws();
    let stack = resolve_stack(&aws, ctx, &ctx.config.stack.name)?;
    let identity = AdminIdentity::new(&aws, &stack);

    let spinner = ctx
        .output
        .spinner(&format!("Deleting admin user {}", identity.username()));
    let result = identity.delete();
    spinner.finish_and_clear();
    result?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "deleted": identity.username() }));
    } else {
        ctx.output.success(&format!("Admin user {} removed", identity.username()));
    }

    Ok(())
}
