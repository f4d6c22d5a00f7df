//! List registered versions and their traffic share.

use anyhow::Result;
use discovery_client::{AdminClient, VersionList};

use super::{project_ids, resolve_stack, VersionsArgs};
use crate::context::Context;
use crate::identity::{with_admin, AdminIdentity};
use crate::output::traffic_badge;

/// Run the versions command.
pub async fn run(args: VersionsArgs, ctx: &Context) -> Result<()> {
    let (project_id, mfe_id) = project_ids(ctx)?;

    let aws = ctx.aws();
    let stack = resolve_stack(&aws, ctx, &ctx.config.stack.name)?;
    let identity = AdminIdentity::new(&aws, &stack);

    let admin_api = stack.admin_api.as_str();
    let list = with_admin(&identity, |id_token| async move {
        let admin = AdminClient::new(admin_api, id_token, &ctx.config.fetch_policy())?;
        let spinner = ctx.output.spinner("Fetching versions...");
        let result = admin.list_versions(&project_id, &mfe_id).await;
        spinner.finish_and_clear();
        Ok::<_, anyhow::Error>(result?)
    })
    .await?;

    if ctx.output.is_json() {
        ctx.output.json(&list);
        return Ok(());
    }

    ctx.output.header(&format!("Versions of {}", ctx.config.frontend_key()));

    let rows = version_rows(&list, args.limit);
    if rows.is_empty() {
        ctx.output.info("No versions registered. Run `discovery setup` first.");
        return Ok(());
    }

    let widths = [12, 10, 50];
    ctx.output.table_row(&["VERSION", "TRAFFIC", "URL"], &widths);
    ctx.output.table_row(&["-------", "-------", "---"], &widths);
    for row in &rows {
        let traffic = traffic_badge(row.traffic);
        ctx.output
            .table_row(&[row.version.as_str(), traffic.as_str(), row.url.as_str()], &widths);
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct VersionRow {
    version: String,
    traffic: u8,
    url: String,
}

/// Join versions with their traffic share, keeping the last `limit`.
fn version_rows(list: &VersionList, limit: Option<usize>) -> Vec<VersionRow> {
    let rows: Vec<VersionRow> = list
        .versions
        .iter()
        .map(|descriptor| VersionRow {
            version: descriptor.metadata.version.clone(),
            traffic: list
                .active_versions
                .iter()
                .find(|active| active.version == descriptor.metadata.version)
                .map_or(0, |active| active.traffic),
            url: descriptor.url.clone(),
        })
        .collect();

    match limit {
        Some(n) if n < rows.len() => {
            let skip = rows.len() - n;
            rows.into_iter().skip(skip).collect()
        }
        _ => rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list() -> VersionList {
        serde_json::from_value(json!({
            "projectId": "p-1",
            "microFrontendId": "m-1",
            "versions": [
                { "url": "https://static.example.com/catalog-1.0.0.js", "metadata": { "version": "1.0.0" } },
                { "url": "https://static.example.com/catalog-2.0.0.js", "metadata": { "version": "2.0.0" } }
            ],
            "activeVersions": [
                { "version": "1.0.0", "traffic": 70 },
                { "version": "2.0.0", "traffic": 30 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_rows_carry_traffic() {
        let rows = version_rows(&list(), None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].traffic, 70);
        assert_eq!(rows[1].traffic, 30);
        assert_eq!(rows[1].url, "https://static.example.com/catalog-2.0.0.js");
    }

    #[test]
    fn test_limit_keeps_latest() {
        let rows = version_rows(&list(), Some(1));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version, "2.0.0");
    }

    #[test]
    fn test_inactive_version_has_no_traffic() {
        let mut list = list();
        list.active_versions.retain(|a| a.version == "2.0.0");
        assert_eq!(version_rows(&list, None)[0].traffic, 0);
    }
}
