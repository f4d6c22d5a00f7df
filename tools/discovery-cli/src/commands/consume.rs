//! Watch simulated users move to the new version.

use std::io;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context as _, Result};
use futures::{Stream, StreamExt};
use discovery_client::{ConsumerClient, ConsumerApi};
use discovery_rollout::{
    ClientPoller, ConsoleRenderer, MonitorConfig, PollMode, Renderer, RolloutMonitor,
    RolloutOutcome, SessionStore, TableLayout,
};
use tokio::sync::watch;

use super::{resolve_stack, ConsumeArgs};
use crate::context::Context;
use crate::output::format_duration;

/// Run the consume command.
pub async fn run(args: ConsumeArgs, ctx: &Context) -> Result<RolloutOutcome> {
    let project_id = ctx
        .config
        .project
        .id
        .clone()
        .ok_or_else(|| anyhow!("No project ID. Run `discovery setup` or set PROJECT_ID"))?;

    let config = monitor_config(ctx, &args);
    config.validate()?;

    let consumer_api = match &ctx.config.stack.consumer_api {
        Some(url) => url.clone(),
        None => resolve_stack(&ctx.aws(), ctx, &ctx.config.stack.name)?.consumer_api,
    };

    let policy = ctx.config.fetch_policy();
    let client = ConsumerClient::new(consumer_api, &policy)
        .context("Failed to build HTTP client")?
        .with_cookie_name(ctx.config.monitor.session_cookie.as_str());
    let poller = ClientPoller::new(client, project_id, ctx.config.frontend_key(), policy.retry.clone())?;

    ctx.output.header(&format!("Watching {}", ctx.config.frontend_key()));
    ctx.output.kv("Endpoint", &poller.api().endpoint(poller.project_id()));
    ctx.output.kv("Users", &config.users.to_string());
    ctx.output.kv("Baseline", &config.baseline_version);
    ctx.output.kv("Completion", &config.completion.to_string());
    ctx.output.kv("Mode", &config.poll_mode.to_string());
    ctx.output.info("Press Ctrl-C to stop.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let presses = futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        });
        if forward_interrupts(Box::pin(presses), shutdown_tx).await {
            std::process::exit(RolloutOutcome::Cancelled { rounds: 0 }.exit_code());
        }
    });

    let started = Instant::now();
    let (outcome, store) = if ctx.output.is_json() {
        watch_rollout(config, poller, Silent, shutdown_rx).await?
    } else {
        let renderer = ConsoleRenderer::stdout(TableLayout::new(config.baseline_version.clone()));
        watch_rollout(config, poller, renderer, shutdown_rx).await?
    };

    report(ctx, outcome, &store, started.elapsed());
    Ok(outcome)
}

/// Turn Ctrl-C presses into a shutdown request.
///
/// The first press lets the current round finish. Returns `true` on a
/// second press, when the caller should exit without waiting.
async fn forward_interrupts<S>(mut presses: S, shutdown: watch::Sender<bool>) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if presses.next().await.is_none() {
        return false;
    }
    tracing::debug!("Interrupt received, stopping after this round");
    let _ = shutdown.send(true);
    presses.next().await.is_some()
}

/// Monitor settings from the config file with flags applied on top.
fn monitor_config(ctx: &Context, args: &ConsumeArgs) -> MonitorConfig {
    let mut config = ctx.config.monitor_config();
    if let Some(users) = args.users {
        config.users = users;
    }
    if let Some(baseline) = &args.baseline {
        config.baseline_version = baseline.clone();
    }
    if let Some(target) = &args.target {
        config.target_version = Some(target.clone());
    }
    if let Some(completion) = args.completion {
        config.completion = completion;
    }
    if let Some(secs) = args.interval {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = args.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }
    if args.concurrent {
        config.poll_mode = PollMode::Concurrent;
    }
    config
}

async fn watch_rollout<A, R>(
    config: MonitorConfig,
    poller: ClientPoller<A>,
    renderer: R,
    shutdown: watch::Receiver<bool>,
) -> Result<(RolloutOutcome, SessionStore)>
where
    A: ConsumerApi,
    R: Renderer,
{
    let mut monitor = RolloutMonitor::new(config, poller, renderer)?;
    let outcome = monitor.run(shutdown).await?;
    Ok((outcome, monitor.store().clone()))
}

fn report(ctx: &Context, outcome: RolloutOutcome, store: &SessionStore, elapsed: Duration) {
    let status = match outcome {
        RolloutOutcome::Complete { .. } => "complete",
        RolloutOutcome::Cancelled { .. } => "cancelled",
        RolloutOutcome::TimedOut { .. } => "timed-out",
    };

    if ctx.output.is_json() {
        let users: Vec<_> = store
            .iter()
            .map(|user| {
                serde_json::json!({
                    "user": user.index,
                    "requests": user.request_count,
                    "version": user.last_version,
                    "url": user.last_url,
                    "token": user.session_token.as_ref().map(|t| t.as_str()),
                    "error": user.last_failure,
                })
            })
            .collect();
        ctx.output.json(&serde_json::json!({
            "status": status,
            "rounds": outcome.rounds(),
            "elapsedSecs": elapsed.as_secs(),
            "users": users,
        }));
        return;
    }

    let summary = format!(
        "after {} rounds ({})",
        outcome.rounds(),
        format_duration(elapsed.as_secs())
    );
    match outcome {
        RolloutOutcome::Complete { .. } => {
            ctx.output.success(&format!("All users now receiving new version {}", summary))
        }
        RolloutOutcome::Cancelled { .. } => ctx.output.warn(&format!("Stopped {}", summary)),
        RolloutOutcome::TimedOut { .. } => {
            ctx.output.warn(&format!("Timed out {}", summary))
        }
    }
}

/// Renderer for JSON mode, where only the final summary is printed.
struct Silent;

impl Renderer for Silent {
    fn render(&mut self, _store: &SessionStore, round: u64) -> io::Result<()> {
        tracing::debug!(round, "round complete");
        Ok(())
    }
}
