//! The rollout observation loop.
//!
//! Each round polls every simulated user, applies the results to the
//! session store, renders the store and then checks whether the rollout
//! has reached every user. Cancellation and the optional timeout are only
//! honoured between rounds, so the completion check never sees a partial
//! round.

use std::io;
use std::time::Instant;

use discovery_client::ConsumerApi;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{Completion, ConfigError, MonitorConfig, PollMode};
use crate::poller::{ClientPoller, PollError};
use crate::render::Renderer;
use crate::session::{Observation, SessionStore, StoreError};

/// Error that ends a monitor run.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("invalid monitor configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Poll(#[source] PollError),

    #[error("session store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to render: {0}")]
    Render(#[from] io::Error),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutOutcome {
    /// Every user reached the new version.
    Complete { rounds: u64 },
    /// The operator asked to stop.
    Cancelled { rounds: u64 },
    /// The configured timeout elapsed first.
    TimedOut { rounds: u64 },
}

impl RolloutOutcome {
    /// Process exit status for the outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Complete { .. } => 0,
            Self::TimedOut { .. } => 2,
            Self::Cancelled { .. } => 130,
        }
    }

    /// Rounds completed before the run ended.
    pub fn rounds(&self) -> u64 {
        match self {
            Self::Complete { rounds } | Self::Cancelled { rounds } | Self::TimedOut { rounds } => {
                *rounds
            }
        }
    }
}

/// Summary of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    /// 1-based round number.
    pub round: u64,
    /// Users whose poll succeeded.
    pub updated: usize,
    /// Users skipped this round.
    pub failed: usize,
    /// Whether the completion predicate held after the round.
    pub complete: bool,
}

/// Drives rounds of polls until the rollout completes.
pub struct RolloutMonitor<A, R> {
    config: MonitorConfig,
    completion: Completion,
    poller: ClientPoller<A>,
    store: SessionStore,
    renderer: R,
    rounds: u64,
}

impl<A, R> RolloutMonitor<A, R>
where
    A: ConsumerApi,
    R: Renderer,
{
    /// Create a monitor. The configuration is validated here, before any
    /// request is made.
    pub fn new(config: MonitorConfig, poller: ClientPoller<A>, renderer: R) -> Result<Self, MonitorError> {
        config.validate()?;

        Ok(Self {
            completion: config.completion(),
            store: SessionStore::new(config.users),
            config,
            poller,
            renderer,
            rounds: 0,
        })
    }

    /// Current per-user state.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Run rounds until the rollout completes, `shutdown` turns true, or
    /// the timeout passes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<RolloutOutcome, MonitorError> {
        let started = Instant::now();

        info!(
            users = self.config.users,
            baseline = %self.config.baseline_version,
            mode = %self.config.poll_mode,
            interval = ?self.config.poll_interval,
            "Starting rollout monitor"
        );

        loop {
            if *shutdown.borrow() {
                return Ok(RolloutOutcome::Cancelled { rounds: self.rounds });
            }

            let report = self.run_round().await?;
            if report.complete {
                info!(rounds = report.round, "All users now receiving new version.");
                return Ok(RolloutOutcome::Complete { rounds: report.round });
            }

            if let Some(timeout) = self.config.timeout {
                if started.elapsed() >= timeout {
                    return Ok(RolloutOutcome::TimedOut { rounds: self.rounds });
                }
            }

            if self.pause(&mut shutdown).await {
                return Ok(RolloutOutcome::Cancelled { rounds: self.rounds });
            }
        }
    }

    /// Poll every user once, render, and evaluate completion.
    pub async fn run_round(&mut self) -> Result<RoundReport, MonitorError> {
        let results = self.poll_all().await;

        let mut updated = 0;
        let mut failed = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(observation) => {
                    self.store.update(index, observation)?;
                    updated += 1;
                }
                Err(err) if err.is_fatal() => return Err(MonitorError::Poll(err)),
                Err(err) => {
                    debug!(user = index, error = %err, "Poll failed, skipping user this round");
                    self.store.record_failure(index, err.to_string())?;
                    failed += 1;
                }
            }
        }

        self.rounds += 1;
        self.renderer.render(&self.store, self.rounds)?;

        let report = RoundReport {
            round: self.rounds,
            updated,
            failed,
            complete: self.store.is_complete(&self.completion),
        };
        debug!(?report, "Round finished");
        Ok(report)
    }

    /// Poll all users. Results are returned in index order and nothing is
    /// written to the store until every poll has finished.
    async fn poll_all(&self) -> Vec<Result<Observation, PollError>> {
        match self.config.poll_mode {
            PollMode::Sequential => {
                let mut results = Vec::with_capacity(self.store.len());
                for user in self.store.iter() {
                    let result = self.poller.poll(user.session_token.as_ref()).await;
                    let fatal = matches!(&result, Err(err) if err.is_fatal());
                    results.push(result);
                    if fatal {
                        break;
                    }
                }
                results
            }
            PollMode::Concurrent => {
                join_all(
                    self.store
                        .iter()
                        .map(|user| self.poller.poll(user.session_token.as_ref())),
                )
                .await
            }
        }
    }

    /// Sleep for the poll interval. Returns true if shutdown was requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.poll_interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        // Sender gone: nobody can cancel any more.
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use discovery_client::{
        BackoffStrategy, ConsumerResponse, FetchError, FrontendsDocument, RetryPolicy, SessionToken,
    };
    use serde_json::json;

    use crate::config::CompletionMode;

    const KEY: &str = "my-project/catalog";

    /// What the fake consumer API serves for a single request.
    #[derive(Clone)]
    enum Reply {
        Version(&'static str),
        NoVersionField,
        NoFrontend,
        Down,
    }

    /// Consumer API fake. Each request takes the next reply from the
    /// script of the user identified by its token; tokens are `user-{i}`
    /// and issued on first contact in the order users are polled.
    struct FakeConsumer {
        replies: Mutex<Vec<VecDeque<Reply>>>,
        next_unknown: Mutex<usize>,
        sent_tokens: Mutex<Vec<Option<SessionToken>>>,
    }

    impl FakeConsumer {
        /// One script per user, consumed one reply per request.
        fn new(scripts: Vec<Vec<Reply>>) -> Self {
            Self {
                replies: Mutex::new(scripts.into_iter().map(VecDeque::from).collect()),
                next_unknown: Mutex::new(0),
                sent_tokens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConsumerApi for FakeConsumer {
        async fn micro_frontends(
            &self,
            _project_id: &str,
            token: Option<&SessionToken>,
        ) -> Result<ConsumerResponse, FetchError> {
            self.sent_tokens.lock().unwrap().push(token.cloned());

            let user = match token {
                Some(t) => t.as_str().trim_start_matches("user-").parse::<usize>().unwrap(),
                None => {
                    let mut next = self.next_unknown.lock().unwrap();
                    *next += 1;
                    *next - 1
                }
            };
            let reply = self.replies.lock().unwrap()[user]
                .pop_front()
                .unwrap_or(Reply::Version("1.0.0"));
            let issued_token = Some(SessionToken::new(format!("user-{}", user)));

            let entry = match reply {
                Reply::Version(v) => json!({
                    "url": format!("https://static.example.com/catalog-{}.js", v),
                    "metadata": { "version": v }
                }),
                Reply::NoVersionField => json!({ "url": "https://static.example.com/catalog.js" }),
                Reply::NoFrontend => {
                    return Ok(ConsumerResponse {
                        document: FrontendsDocument::default(),
                        issued_token,
                    })
                }
                Reply::Down => return Err(FetchError::Connection("refused".into())),
            };

            let document = serde_json::from_value(json!({ "microFrontends": { KEY: [entry] } })).unwrap();
            Ok(ConsumerResponse {
                document,
                issued_token,
            })
        }
    }

    /// Renderer that keeps every frame's versions.
    #[derive(Default)]
    struct Recording {
        frames: Vec<Vec<String>>,
    }

    impl Renderer for Recording {
        fn render(&mut self, store: &SessionStore, _round: u64) -> io::Result<()> {
            self.frames
                .push(store.iter().map(|u| u.last_version.clone()).collect());
            Ok(())
        }
    }

    fn monitor(
        api: FakeConsumer,
        users: usize,
        mode: PollMode,
    ) -> RolloutMonitor<FakeConsumer, Recording> {
        let mut config = MonitorConfig::new(users, "1.0.0");
        config.poll_interval = Duration::ZERO;
        config.poll_mode = mode;
        let retry = RetryPolicy::new(1).with_backoff(BackoffStrategy::None);
        let poller = ClientPoller::new(api, "p-1", KEY, retry).unwrap();
        RolloutMonitor::new(config, poller, Recording::default()).unwrap()
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_two_users_three_rounds() {
        use Reply::Version as V;
        let api = FakeConsumer::new(vec![
            vec![V("1.0.0"), V("2.0.0"), V("2.0.0")],
            vec![V("1.0.0"), V("1.0.0"), V("2.0.0")],
        ]);
        let mut monitor = monitor(api, 2, PollMode::Sequential);

        let outcome = monitor.run(no_shutdown()).await.unwrap();

        assert_eq!(outcome, RolloutOutcome::Complete { rounds: 3 });
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            monitor.renderer.frames,
            vec![
                vec!["1.0.0".to_string(), "1.0.0".to_string()],
                vec!["2.0.0".to_string(), "1.0.0".to_string()],
                vec!["2.0.0".to_string(), "2.0.0".to_string()],
            ]
        );
        for user in monitor.store().iter() {
            assert_eq!(user.request_count, 3);
        }
    }

    #[tokio::test]
    async fn test_straggler_keeps_loop_running() {
        use Reply::Version as V;
        let api = FakeConsumer::new(vec![vec![V("2.0.0")], vec![V("1.0.0")], vec![V("2.0.0")]]);
        let mut monitor = monitor(api, 3, PollMode::Sequential);

        let report = monitor.run_round().await.unwrap();
        assert!(!report.complete);
        assert_eq!(report.updated, 3);
    }

    #[tokio::test]
    async fn test_tokens_are_presented_after_first_round() {
        use Reply::Version as V;
        let api = FakeConsumer::new(vec![vec![V("1.0.0"); 2], vec![V("1.0.0"); 2]]);
        let mut monitor = monitor(api, 2, PollMode::Sequential);

        monitor.run_round().await.unwrap();
        monitor.run_round().await.unwrap();

        let sent = monitor.poller_api().sent_tokens.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                None,
                None,
                Some(SessionToken::from("user-0")),
                Some(SessionToken::from("user-1")),
            ]
        );
        assert_eq!(
            monitor.store().get(1).unwrap().session_token,
            Some(SessionToken::from("user-1"))
        );
    }

    #[tokio::test]
    async fn test_malformed_reply_only_affects_that_user() {
        use Reply::{NoVersionField, Version as V};
        let api = FakeConsumer::new(vec![
            vec![V("1.0.0"), V("2.0.0"), V("2.0.0")],
            vec![V("1.0.0"), NoVersionField, V("2.0.0")],
        ]);
        let mut monitor = monitor(api, 2, PollMode::Sequential);

        monitor.run_round().await.unwrap();
        let report = monitor.run_round().await.unwrap();
        assert_eq!((report.updated, report.failed), (1, 1));
        assert!(!report.complete);

        let broken = monitor.store().get(1).unwrap();
        assert_eq!(broken.request_count, 1);
        assert_eq!(broken.last_version, "1.0.0");
        assert!(broken.is_failing());
        assert_eq!(monitor.store().get(0).unwrap().last_version, "2.0.0");

        assert!(monitor.run_round().await.unwrap().complete);
    }

    #[tokio::test]
    async fn test_failed_user_does_not_count_as_updated() {
        use Reply::{Down, Version as V};
        let api = FakeConsumer::new(vec![
            vec![V("1.0.0"), V("2.0.0")],
            vec![V("2.0.0"), Down, Down],
        ]);
        let mut monitor = monitor(api, 2, PollMode::Concurrent);

        monitor.run_round().await.unwrap();
        let report = monitor.run_round().await.unwrap();
        assert_eq!((report.updated, report.failed), (1, 1));
        assert!(!report.complete);

        let down = monitor.store().get(1).unwrap();
        assert_eq!(down.request_count, 1);
        assert_eq!(monitor.store().first_failure().map(|(index, _)| index), Some(1));
        assert_eq!(down.last_version, "2.0.0");
        assert!(down.is_failing());
    }

    #[tokio::test]
    async fn test_missing_frontend_aborts_run() {
        use Reply::{NoFrontend, Version as V};
        let api = FakeConsumer::new(vec![vec![NoFrontend], vec![V("1.0.0")]]);
        let mut monitor = monitor(api, 2, PollMode::Sequential);

        let err = monitor.run(no_shutdown()).await.unwrap_err();
        assert!(matches!(err, MonitorError::Poll(PollError::MissingFrontend(_))));
        assert_eq!(monitor.rounds(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_mode_matches_sequential() {
        use Reply::Version as V;
        let api = FakeConsumer::new(vec![vec![V("1.0.0"), V("2.0.0")]; 3]);
        let mut monitor = monitor(api, 3, PollMode::Concurrent);

        let outcome = monitor.run(no_shutdown()).await.unwrap();
        assert_eq!(outcome, RolloutOutcome::Complete { rounds: 2 });
        assert!(monitor.store().iter().all(|u| u.request_count == 2));
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_round() {
        let api = FakeConsumer::new(vec![vec![Reply::Version("1.0.0")]]);
        let mut monitor = monitor(api, 1, PollMode::Sequential);
        let (tx, rx) = watch::channel(true);

        let outcome = monitor.run(rx).await.unwrap();
        drop(tx);
        assert_eq!(outcome, RolloutOutcome::Cancelled { rounds: 0 });
        assert_eq!(outcome.exit_code(), 130);
    }

    #[tokio::test]
    async fn test_shutdown_during_pause() {
        let api = FakeConsumer::new(vec![vec![Reply::Version("1.0.0")]]);
        let mut monitor = monitor(api, 1, PollMode::Sequential);
        monitor.config.poll_interval = Duration::from_secs(3600);
        let (tx, rx) = watch::channel(false);

        let stop = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        let outcome = monitor.run(rx).await.unwrap();
        stop.await.unwrap();
        assert_eq!(outcome, RolloutOutcome::Cancelled { rounds: 1 });
    }

    #[tokio::test]
    async fn test_timeout_ends_at_round_boundary() {
        let api = FakeConsumer::new(vec![vec![Reply::Version("1.0.0")]]);
        let mut monitor = monitor(api, 1, PollMode::Sequential);
        monitor.config.timeout = Some(Duration::ZERO);

        let outcome = monitor.run(no_shutdown()).await.unwrap();
        assert_eq!(outcome, RolloutOutcome::TimedOut { rounds: 1 });
        assert_eq!(outcome.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_target_mode_waits_for_target() {
        use Reply::Version as V;
        let api = FakeConsumer::new(vec![vec![V("1.5.0"), V("2.0.0")]]);
        let mut config = MonitorConfig::new(1, "1.0.0");
        config.poll_interval = Duration::ZERO;
        config.completion = CompletionMode::AllOnTarget;
        config.target_version = Some("2.0.0".to_string());
        let poller = ClientPoller::new(api, "p-1", KEY, RetryPolicy::none()).unwrap();
        let mut monitor = RolloutMonitor::new(config, poller, Recording::default()).unwrap();

        let outcome = monitor.run(no_shutdown()).await.unwrap();
        assert_eq!(outcome, RolloutOutcome::Complete { rounds: 2 });
    }

    #[test]
    fn test_zero_users_rejected_before_polling() {
        let api = FakeConsumer::new(Vec::new());
        let poller = ClientPoller::new(api, "p-1", KEY, RetryPolicy::none()).unwrap();
        let result = RolloutMonitor::new(MonitorConfig::new(0, "1.0.0"), poller, Recording::default());
        assert!(matches!(result, Err(MonitorError::Config(ConfigError::NoUsers))));
    }

    impl RolloutMonitor<FakeConsumer, Recording> {
        fn poller_api(&self) -> &FakeConsumer {
            self.poller.api()
        }
    }
}
