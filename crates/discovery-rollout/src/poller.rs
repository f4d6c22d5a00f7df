//! One simulated-user interaction with the consumer API.

use discovery_client::{
    ConsumerApi, FetchError, FrontendsDocument, RetryPolicy, SessionToken, VersionDescriptor,
};

use crate::config::ConfigError;
use crate::session::Observation;

/// Why a poll produced no observation.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Transport or HTTP failure that survived the retry budget.
    #[error(transparent)]
    Fetch(FetchError),

    /// The expected entry was present but unreadable.
    #[error("malformed entry for '{key}': {reason}")]
    Malformed { key: String, reason: String },

    /// The service does not know the project.
    #[error("project '{0}' does not exist")]
    ProjectNotFound(String),

    /// The response has no entry for the micro-frontend.
    #[error("micro-frontend '{0}' is not in the response; check the project and micro-frontend names")]
    MissingFrontend(String),
}

impl PollError {
    /// Errors caused by configuration rather than by one user's request.
    /// These stop the monitor instead of skipping the user.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProjectNotFound(_) | Self::MissingFrontend(_))
    }
}

/// Polls the consumer API on behalf of one user at a time.
pub struct ClientPoller<A> {
    api: A,
    project_id: String,
    frontend_key: String,
    retry: RetryPolicy,
}

impl<A: ConsumerApi> ClientPoller<A> {
    /// Create a poller for `{project_name}/{mfe_name}` in `project_id`.
    pub fn new(
        api: A,
        project_id: impl Into<String>,
        frontend_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let project_id = project_id.into();
        let frontend_key = frontend_key.into();

        if project_id.trim().is_empty() {
            return Err(ConfigError::Missing("project_id"));
        }
        if frontend_key.trim().is_empty() {
            return Err(ConfigError::Missing("micro-frontend key"));
        }

        Ok(Self {
            api,
            project_id,
            frontend_key,
            retry,
        })
    }

    /// Project being polled.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Key of the micro-frontend inside the response.
    pub fn frontend_key(&self) -> &str {
        &self.frontend_key
    }

    /// The underlying consumer API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Issue one request as the user holding `token`.
    ///
    /// Transient failures are retried here, so the caller sees at most
    /// one outcome per user per round.
    pub async fn poll(&self, token: Option<&SessionToken>) -> Result<Observation, PollError> {
        let api = &self.api;
        let project_id = self.project_id.as_str();

        let response = self
            .retry
            .run(move |_| api.micro_frontends(project_id, token))
            .await
            .map_err(|err| match err {
                FetchError::Http { status: 404, .. } => {
                    PollError::ProjectNotFound(self.project_id.clone())
                }
                FetchError::Deserialization(reason) => PollError::Malformed {
                    key: self.frontend_key.clone(),
                    reason,
                },
                other => PollError::Fetch(other),
            })?;

        let descriptor = extract_descriptor(&response.document, &self.frontend_key)?;

        Ok(Observation {
            version: descriptor.metadata.version,
            url: descriptor.url,
            token: response.issued_token,
        })
    }
}

/// Read the first version descriptor served for `key`.
pub fn extract_descriptor(
    document: &FrontendsDocument,
    key: &str,
) -> Result<VersionDescriptor, PollError> {
    let entries = document
        .micro_frontends
        .get(key)
        .ok_or_else(|| PollError::MissingFrontend(key.to_string()))?;

    let first = entries.first().ok_or_else(|| PollError::Malformed {
        key: key.to_string(),
        reason: "no versions served".to_string(),
    })?;

    serde_json::from_value(first.clone()).map_err(|e| PollError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use discovery_client::{BackoffStrategy, ConsumerResponse};
    use serde_json::json;

    const KEY: &str = "my-project/catalog";

    fn document(entry: serde_json::Value) -> FrontendsDocument {
        serde_json::from_value(json!({ "microFrontends": { KEY: [entry] } })).unwrap()
    }

    fn catalog(version: &str) -> serde_json::Value {
        json!({
            "url": format!("https://static.example.com/catalog-{}.js", version),
            "metadata": { "version": version, "integrity": "e0d1" }
        })
    }

    /// Serves scripted results and records the tokens it was sent.
    struct Scripted {
        results: Mutex<Vec<Result<ConsumerResponse, FetchError>>>,
        seen_tokens: Mutex<Vec<Option<SessionToken>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<ConsumerResponse, FetchError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                seen_tokens: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ConsumerApi for Scripted {
        async fn micro_frontends(
            &self,
            _project_id: &str,
            token: Option<&SessionToken>,
        ) -> Result<ConsumerResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_tokens.lock().unwrap().push(token.cloned());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FetchError::Request("script exhausted".into())))
        }
    }

    fn ok(entry: serde_json::Value, token: Option<&str>) -> Result<ConsumerResponse, FetchError> {
        Ok(ConsumerResponse {
            document: document(entry),
            issued_token: token.map(SessionToken::from),
        })
    }

    fn poller(api: Scripted, retries: u32) -> ClientPoller<Scripted> {
        let retry = RetryPolicy::new(retries).with_backoff(BackoffStrategy::None);
        ClientPoller::new(api, "p-1", KEY, retry).unwrap()
    }

    #[test]
    fn test_blank_identifiers_rejected() {
        let api = Scripted::new(Vec::new());
        assert!(matches!(
            ClientPoller::new(api, "", KEY, RetryPolicy::none()),
            Err(ConfigError::Missing("project_id"))
        ));
    }

    #[tokio::test]
    async fn test_poll_extracts_version_url_and_token() {
        let poller = poller(Scripted::new(vec![ok(catalog("1.0.0"), Some("tok-1"))]), 0);

        let observation = poller.poll(None).await.unwrap();
        assert_eq!(observation.version, "1.0.0");
        assert_eq!(observation.url, "https://static.example.com/catalog-1.0.0.js");
        assert_eq!(observation.token, Some(SessionToken::from("tok-1")));
    }

    #[tokio::test]
    async fn test_poll_presents_held_token() {
        let poller = poller(Scripted::new(vec![ok(catalog("1.0.0"), None)]), 0);
        let token = SessionToken::from("sticky");

        poller.poll(Some(&token)).await.unwrap();
        assert_eq!(*poller.api.seen_tokens.lock().unwrap(), vec![Some(token)]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let poller = poller(
            Scripted::new(vec![
                Err(FetchError::Connection("refused".into())),
                Err(FetchError::Http { status: 503, url: "u".into(), body: String::new() }),
                ok(catalog("2.0.0"), None),
            ]),
            3,
        );

        let observation = poller.poll(None).await.unwrap();
        assert_eq!(observation.version, "2.0.0");
        assert_eq!(poller.api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_fetch_error() {
        let poller = poller(
            Scripted::new(vec![
                Err(FetchError::Timeout("slow".into())),
                Err(FetchError::Timeout("slow".into())),
            ]),
            1,
        );

        let err = poller.poll(None).await.unwrap_err();
        assert!(matches!(err, PollError::Fetch(FetchError::Timeout(_))));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_version_is_malformed() {
        let entry = json!({ "url": "https://static.example.com/catalog.js", "metadata": {} });
        let poller = poller(Scripted::new(vec![ok(entry, None)]), 0);

        let err = poller.poll(None).await.unwrap_err();
        assert!(matches!(err, PollError::Malformed { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_unknown_project_is_fatal() {
        let poller = poller(
            Scripted::new(vec![Err(FetchError::Http {
                status: 404,
                url: "u".into(),
                body: "The specified project does not exist.".into(),
            })]),
            3,
        );

        let err = poller.poll(None).await.unwrap_err();
        assert!(matches!(err, PollError::ProjectNotFound(ref p) if p == "p-1"));
        assert!(err.is_fatal());
        assert_eq!(poller.api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let doc = document(catalog("1.0.0"));
        let err = extract_descriptor(&doc, "my-project/checkout").unwrap_err();
        assert!(matches!(err, PollError::MissingFrontend(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_version_list_is_malformed() {
        let doc: FrontendsDocument =
            serde_json::from_value(json!({ "microFrontends": { KEY: [] } })).unwrap();
        assert!(matches!(
            extract_descriptor(&doc, KEY),
            Err(PollError::Malformed { .. })
        ));
    }
}
