//! Consumer API client.
//!
//! The consumer API answers `GET /projects/{projectId}/microFrontends` with
//! the version of every micro-frontend the calling user is bucketed into.
//! Users are identified by a session cookie the service issues on first
//! contact and expects back on every later request.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};

use crate::client::{check_status, join_url, FetchError, FetchPolicy};

/// Name of the cookie carrying the user's rollout bucket.
pub const DEFAULT_SESSION_COOKIE: &str = "USER_TOKEN";

/// Opaque session token issued by the consumer API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a token from its raw value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata attached to a micro-frontend version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Semantic version string, e.g. `1.0.0`.
    pub version: String,
    /// Subresource integrity hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// A deployable version of a micro-frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Asset URL.
    pub url: String,
    /// Alternate asset URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
    /// Version metadata.
    pub metadata: VersionMetadata,
}

/// Body of the consumer read endpoint.
///
/// Entries are kept as raw JSON so that one malformed descriptor does not
/// make the whole document unreadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendsDocument {
    /// Schema URL advertised by the service.
    #[serde(default)]
    pub schema: Option<String>,
    /// Version descriptors keyed by `{project}/{mfe}`.
    #[serde(default)]
    pub micro_frontends: HashMap<String, Vec<serde_json::Value>>,
    /// Pagination token.
    #[serde(default)]
    pub next_token: Option<String>,
}

/// A consumer API response together with any session token it issued.
#[derive(Debug, Clone)]
pub struct ConsumerResponse {
    /// Parsed body.
    pub document: FrontendsDocument,
    /// Token from the `Set-Cookie` header, if one was issued.
    pub issued_token: Option<SessionToken>,
}

/// Read access to the consumer API.
#[async_trait]
pub trait ConsumerApi: Send + Sync {
    /// Fetch the micro-frontends served to the user holding `token`.
    async fn micro_frontends(
        &self,
        project_id: &str,
        token: Option<&SessionToken>,
    ) -> Result<ConsumerResponse, FetchError>;
}

/// HTTP implementation of [`ConsumerApi`].
#[derive(Debug, Clone)]
pub struct ConsumerClient {
    http: reqwest::Client,
    base_url: String,
    cookie_name: String,
}

impl ConsumerClient {
    /// Create a client for the consumer API at `base_url`.
    pub fn new(base_url: impl Into<String>, policy: &FetchPolicy) -> Result<Self, FetchError> {
        Ok(Self {
            http: policy.build_http()?,
            base_url: base_url.into(),
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
        })
    }

    /// Use a different session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint polled for `project_id`.
    pub fn endpoint(&self, project_id: &str) -> String {
        join_url(
            &self.base_url,
            &format!("projects/{}/microFrontends", project_id),
        )
    }
}

#[async_trait]
impl ConsumerApi for ConsumerClient {
    async fn micro_frontends(
        &self,
        project_id: &str,
        token: Option<&SessionToken>,
    ) -> Result<ConsumerResponse, FetchError> {
        let mut req = self.http.get(self.endpoint(project_id));
        if let Some(token) = token {
            req = req.header(COOKIE, format!("{}={}", self.cookie_name, token));
        }

        let resp = check_status(req.send().await?).await?;

        let issued_token = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| session_token_from_set_cookie(value, &self.cookie_name));

        let bytes = resp.bytes().await?;
        let document: FrontendsDocument = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Deserialization(e.to_string()))?;

        Ok(ConsumerResponse {
            document,
            issued_token,
        })
    }
}

/// Extract the session token from a `Set-Cookie` header value.
///
/// Only the `name=value` pair before the first `;` is considered, and the
/// pair must belong to `cookie_name`.
pub fn session_token_from_set_cookie(header: &str, cookie_name: &str) -> Option<SessionToken> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.trim() != cookie_name {
        return None;
    }

    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(SessionToken::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    #[test]
    fn test_token_from_plain_cookie() {
        let token = session_token_from_set_cookie("USER_TOKEN=abc-123", "USER_TOKEN");
        assert_eq!(token, Some(SessionToken::from("abc-123")));
    }

    #[test]
    fn test_token_ignores_attributes() {
        let token = session_token_from_set_cookie(
            "USER_TOKEN=abc-123; Path=/; Secure; HttpOnly",
            "USER_TOKEN",
        );
        assert_eq!(token.as_ref().map(SessionToken::as_str), Some("abc-123"));
    }

    #[test]
    fn test_token_requires_matching_name() {
        assert_eq!(session_token_from_set_cookie("OTHER=abc", "USER_TOKEN"), None);
        assert_eq!(session_token_from_set_cookie("USER_TOKEN=", "USER_TOKEN"), None);
        assert_eq!(session_token_from_set_cookie("garbage", "USER_TOKEN"), None);
    }

    #[test]
    fn test_document_keeps_raw_entries() {
        let body = r#"{
            "schema": "https://example.com/schema/v1-pre.json",
            "microFrontends": {
                "my-project/catalog": [
                    {"url": "https://static.example.com/catalog-1.0.0.js",
                     "metadata": {"version": "1.0.0", "integrity": "e0d1"}}
                ],
                "my-project/broken": [{"url": 42}]
            }
        }"#;

        let doc: FrontendsDocument = serde_json::from_str(body).unwrap();
        assert_eq!(doc.micro_frontends.len(), 2);

        let entry = doc.micro_frontends["my-project/catalog"][0].clone();
        let descriptor: VersionDescriptor = serde_json::from_value(entry).unwrap();
        assert_eq!(descriptor.metadata.version, "1.0.0");
        assert_eq!(descriptor.fallback_url, None);
    }

    #[test]
    fn test_endpoint_path() {
        let client = ConsumerClient::new("https://c.example.com/prod/", &FetchPolicy::default())
            .unwrap();
        assert_eq!(
            client.endpoint("p-1"),
            "https://c.example.com/prod/projects/p-1/microFrontends"
        );
    }

    fn catalog_body() -> serde_json::Value {
        json!({
            "schema": "https://example.com/schema/v1-pre.json",
            "microFrontends": {
                "my-project/catalog": [
                    {"url": "https://static.example.com/catalog-2.0.0.js",
                     "metadata": {"version": "2.0.0"}}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_sends_session_cookie() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/projects/p-1/microFrontends")
                    .header("cookie", "USER_TOKEN=abc-123");
                then.status(200).json_body(catalog_body());
            })
            .await;

        let client = ConsumerClient::new(server.base_url(), &FetchPolicy::default()).unwrap();
        let token = SessionToken::from("abc-123");
        let response = client.micro_frontends("p-1", Some(&token)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.document.micro_frontends["my-project/catalog"].len(), 1);
        assert_eq!(response.issued_token, None);
    }

    #[tokio::test]
    async fn test_reads_issued_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/p-1/microFrontends");
                then.status(200)
                    .header("set-cookie", "USER_TOKEN=7c1e-42; Path=/; HttpOnly")
                    .json_body(catalog_body());
            })
            .await;

        let client = ConsumerClient::new(server.base_url(), &FetchPolicy::default()).unwrap();
        let response = client.micro_frontends("p-1", None).await.unwrap();

        assert_eq!(response.issued_token, Some(SessionToken::from("7c1e-42")));
    }

    #[tokio::test]
    async fn test_unknown_project_is_http_404() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/missing/microFrontends");
                then.status(404).body("project not found");
            })
            .await;

        let client = ConsumerClient::new(server.base_url(), &FetchPolicy::default()).unwrap();
        let err = client.micro_frontends("missing", None).await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        match err {
            FetchError::Http { body, .. } => assert_eq!(body, "project not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_deserialization_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/p-1/microFrontends");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let client = ConsumerClient::new(server.base_url(), &FetchPolicy::default()).unwrap();
        let err = client.micro_frontends("p-1", None).await.unwrap_err();

        assert!(matches!(err, FetchError::Deserialization(_)), "{:?}", err);
    }
}
