//! Administrative API client.

use std::fmt;
use std::str::FromStr;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{check_status, join_url, FetchError, FetchPolicy};
use crate::consumer::VersionDescriptor;

/// Rollout strategies accepted by the deployment endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    Linear10PercentEvery10Minutes,
    Linear10PercentEvery1Minute,
    Linear10PercentEvery2Minutes,
    Linear10PercentEvery3Minutes,
    Canary10Percent30Minutes,
    Canary10Percent5Minutes,
    Canary10Percent10Minutes,
    Canary10Percent15Minutes,
    AllAtOnce,
}

impl DeploymentStrategy {
    /// Every strategy, in the order the service documents them.
    pub const ALL: [DeploymentStrategy; 9] = [
        Self::Linear10PercentEvery10Minutes,
        Self::Linear10PercentEvery1Minute,
        Self::Linear10PercentEvery2Minutes,
        Self::Linear10PercentEvery3Minutes,
        Self::Canary10Percent30Minutes,
        Self::Canary10Percent5Minutes,
        Self::Canary10Percent10Minutes,
        Self::Canary10Percent15Minutes,
        Self::AllAtOnce,
    ];

    /// Wire name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear10PercentEvery10Minutes => "Linear10PercentEvery10Minutes",
            Self::Linear10PercentEvery1Minute => "Linear10PercentEvery1Minute",
            Self::Linear10PercentEvery2Minutes => "Linear10PercentEvery2Minutes",
            Self::Linear10PercentEvery3Minutes => "Linear10PercentEvery3Minutes",
            Self::Canary10Percent30Minutes => "Canary10Percent30Minutes",
            Self::Canary10Percent5Minutes => "Canary10Percent5Minutes",
            Self::Canary10Percent10Minutes => "Canary10Percent10Minutes",
            Self::Canary10Percent15Minutes => "Canary10Percent15Minutes",
            Self::AllAtOnce => "AllAtOnce",
        }
    }
}

impl Default for DeploymentStrategy {
    fn default() -> Self {
        Self::Linear10PercentEvery1Minute
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised strategy name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown deployment strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for DeploymentStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// A project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project ID.
    pub id: String,
    /// Project name.
    pub name: String,
}

/// A micro-frontend inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroFrontend {
    /// Micro-frontend ID.
    pub micro_frontend_id: String,
    /// Micro-frontend name.
    pub name: String,
}

/// Body for creating a version.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    /// The version to register.
    pub version: VersionDescriptor,
    /// Start a deployment to this version right away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,
}

/// Response to creating a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedVersion {
    pub micro_frontend_id: String,
    pub version: VersionDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// Traffic share of an active version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveVersion {
    /// Version string.
    pub version: String,
    /// Percentage of traffic (0-100).
    pub traffic: u8,
}

/// Versions registered for a micro-frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionList {
    pub project_id: String,
    pub micro_frontend_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub versions: Vec<VersionDescriptor>,
    #[serde(default)]
    pub active_versions: Vec<ActiveVersion>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Body for starting a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Version to roll out.
    pub target_version: String,
    /// How traffic shifts to the target.
    pub deployment_strategy: DeploymentStrategy,
}

/// A started deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment ID.
    pub deployment_id: String,
}

/// Client for the administrative API.
///
/// Every request carries the identity token in the `Authorization`
/// header, as issued by the user pool.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
    id_token: String,
}

impl AdminClient {
    /// Create a client authenticated with `id_token`.
    pub fn new(
        base_url: impl Into<String>,
        id_token: impl Into<String>,
        policy: &FetchPolicy,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            http: policy.build_http()?,
            base_url: base_url.into(),
            id_token: id_token.into(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Create a project.
    pub async fn create_project(&self, name: &str) -> Result<Project, FetchError> {
        self.post("projects", &serde_json::json!({ "name": name }))
            .await
    }

    /// Create a micro-frontend in a project.
    pub async fn create_micro_frontend(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<MicroFrontend, FetchError> {
        self.post(
            &format!("projects/{}/microFrontends", project_id),
            &serde_json::json!({ "name": name }),
        )
        .await
    }

    /// Register a version of a micro-frontend.
    pub async fn create_version(
        &self,
        project_id: &str,
        mfe_id: &str,
        version: &NewVersion,
    ) -> Result<CreatedVersion, FetchError> {
        self.post(&versions_path(project_id, mfe_id), version).await
    }

    /// List the versions of a micro-frontend.
    pub async fn list_versions(
        &self,
        project_id: &str,
        mfe_id: &str,
    ) -> Result<VersionList, FetchError> {
        let resp = self
            .http
            .get(self.url(&versions_path(project_id, mfe_id)))
            .header(AUTHORIZATION, &self.id_token)
            .send()
            .await?;
        decode(check_status(resp).await?).await
    }

    /// Start a deployment. The service answers `201 Created` on success.
    pub async fn create_deployment(
        &self,
        project_id: &str,
        mfe_id: &str,
        request: &DeploymentRequest,
    ) -> Result<Deployment, FetchError> {
        let url = self.url(&format!(
            "projects/{}/microFrontends/{}/deployment",
            project_id, mfe_id
        ));
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &self.id_token)
            .json(request)
            .send()
            .await?;

        if resp.status() != StatusCode::CREATED {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Http { status, url, body });
        }

        decode(resp).await
    }

    /// Cancel a running deployment, restoring the previous traffic split.
    pub async fn cancel_deployment(
        &self,
        project_id: &str,
        mfe_id: &str,
        deployment_id: &str,
    ) -> Result<(), FetchError> {
        let resp = self
            .http
            .delete(self.url(&format!(
                "projects/{}/microFrontends/{}/deployment/{}",
                project_id, mfe_id, deployment_id
            )))
            .header(AUTHORIZATION, &self.id_token)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.url(path))
            .header(AUTHORIZATION, &self.id_token)
            .json(body)
            .send()
            .await?;
        decode(check_status(resp).await?).await
    }
}

fn versions_path(project_id: &str, mfe_id: &str) -> String {
    format!("projects/{}/microFrontends/{}/versions", project_id, mfe_id)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FetchError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Deserialization(e.to_string()))
}
