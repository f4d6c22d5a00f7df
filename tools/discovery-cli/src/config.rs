//! CLI configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use discovery_client::{
    BackoffStrategy, DeploymentStrategy, FetchPolicy, RetryPolicy,
    VersionDescriptor, VersionMetadata, DEFAULT_SESSION_COOKIE,
};
use discovery_rollout::{CompletionMode, MonitorConfig, PollMode};
use serde::{Deserialize, Serialize};

/// Default config file name.
pub const CONFIG_FILE: &str = "discovery.toml";

/// CLI configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Deployed stack.
    #[serde(default)]
    pub stack: StackConfig,

    /// Project and micro-frontend under test.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Rollout monitor settings.
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Retry settings for API calls.
    #[serde(default)]
    pub retry: RetrySection,

    /// Deployment settings.
    #[serde(default)]
    pub deploy: DeploySection,

    /// Versions registered by `setup`.
    #[serde(default = "default_versions")]
    pub versions: Vec<SeedVersion>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            stack: StackConfig::default(),
            project: ProjectConfig::default(),
            monitor: MonitorSection::default(),
            retry: RetrySection::default(),
            deploy: DeploySection::default(),
            versions: default_versions(),
        }
    }
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Apply overrides from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("STACK_NAME") {
            self.stack.name = name;
        }
        if let Some(url) = get("CONSUMER_API") {
            self.stack.consumer_api = Some(url);
        }
        if let Some(url) = get("ADMIN_API") {
            self.stack.admin_api = Some(url);
        }
        if let Some(id) = get("PROJECT_ID") {
            self.project.id = Some(id);
        }
        if let Some(id) = get("MFE_ID") {
            self.project.micro_frontend_id = Some(id);
        }
    }

    /// Key of the micro-frontend in consumer responses.
    pub fn frontend_key(&self) -> String {
        format!("{}/{}", self.project.name, self.project.micro_frontend)
    }

    /// Timeout and retry settings for API clients.
    pub fn fetch_policy(&self) -> FetchPolicy {
        let retry = RetryPolicy::new(self.retry.max_attempts).with_backoff(
            BackoffStrategy::Exponential {
                base: Duration::from_millis(self.retry.base_delay_ms),
                max: Duration::from_millis(self.retry.max_delay_ms),
            },
        );
        FetchPolicy::new(Duration::from_secs(self.monitor.request_timeout_secs), retry)
    }

    /// Monitor settings from the `[monitor]` section.
    pub fn monitor_config(&self) -> MonitorConfig {
        let section = &self.monitor;
        let mut config = MonitorConfig::new(section.users, section.baseline_version.clone());
        config.target_version = section
            .target_version
            .clone()
            .or_else(|| Some(self.deploy.target_version.clone()));
        config.completion = section.completion;
        config.poll_interval = Duration::from_secs(section.poll_interval_secs);
        config.timeout = section.timeout_secs.map(Duration::from_secs);
        config.poll_mode = section.poll_mode;
        config
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "json")
}

/// Stack settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// CloudFormation stack name.
    #[serde(default = "default_stack_name")]
    pub name: String,

    /// Admin API URL; read from the stack outputs when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_api: Option<String>,

    /// Consumer API URL; read from the stack outputs when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_api: Option<String>,

    /// AWS region passed to the AWS CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// AWS profile passed to the AWS CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn default_stack_name() -> String {
    "frontend-discovery-service".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            admin_api: None,
            consumer_api: None,
            region: None,
            profile: None,
        }
    }
}

/// Project settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Micro-frontend name.
    #[serde(default = "default_mfe_name")]
    pub micro_frontend: String,

    /// Project ID assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Micro-frontend ID assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micro_frontend_id: Option<String>,
}

fn default_project_name() -> String {
    "my-project".to_string()
}

fn default_mfe_name() -> String {
    "catalog".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            micro_frontend: default_mfe_name(),
            id: None,
            micro_frontend_id: None,
        }
    }
}

/// Rollout monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Simulated users.
    #[serde(default = "default_users")]
    pub users: usize,

    /// Version served before the rollout.
    #[serde(default = "default_baseline")]
    pub baseline_version: String,

    /// Version being rolled out (defaults to `deploy.target_version`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,

    /// Termination rule.
    #[serde(default)]
    pub completion: CompletionMode,

    /// Seconds between rounds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Round polling strategy.
    #[serde(default)]
    pub poll_mode: PollMode,

    /// Session cookie name.
    #[serde(default = "default_cookie")]
    pub session_cookie: String,

    /// Total time allowed for one request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_users() -> usize {
    10
}

fn default_baseline() -> String {
    "1.0.0".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_request_timeout() -> u64 {
    20
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            users: default_users(),
            baseline_version: default_baseline(),
            target_version: None,
            completion: CompletionMode::default(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: None,
            poll_mode: PollMode::default(),
            session_cookie: default_cookie(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Retries after the first attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    2000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    /// Version to roll out.
    #[serde(default = "default_target")]
    pub target_version: String,

    /// Rollout strategy.
    #[serde(default)]
    pub strategy: DeploymentStrategy,

    /// ID of the most recent deployment started by `deploy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment_id: Option<String>,
}

fn default_target() -> String {
    "2.0.0".to_string()
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            target_version: default_target(),
            strategy: DeploymentStrategy::default(),
            last_deployment_id: None,
        }
    }
}

/// A version registered by `setup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedVersion {
    pub version: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl SeedVersion {
    /// Wire form of the version.
    pub fn descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            url: self.url.clone(),
            fallback_url: self.fallback_url.clone(),
            metadata: VersionMetadata {
                version: self.version.clone(),
                integrity: self.integrity.clone(),
            },
        }
    }
}

fn default_versions() -> Vec<SeedVersion> {
    vec![
        SeedVersion {
            version: "1.0.0".to_string(),
            url: "https://static.example.com/catalog-1.0.0.js".to_string(),
            fallback_url: Some("https://alt-cdn.com/catalog-1.0.0.js".to_string()),
            integrity: Some("e0d123e5f316bef78bfdf5a008837577".to_string()),
        },
        SeedVersion {
            version: "2.0.0".to_string(),
            url: "https://static.example.com/catalog-2.0.0.js".to_string(),
            fallback_url: Some("https://alt-cdn.com/catalog-2.0.0.js".to_string()),
            integrity: Some("e0d123e5f316bef78bfdf5a008837600".to_string()),
        },
    ]
}

/// Generate a default discovery.toml config file.
pub fn generate_default_config() -> String {
    r#"# Frontend discovery demo configuration

[stack]
name = "frontend-discovery-service"
# region = "eu-west-1"
# consumer_api = "https://xxxx.execute-api.eu-west-1.amazonaws.com/prod"

[project]
name = "my-project"
micro_frontend = "catalog"
# id and micro_frontend_id are written by `discovery setup`

[monitor]
users = 10
baseline_version = "1.0.0"
completion = "all-updated"
poll_interval_secs = 5
poll_mode = "sequential"
# timeout_secs = 900

[retry]
max_attempts = 3
base_delay_ms = 200
max_delay_ms = 2000

[deploy]
target_version = "2.0.0"
strategy = "Linear10PercentEvery1Minute"

[[versions]]
version = "1.0.0"
url = "https://static.example.com/catalog-1.0.0.js"
fallback_url = "https://alt-cdn.com/catalog-1.0.0.js"
integrity = "e0d123e5f316bef78bfdf5a008837577"

[[versions]]
version = "2.0.0"
url = "https://static.example.com/catalog-2.0.0.js"
fallback_url = "https://alt-cdn.com/catalog-2.0.0.js"
integrity = "e0d123e5f316bef78bfdf5a008837600"
"#
    .to_string()
}
