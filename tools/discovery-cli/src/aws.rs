//! Thin wrapper over the `aws` command line tool.

use std::process::Command;

use serde_json::Value;

/// Failure of an AWS CLI call.
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    /// The `aws` binary could not be started.
    #[error("aws CLI not found or not executable: {0}. Install from https://aws.amazon.com/cli/")]
    NotInstalled(#[source] std::io::Error),

    /// The call ran and the service rejected it.
    #[error("{service} {operation} failed: {message}")]
    Service {
        service: String,
        operation: String,
        code: Option<String>,
        message: String,
    },

    /// The call succeeded but printed something other than JSON.
    #[error("unexpected output from {service} {operation}: {reason}")]
    Output {
        service: String,
        operation: String,
        reason: String,
    },
}

impl AwsError {
    /// Service error code such as `UserNotFoundException`.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the service reported `code`.
    pub fn is_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }
}

/// Something that can run AWS CLI operations.
pub trait AwsCli {
    /// Run `aws <service> <operation> <args>` and return its JSON output.
    /// Operations that print nothing return `Value::Null`.
    fn call(&self, service: &str, operation: &str, args: &[String]) -> Result<Value, AwsError>;
}

/// Runs the real `aws` binary.
#[derive(Debug, Clone, Default)]
pub struct ProcessAws {
    region: Option<String>,
    profile: Option<String>,
}

impl ProcessAws {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self { region, profile }
    }
}

impl AwsCli for ProcessAws {
    fn call(&self, service: &str, operation: &str, args: &[String]) -> Result<Value, AwsError> {
        let mut cmd = Command::new("aws");
        cmd.arg(service).arg(operation).args(args);
        cmd.args(["--output", "json"]);
        if let Some(region) = &self.region {
            cmd.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile.as_str()]);
        }

        tracing::debug!(service, operation, "running aws cli");
        let output = cmd.output().map_err(AwsError::NotInstalled)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::Service {
                service: service.to_string(),
                operation: operation.to_string(),
                code: error_code(&stderr),
                message: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|e| AwsError::Output {
            service: service.to_string(),
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Extract the error code from messages like
/// `An error occurred (UserNotFoundException) when calling ...`.
pub fn error_code(stderr: &str) -> Option<String> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let rest = &stderr[start..];
    let end = rest.find(')')?;
    Some(rest[..end].to_string())
}
