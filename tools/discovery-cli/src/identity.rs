//! Short-lived admin user for calling the admin API.
//!
//! The user is created in the stack's Cognito user pool, used for one
//! command and deleted again, whether or not the command succeeded.

use std::future::Future;

use anyhow::{anyhow, Context as _, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use crate::aws::AwsCli;
use crate::stack::StackOutputs;

/// Name of the temporary admin user.
pub const ADMIN_USERNAME: &str = "demo";

const PASSWORD_LEN: usize = 12;
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!#$%&()*+-.:;<=>?@[]^_{|}~";

/// Generate a password with at least one character of each class.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < PASSWORD_LEN {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

/// Admin user in the stack's user pool.
pub struct AdminIdentity<'a> {
    aws: &'a dyn AwsCli,
    user_pool_id: String,
    client_id: String,
    username: String,
    password: String,
}

impl<'a> AdminIdentity<'a> {
    pub fn new(aws: &'a dyn AwsCli, stack: &StackOutputs) -> Self {
        Self {
            aws,
            user_pool_id: stack.user_pool_id.clone(),
            client_id: stack.web_client_id.clone(),
            username: ADMIN_USERNAME.to_string(),
            password: generate_password(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Create the user with a permanent password and enable admin password auth.
    ///
    /// A leftover user from an interrupted run is removed first.
    pub fn provision(&self) -> Result<()> {
        self.delete()?;

        // Single tokens, so a password starting with '-' is not read as a flag.
        let temporary_password = format!("--temporary-password={}", self.password);
        let password = format!("--password={}", self.password);

        self.cognito(
            "admin-create-user",
            &[
                "--user-pool-id",
                self.user_pool_id.as_str(),
                "--username",
                self.username.as_str(),
                temporary_password.as_str(),
                "--message-action",
                "SUPPRESS",
            ],
        )
        .context("Failed to create admin user")?;

        self.cognito(
            "admin-set-user-password",
            &[
                "--user-pool-id",
                self.user_pool_id.as_str(),
                "--username",
                self.username.as_str(),
                password.as_str(),
                "--permanent",
            ],
        )
        .context("Failed to set admin password")?;

        self.cognito(
            "update-user-pool-client",
            &[
                "--user-pool-id",
                self.user_pool_id.as_str(),
                "--client-id",
                self.client_id.as_str(),
                "--explicit-auth-flows",
                "ALLOW_ADMIN_USER_PASSWORD_AUTH",
                "ALLOW_REFRESH_TOKEN_AUTH",
            ],
        )
        .context("Failed to enable admin password auth")?;

        tracing::debug!(user = %self.username, "admin user provisioned");
        Ok(())
    }

    /// Sign in and return the ID token for the admin API.
    pub fn authenticate(&self) -> Result<String> {
        let params = serde_json::json!({
            "USERNAME": self.username,
            "PASSWORD": self.password,
        })
        .to_string();

        let response = self
            .cognito(
                "admin-initiate-auth",
                &[
                    "--user-pool-id",
                    self.user_pool_id.as_str(),
                    "--client-id",
                    self.client_id.as_str(),
                    "--auth-flow",
                    "ADMIN_USER_PASSWORD_AUTH",
                    "--auth-parameters",
                    params.as_str(),
                ],
            )
            .context("Failed to authenticate admin user")?;

        response
            .pointer("/AuthenticationResult/IdToken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Authentication response has no IdToken"))
    }

    /// Delete the user. A user that does not exist is not an error.
    pub fn delete(&self) -> Result<()> {
        let result = self.cognito(
            "admin-delete-user",
            &["--user-pool-id", self.user_pool_id.as_str(), "--username", self.username.as_str()],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_code("UserNotFoundException") => {
                tracing::debug!(user = %self.username, "admin user already absent");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete admin user")),
        }
    }

    fn cognito(&self, operation: &str, args: &[&str]) -> Result<Value, crate::aws::AwsError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.aws.call("cognito-idp", operation, &args)
    }
}

/// Provision the admin user, run `f` with its ID token, then delete it.
///
/// The user is deleted on every path. An error from `f` takes
/// precedence over a teardown error, which is then only logged.
pub async fn with_admin<T, F, Fut>(identity: &AdminIdentity<'_>, f: F) -> Result<T>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = match identity.provision().and_then(|()| identity.authenticate()) {
        Ok(id_token) => f(id_token).await,
        Err(e) => Err(e),
    };

    let teardown = identity.delete();
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown)) => {
            tracing::warn!(error = %format!("{:#}", teardown), "admin user teardown failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::fake::{service_error, FakeAws};
    use serde_json::json;

    fn stack() -> StackOutputs {
        StackOutputs {
            user_pool_id: "pool-1".to_string(),
            web_client_id: "client-1".to_string(),
            consumer_api: "https://consumer.example.com/".to_string(),
            admin_api: "https://admin.example.com/".to_string(),
        }
    }

    fn auth_reply() -> Result<Value, crate::aws::AwsError> {
        Ok(json!({ "AuthenticationResult": { "IdToken": "id-token-1" } }))
    }

    #[test]
    fn test_password_shape() {
        for _ in 0..50 {
            let password = generate_password();
            assert_eq!(password.len(), PASSWORD_LEN);
            assert!(password.bytes().any(|b| LOWER.contains(&b)));
            assert!(password.bytes().any(|b| UPPER.contains(&b)));
            assert!(password.bytes().any(|b| DIGITS.contains(&b)));
            assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
        }
    }

    #[test]
    fn test_password_passed_as_single_token() {
        let aws = FakeAws::new(Vec::new());
        let mut identity = AdminIdentity::new(&aws, &stack());
        identity.password = "-Ab3xyzQWE1!".to_string();

        identity.provision().unwrap();

        let calls = aws.calls.borrow();
        let create = &calls[1].1;
        assert!(create.contains(&"--temporary-password=-Ab3xyzQWE1!".to_string()));
        assert!(!create.contains(&"--temporary-password".to_string()));
        let set = &calls[2].1;
        assert!(set.contains(&"--password=-Ab3xyzQWE1!".to_string()));
        assert!(!set.iter().any(|arg| arg == "-Ab3xyzQWE1!"));
    }

    #[test]
    fn test_delete_ignores_missing_user() {
        let aws = FakeAws::new(vec![Err(service_error("UserNotFoundException"))]);
        let identity = AdminIdentity::new(&aws, &stack());
        assert!(identity.delete().is_ok());
    }

    #[test]
    fn test_delete_propagates_other_errors() {
        let aws = FakeAws::new(vec![Err(service_error("NotAuthorizedException"))]);
        let identity = AdminIdentity::new(&aws, &stack());
        assert!(identity.delete().is_err());
    }

    #[test]
    fn test_authenticate_reads_id_token() {
        let aws = FakeAws::new(vec![auth_reply()]);
        let identity = AdminIdentity::new(&aws, &stack());
        assert_eq!(identity.authenticate().unwrap(), "id-token-1");

        let calls = aws.calls.borrow();
        let params = calls[0].1.last().unwrap();
        let params: Value = serde_json::from_str(params).unwrap();
        assert_eq!(params["USERNAME"], "demo");
    }

    #[tokio::test]
    async fn test_with_admin_full_lifecycle() {
        let aws = FakeAws::new(vec![
            Err(service_error("UserNotFoundException")),
            Ok(json!({ "User": {} })),
            Ok(Value::Null),
            Ok(json!({})),
            auth_reply(),
            Ok(Value::Null),
        ]);
        let identity = AdminIdentity::new(&aws, &stack());

        let token = with_admin(&identity, |token| async move { Ok(token) })
            .await
            .unwrap();

        assert_eq!(token, "id-token-1");
        assert_eq!(
            aws.operations(),
            vec![
                "admin-delete-user",
                "admin-create-user",
                "admin-set-user-password",
                "update-user-pool-client",
                "admin-initiate-auth",
                "admin-delete-user",
            ]
        );
    }

    #[tokio::test]
    async fn test_with_admin_tears_down_after_failure() {
        let aws = FakeAws::new(vec![
            Ok(Value::Null),
            Ok(Value::Null),
            Ok(Value::Null),
            Ok(Value::Null),
            auth_reply(),
            Ok(Value::Null),
        ]);
        let identity = AdminIdentity::new(&aws, &stack());

        let result: Result<()> =
            with_admin(&identity, |_| async { Err(anyhow!("create project failed")) }).await;

        assert!(result.unwrap_err().to_string().contains("create project failed"));
        assert_eq!(aws.operations().last().map(String::as_str), Some("admin-delete-user"));
    }

    #[tokio::test]
    async fn test_with_admin_tears_down_when_provisioning_fails() {
        let aws = FakeAws::new(vec![
            Ok(Value::Null),
            Err(service_error("InvalidPasswordException")),
            Ok(Value::Null),
        ]);
        let identity = AdminIdentity::new(&aws, &stack());

        let result = with_admin(&identity, |_| async { Ok(()) }).await;

        assert!(result.is_err());
        assert_eq!(
            aws.operations(),
            vec!["admin-delete-user", "admin-create-user", "admin-delete-user"]
        );
    }
}
