//! Outputs of the deployed CloudFormation stack.

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;

use crate::aws::AwsCli;

/// Stack outputs the demo needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutputs {
    pub user_pool_id: String,
    pub web_client_id: String,
    pub consumer_api: String,
    pub admin_api: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    #[serde(default)]
    stacks: Vec<Stack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Stack {
    #[serde(default)]
    outputs: Vec<StackOutput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    output_value: String,
}

/// Read the outputs of `stack_name`.
pub fn describe_stack(aws: &dyn AwsCli, stack_name: &str) -> Result<StackOutputs> {
    let raw = aws
        .call(
            "cloudformation",
            "describe-stacks",
            &["--stack-name".to_string(), stack_name.to_string()],
        )
        .with_context(|| format!("Failed to describe stack {}", stack_name))?;

    let described: DescribeStacks = serde_json::from_value(raw)
        .with_context(|| format!("Unexpected describe-stacks output for {}", stack_name))?;
    let stack = described
        .stacks
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Stack {} not found", stack_name))?;

    let output = |key: &str| -> Result<String> {
        stack
            .outputs
            .iter()
            .find(|o| o.output_key == key)
            .map(|o| o.output_value.clone())
            .ok_or_else(|| anyhow!("Stack {} has no output {}", stack_name, key))
    };

    Ok(StackOutputs {
        user_pool_id: output("CognitoUserPoolID")?,
        web_client_id: output("CognitoWebClientID")?,
        consumer_api: output("ConsumerApi")?,
        admin_api: output("AdminApi")?,
    })
}
