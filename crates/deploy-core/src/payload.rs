//! Request bodies for the Deployments API.
//!
//! [`DeploymentPayload`] covers the common git-sourced shape; any other JSON
//! object can be sent as a raw [`serde_json::Value`] as long as it carries
//! `operationContext.operation`.

use crate::error::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_REPO_URL: &str = "https://github.com/pulumi/examples.git";
pub const DEFAULT_BRANCH: &str = "refs/heads/master";
pub const DEFAULT_REPO_DIR: &str = "stack-readme-yaml";

/// Pulumi operation a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Update,
    Preview,
    #[default]
    Destroy,
    Refresh,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Update,
        Operation::Preview,
        Operation::Destroy,
        Operation::Refresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Preview => "preview",
            Operation::Destroy => "destroy",
            Operation::Refresh => "refresh",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown operation '{s}' (expected update, preview, destroy or refresh)"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAuth {
    pub access_token: String,
}

/// Where the deployment fetches the Pulumi program from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub branch: String,
    #[serde(rename = "repoDir", skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<String>,
    #[serde(rename = "gitAuth", skip_serializing_if = "Option::is_none")]
    pub git_auth: Option<GitAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub git: GitSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_run_commands: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
}

/// Body of `POST preview/{org}/{project}/{stack}/deployments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPayload {
    pub source_context: SourceContext,
    pub operation_context: OperationContext,
}

impl DeploymentPayload {
    pub fn git(repo_url: impl Into<String>, branch: impl Into<String>, operation: Operation) -> Self {
        Self {
            source_context: SourceContext {
                git: GitSource {
                    repo_url: repo_url.into(),
                    branch: branch.into(),
                    repo_dir: None,
                    git_auth: None,
                },
            },
            operation_context: OperationContext {
                operation,
                pre_run_commands: Vec::new(),
                environment_variables: BTreeMap::new(),
            },
        }
    }

    pub fn with_repo_dir(mut self, dir: impl Into<String>) -> Self {
        self.source_context.git.repo_dir = Some(dir.into());
        self
    }

    pub fn with_git_token(mut self, token: impl Into<String>) -> Self {
        self.source_context.git.git_auth = Some(GitAuth {
            access_token: token.into(),
        });
        self
    }

    pub fn with_pre_run_command(mut self, command: impl Into<String>) -> Self {
        self.operation_context.pre_run_commands.push(command.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.operation_context
            .environment_variables
            .insert(key.into(), value.into());
        self
    }

    pub fn to_value(&self) -> DeployResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| DeployError::invalid_payload(e.to_string()))
    }
}

impl Default for DeploymentPayload {
    /// The stack-readme-yaml example destroy.
    fn default() -> Self {
        DeploymentPayload::git(DEFAULT_REPO_URL, DEFAULT_BRANCH, Operation::Destroy)
            .with_repo_dir(DEFAULT_REPO_DIR)
    }
}

/// Reads `operationContext.operation` from an arbitrary payload.
pub fn operation_of(payload: &serde_json::Value) -> DeployResult<&str> {
    if !payload.is_object() {
        return Err(DeployError::invalid_payload("payload must be a JSON object"));
    }
    payload
        .get("operationContext")
        .and_then(|ctx| ctx.get("operation"))
        .and_then(|op| op.as_str())
        .filter(|op| !op.is_empty())
        .ok_or_else(|| DeployError::invalid_payload("payload is missing `operationContext.operation`"))
}

/// Load a raw JSON payload from disk.
pub fn read_payload_file(path: &Path) -> DeployResult<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DeployError::invalid_payload(format!("cannot read {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        DeployError::invalid_payload(format!("{} is not valid JSON: {}", path.display(), e))
    })?;
    operation_of(&value)?;
    Ok(value)
}
