//! Driver configuration: defaults, optional TOML file, `PULUMI_*` environment.
//!
//! Precedence (lowest to highest): built-in defaults, the config file
//! (`PULUMI_DRIVER_CONFIG` path, else `config/driver.toml`), environment
//! variables, then whatever the caller applies through [`Overrides`].
//!
//! The API base URL is read from `PULUMI_API_URL`. `PULUMI_BACKEND_URL` belongs
//! to the Pulumi CLI (service root, no `/api` suffix) and is ignored here.

use crate::error::{DeployError, DeployResult};
use crate::stack::StackRef;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PROJECT: &str = "stack-readme-yaml";
pub const DEFAULT_STACK: &str = "dev";
pub const DEFAULT_API_URL: &str = "https://api.pulumi.com/api";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Environment variable naming an alternative config file.
pub const ENV_CONFIG_PATH: &str = "PULUMI_DRIVER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/driver.toml";
const ENV_PREFIX: &str = "PULUMI";

/// Bearer token for the Pulumi Cloud API. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for building the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Raw, layered configuration. Call [`DriverConfig::resolve`] before use.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub org: Option<String>,
    pub project: String,
    pub stack: String,
    pub api_url: String,
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    /// Request timeout; unset leaves reqwest's default (none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Delay between status checks while following a deployment.
    pub poll_interval_secs: u64,
}

/// Values supplied on the command line; `None` keeps the layered value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub org: Option<String>,
    pub project: Option<String>,
    pub stack: Option<String>,
    pub api_url: Option<String>,
}

/// Everything the requester needs, validated.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub target: StackRef,
    pub token: AccessToken,
    pub api_url: String,
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl DriverConfig {
    /// Load from the config file (if any) and the process environment.
    ///
    /// A file named by `PULUMI_DRIVER_CONFIG` must exist; `config/driver.toml` is optional.
    pub fn load() -> Result<Self, config::ConfigError> {
        let file = config_file(std::env::var(ENV_CONFIG_PATH).ok());
        Self::load_from(file.as_deref(), None)
    }

    /// Load from an explicit (required) file and environment map.
    /// `env: None` reads the process environment.
    pub fn load_from(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("project", DEFAULT_PROJECT)?
            .set_default("stack", DEFAULT_STACK)?
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS)?;

        let builder = match file {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder,
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .source(env),
            )
            .build()?;

        built.try_deserialize()
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(org) = overrides.org {
            self.org = Some(org);
        }
        if let Some(project) = overrides.project {
            self.project = project;
        }
        if let Some(stack) = overrides.stack {
            self.stack = stack;
        }
        if let Some(url) = overrides.api_url {
            self.api_url = url;
        }
        self
    }

    /// Validate required values. Fails before any network activity.
    pub fn resolve(self) -> DeployResult<ResolvedConfig> {
        let org = self
            .org
            .filter(|o| !o.trim().is_empty())
            .ok_or_else(|| {
                DeployError::config(
                    "missing `PULUMI_ORG` variable pointing to the desired Pulumi organization",
                )
            })?;
        if self.project.trim().is_empty() {
            return Err(DeployError::config("project name must not be empty"));
        }
        if self.stack.trim().is_empty() {
            return Err(DeployError::config("stack name must not be empty"));
        }
        let token = self
            .access_token
            .filter(|t| !t.is_blank())
            .ok_or_else(|| {
                DeployError::config("missing `PULUMI_ACCESS_TOKEN` variable holding a Pulumi API token")
            })?;

        Ok(ResolvedConfig {
            target: StackRef::new(org, self.project, self.stack),
            token,
            api_url: self.api_url,
            timeout: self.timeout_secs.map(Duration::from_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        })
    }
}

/// The file `load` reads: the explicit path when one is given, else the default if present.
fn config_file(explicit: Option<String>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        }
    }
}
