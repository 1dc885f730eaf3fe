//! Deployment creation with a single create-stack-and-retry fallback on 404.
//!
//! Per attempt:
//!
//! ```text
//! START -> SENT -> SUCCESS
//!                | NOT_FOUND -> STACK_CREATE -> RETRY_SENT -> SUCCESS | FAILURE
//!                | FAILURE
//! ```
//!
//! A failed stack creation and a 404 on the retry are both terminal.
//!
//! [`DeploymentRequester::follow_deployment`] optionally polls a created
//! deployment until it leaves the `not-started`, `accepted` and `running` states.

use crate::error::{DeployError, DeployResult};
use crate::payload::operation_of;
use crate::settings::{ResolvedConfig, DEFAULT_POLL_INTERVAL_SECS};
use crate::stack::StackRef;
use crate::status::{StatusSink, StdoutSink};
use crate::transport::{DeploymentTransport, RawResponse, ReqwestTransport, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const TRACING_TARGET: &str = "deploy::requester";

const NON_TERMINAL_STATUSES: [&str; 3] = ["not-started", "accepted", "running"];

/// What a successful deployment request produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub status_code: u16,
    pub deployment_id: Option<String>,
    pub console_url: Option<String>,
}

/// Lifecycle state reported for a deployment (`running`, `succeeded`, `failed`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeploymentStatus(String);

impl DeploymentStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Queued or in progress. A missing status counts as not started yet.
    pub fn is_running(&self) -> bool {
        self.0.is_empty() || NON_TERMINAL_STATUSES.contains(&self.0.as_str())
    }

    pub fn is_failed(&self) -> bool {
        self.0 == "failed"
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("pending")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Classification of one HTTP exchange.
#[derive(Debug)]
pub enum CallOutcome {
    Success(RawResponse),
    NotFound(RawResponse),
    OtherError(RawResponse),
    TransportError(TransportError),
}

impl CallOutcome {
    pub fn classify(result: Result<RawResponse, TransportError>) -> Self {
        match result {
            Ok(resp) if resp.is_success() => CallOutcome::Success(resp),
            Ok(resp) if resp.status == 404 => CallOutcome::NotFound(resp),
            Ok(resp) => CallOutcome::OtherError(resp),
            Err(e) => CallOutcome::TransportError(e),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeploymentResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    console_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentStatusResponse {
    #[serde(default)]
    status: String,
}

/// Creates deployments for one API endpoint with one credential.
pub struct DeploymentRequester {
    transport: Arc<dyn DeploymentTransport>,
    sink: Arc<dyn StatusSink>,
    poll_interval: Duration,
}

impl DeploymentRequester {
    pub fn new(transport: Arc<dyn DeploymentTransport>) -> Self {
        Self {
            transport,
            sink: Arc::new(StdoutSink),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    /// Requester over reqwest using the resolved API URL, token, timeout and poll interval.
    pub fn from_config(config: &ResolvedConfig) -> DeployResult<Self> {
        let transport = ReqwestTransport::from_config(config)
            .map_err(|e| DeployError::config(e.to_string()))?;
        Ok(Self::new(Arc::new(transport)).with_poll_interval(config.poll_interval))
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// POST the payload to `preview/{org}/{project}/{stack}/deployments`.
    ///
    /// On 404 the stack is created with the same triple and the identical
    /// body is sent once more; that second answer is final.
    pub async fn create_deployment(
        &self,
        target: &StackRef,
        payload: &serde_json::Value,
    ) -> DeployResult<DeploymentResult> {
        let operation = operation_of(payload)?;
        let body = serde_json::to_vec(payload)
            .map_err(|e| DeployError::invalid_payload(e.to_string()))?;
        let endpoint = target.deployments_path();

        tracing::info!(target: TRACING_TARGET, %operation, endpoint = %endpoint, "Requesting deployment");
        self.sink
            .line(&format!("Attempting a {} against {}", operation, endpoint));

        match self.send(&endpoint, &body).await {
            CallOutcome::Success(resp) => self.finish(&endpoint, resp),
            CallOutcome::NotFound(_) => {
                tracing::warn!(target: TRACING_TARGET, stack = %target, "Stack not found, creating it before retrying");
                self.sink.line("Stack doesn't exist, creating it");
                self.create_stack(target).await?;
                match self.send(&endpoint, &body).await {
                    CallOutcome::Success(resp) => self.finish(&endpoint, resp),
                    CallOutcome::NotFound(resp) | CallOutcome::OtherError(resp) => {
                        Err(self.http_failure(&endpoint, resp))
                    }
                    CallOutcome::TransportError(e) => Err(self.transport_failure(&endpoint, e)),
                }
            }
            CallOutcome::OtherError(resp) => Err(self.http_failure(&endpoint, resp)),
            CallOutcome::TransportError(e) => Err(self.transport_failure(&endpoint, e)),
        }
    }

    /// POST `{"stackName": stack}` to `stacks/{org}/{project}`; returns the 2xx status.
    pub async fn create_stack(&self, target: &StackRef) -> DeployResult<u16> {
        let endpoint = target.stacks_path();
        let body = serde_json::to_vec(&serde_json::json!({ "stackName": target.stack }))
            .map_err(|e| DeployError::invalid_payload(e.to_string()))?;

        match self.send(&endpoint, &body).await {
            CallOutcome::Success(resp) => {
                tracing::info!(target: TRACING_TARGET, stack = %target, status = resp.status, "Stack created");
                Ok(resp.status)
            }
            CallOutcome::NotFound(resp) | CallOutcome::OtherError(resp) => {
                Err(self.http_failure(&endpoint, resp))
            }
            CallOutcome::TransportError(e) => Err(self.transport_failure(&endpoint, e)),
        }
    }

    /// Poll `preview/{org}/{project}/{stack}/deployments/{id}` until the deployment
    /// reaches a terminal status. `failed` is returned as [`DeployError::DeploymentFailed`].
    pub async fn follow_deployment(
        &self,
        target: &StackRef,
        id: &str,
    ) -> DeployResult<DeploymentStatus> {
        let endpoint = target.deployment_path(id);

        loop {
            let status = match CallOutcome::classify(self.transport.get_json(&endpoint).await) {
                CallOutcome::Success(resp) => self.decode_status(&endpoint, &resp)?,
                CallOutcome::NotFound(resp) | CallOutcome::OtherError(resp) => {
                    return Err(self.http_failure(&endpoint, resp));
                }
                CallOutcome::TransportError(e) => return Err(self.transport_failure(&endpoint, e)),
            };

            if !status.is_running() {
                tracing::info!(target: TRACING_TARGET, deployment_id = id, %status, "Deployment finished");
                self.sink
                    .line(&format!("Deployment {} finished with status {}", id, status));
                if status.is_failed() {
                    return Err(DeployError::DeploymentFailed {
                        id: id.to_string(),
                        status: status.0,
                    });
                }
                return Ok(status);
            }

            tracing::debug!(target: TRACING_TARGET, deployment_id = id, %status, "Deployment in progress");
            self.sink.line(&format!("Deployment {} is {}", id, status));
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn decode_status(&self, endpoint: &str, resp: &RawResponse) -> DeployResult<DeploymentStatus> {
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(DeploymentStatus::new(""));
        }
        serde_json::from_slice::<DeploymentStatusResponse>(&resp.body)
            .map(|parsed| DeploymentStatus::new(parsed.status))
            .map_err(|e| DeployError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    async fn send(&self, endpoint: &str, body: &[u8]) -> CallOutcome {
        CallOutcome::classify(self.transport.post_json(endpoint, body).await)
    }

    fn finish(&self, endpoint: &str, resp: RawResponse) -> DeployResult<DeploymentResult> {
        let parsed = if resp.body.iter().all(u8::is_ascii_whitespace) {
            CreateDeploymentResponse::default()
        } else {
            serde_json::from_slice::<CreateDeploymentResponse>(&resp.body).map_err(|e| {
                DeployError::Decode {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            })?
        };

        tracing::info!(
            target: TRACING_TARGET,
            status = resp.status,
            deployment_id = parsed.id.as_deref().unwrap_or(""),
            "Deployment created"
        );
        self.sink.line(&format!(
            "Deployment successfully created.\nDeployment ID: {}\nConsole link: {}",
            parsed.id.as_deref().unwrap_or("-"),
            parsed.console_url.as_deref().unwrap_or("-"),
        ));

        Ok(DeploymentResult {
            status_code: resp.status,
            deployment_id: parsed.id,
            console_url: parsed.console_url,
        })
    }

    fn http_failure(&self, endpoint: &str, resp: RawResponse) -> DeployError {
        tracing::error!(target: TRACING_TARGET, endpoint, status = resp.status, "HTTP error");
        DeployError::Http {
            endpoint: endpoint.to_string(),
            status: resp.status,
            reason: resp.reason,
        }
    }

    fn transport_failure(&self, endpoint: &str, err: TransportError) -> DeployError {
        tracing::error!(target: TRACING_TARGET, endpoint, error = %err, "Request failed");
        DeployError::Transport {
            endpoint: endpoint.to_string(),
            message: err.0,
        }
    }
}
