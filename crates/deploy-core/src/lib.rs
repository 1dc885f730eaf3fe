//! deploy-core: create Pulumi Cloud deployments for one stack, creating the stack on 404.
//!
//! The CLI in `add-ons/deploy-driver` resolves a [`DriverConfig`], builds a
//! [`DeploymentRequester`] over [`ReqwestTransport`], optionally follows the
//! created deployment to completion, and maps [`DeployError`] onto process exit codes.

mod error;
mod payload;
mod requester;
mod settings;
mod stack;
mod status;
mod transport;

pub use error::{DeployError, DeployResult, EXIT_CONFIG, EXIT_REQUEST};
pub use payload::{
    operation_of, read_payload_file, DeploymentPayload, GitAuth, GitSource, Operation,
    OperationContext, SourceContext, DEFAULT_BRANCH, DEFAULT_REPO_DIR, DEFAULT_REPO_URL,
};
pub use requester::{CallOutcome, DeploymentRequester, DeploymentResult, DeploymentStatus};
pub use settings::{
    AccessToken, DriverConfig, Overrides, ResolvedConfig, DEFAULT_API_URL,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PROJECT, DEFAULT_STACK, ENV_CONFIG_PATH,
};
pub use stack::StackRef;
pub use status::{SilentSink, StatusSink, StdoutSink};
pub use transport::{DeploymentTransport, RawResponse, ReqwestTransport, TransportError};
