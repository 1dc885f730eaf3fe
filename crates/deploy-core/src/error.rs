//! Error taxonomy for deployment requests.

/// Result alias used throughout the crate.
pub type DeployResult<T> = Result<T, DeployError>;

/// Exit code for failures detected before any network call.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for failed requests (HTTP or transport).
pub const EXIT_REQUEST: i32 = 1;

/// Everything that can stop a deployment from being created.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The payload cannot be sent as-is.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The backend answered with a status this driver does not recover from.
    #[error("Failed to call {endpoint} due to an HTTP error: {status} {reason}")]
    Http {
        endpoint: String,
        status: u16,
        reason: String,
    },

    /// The request never produced an HTTP response.
    #[error("Failed to call {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// A 2xx response whose body is not the expected JSON.
    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// A followed deployment reached the `failed` state.
    #[error("Deployment {id} finished with status {status}")]
    DeploymentFailed { id: String, status: String },
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Status code of the failing HTTP exchange, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the failure happened before anything was sent.
    pub fn is_pre_flight(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidPayload(_))
    }

    /// Process exit code the CLI should terminate with.
    pub fn exit_code(&self) -> i32 {
        if self.is_pre_flight() {
            EXIT_CONFIG
        } else {
            EXIT_REQUEST
        }
    }
}

impl From<config::ConfigError> for DeployError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
