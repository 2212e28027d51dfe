use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(#[from] ConfigError),
    #[error("Queue is already running")]
    AlreadyRunning,
    #[error("Queue is not running")]
    NotRunning,
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),
    #[error("Backend rejected job with status {status} (retry after {retry_after}s)")]
    BackendRejected { status: u16, retry_after: u32 },
    #[error("Queue session lost: {0}")]
    SessionLost(String),
}

impl DispatchError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationInvalid(_) => "configuration_invalid",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::BackendUnreachable(_) => "backend_unreachable",
            Self::BackendRejected { .. } => "backend_rejected",
            Self::SessionLost(_) => "session_lost",
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
