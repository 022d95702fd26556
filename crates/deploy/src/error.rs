//! Deploy error types.

use std::path::PathBuf;

use metaforce_device::{SessionError, TransportError};

/// Errors produced by the deploy orchestrator.
///
/// All are terminal for the operation that raised them; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("no device found")]
    NoDeviceFound,

    #[error("device transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("no device bound")]
    NoDeviceBound,

    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("install failed: {0}")]
    InstallFailed(#[source] TransportError),

    #[error("push failed: {0}")]
    PushFailed(#[source] TransportError),

    #[error("cancelled")]
    Cancelled,
}

impl From<SessionError> for DeployError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NoDeviceFound => Self::NoDeviceFound,
            SessionError::TransportUnavailable(msg) => Self::TransportUnavailable(msg),
            SessionError::NoDeviceBound => Self::NoDeviceBound,
        }
    }
}
