//! Transport and session error types.

/// Errors reported by a [`DeviceTransport`](crate::DeviceTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bridge server unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A device-side command failed; carries the native message.
    #[error("{0}")]
    Command(String),

    #[error("cancelled")]
    Cancelled,
}

/// Errors produced while binding or reading the session's device.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no device found")]
    NoDeviceFound,

    #[error("device transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("no device bound")]
    NoDeviceBound,
}
