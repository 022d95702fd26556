//! The device-bridge transport seam.
//!
//! All calls are blocking. The orchestrator runs them on a worker thread and
//! passes a cancellation token the implementation is expected to poll
//! between units of work.

use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::types::{DeviceIdentity, ServerStatus, SyncProgress};

/// Default permission bits for pushed files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// A file transfer handed to [`DeviceTransport::push_file`].
pub struct PushRequest<'a> {
    pub source: &'a mut dyn Read,
    /// Length of `source` in bytes.
    pub length: u64,
    pub remote_path: &'a str,
    pub mode: u32,
    pub modified: SystemTime,
}

/// Abstract connection to the device-bridge server.
///
/// Implemented by `metaforce-adb` on top of the `adb` executable. Using a
/// trait keeps session and deploy logic testable with scripted mocks.
pub trait DeviceTransport: Send + Sync {
    /// Starts the bridge server at `server_path`, or attaches to a running one.
    fn start_server(&self, server_path: &Path) -> Result<ServerStatus, TransportError>;

    /// Enumerates attached devices in the order the server reports them.
    fn list_devices(&self) -> Result<Vec<DeviceIdentity>, TransportError>;

    /// Installs the package at `local_path`, reporting upload percent.
    fn install_package(
        &self,
        device: &DeviceIdentity,
        local_path: &Path,
        progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;

    /// Pushes `request.source` to `request.remote_path` on the device.
    fn push_file(
        &self,
        device: &DeviceIdentity,
        request: PushRequest<'_>,
        progress: &mut dyn FnMut(SyncProgress),
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;
}
