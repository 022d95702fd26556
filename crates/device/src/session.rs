//! Single-device session.
//!
//! Owns the currently bound [`DeviceIdentity`] and mediates re-queries of
//! the transport. The snapshot is swapped atomically; readers clone the
//! `Arc` and never observe a half-updated identity.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::transport::DeviceTransport;
use crate::types::DeviceIdentity;

/// Holds the device the orchestrator deploys to.
pub struct DeviceSession {
    transport: Arc<dyn DeviceTransport>,
    server_path: PathBuf,
    current: RwLock<Option<Arc<DeviceIdentity>>>,
}

impl DeviceSession {
    /// Creates an unbound session. No transport calls are made until
    /// [`initialize`](Self::initialize).
    pub fn new(transport: Arc<dyn DeviceTransport>, server_path: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            server_path: server_path.into(),
            current: RwLock::new(None),
        }
    }

    /// Starts (or attaches to) the bridge server and binds the first device.
    pub fn initialize(&self) -> Result<Arc<DeviceIdentity>, SessionError> {
        let status = self
            .transport
            .start_server(&self.server_path)
            .map_err(|e| SessionError::TransportUnavailable(e.to_string()))?;
        debug!(
            path = %self.server_path.display(),
            version = status.version.as_deref().unwrap_or("unknown"),
            "bridge server ready"
        );
        self.bind()
    }

    /// Re-enumerates devices and rebinds to the first one.
    ///
    /// When no device is attached any more the previous binding is dropped,
    /// so a later [`current`](Self::current) reports `NoDeviceBound`.
    pub fn refresh(&self) -> Result<Arc<DeviceIdentity>, SessionError> {
        self.bind()
    }

    /// Returns the last-bound identity snapshot.
    pub fn current(&self) -> Result<Arc<DeviceIdentity>, SessionError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SessionError::NoDeviceBound)
    }

    /// The transport this session binds through.
    pub fn transport(&self) -> Arc<dyn DeviceTransport> {
        Arc::clone(&self.transport)
    }

    fn bind(&self) -> Result<Arc<DeviceIdentity>, SessionError> {
        let devices = self
            .transport
            .list_devices()
            .map_err(|e| SessionError::TransportUnavailable(e.to_string()))?;

        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let Some(first) = devices.into_iter().next() else {
            if slot.take().is_some() {
                warn!("previously bound device is gone");
            }
            return Err(SessionError::NoDeviceFound);
        };

        let identity = Arc::new(first);
        info!(
            serial = %identity.serial,
            state = %identity.state,
            model = %identity.model,
            "device bound"
        );
        *slot = Some(Arc::clone(&identity));
        Ok(identity)
    }
}
