//! Device identity, bridge transport seam, and the single-device session.
//!
//! The transport is an external collaborator: this crate only defines the
//! [`DeviceTransport`] trait the rest of the workspace drives. `metaforce-adb`
//! provides the production implementation; tests supply scripted mocks.
//!
//! A [`DeviceSession`] binds to exactly one device at a time, always the
//! first one the transport reports.

pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{SessionError, TransportError};
pub use session::DeviceSession;
pub use transport::{DEFAULT_FILE_MODE, DeviceTransport, PushRequest};
pub use types::{ConnectionState, DeviceIdentity, ServerStatus, SyncProgress};
