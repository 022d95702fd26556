//! Install-then-push deployment to the bound Android device.
//!
//! The orchestrator owns a [`metaforce_device::DeviceSession`] and runs the
//! two operations a deployment consists of:
//!
//! 1. **Install** the application package on the device
//! 2. **Push** the content archive to its destination path
//!
//! Each operation emits a `Started` status, normalized progress ticks, and
//! exactly one terminal status to every subscriber. Both are available as
//! async methods and as `_blocking` wrappers around them.

pub mod deploy;
pub mod destination;
pub mod error;
pub mod events;
mod operation;
pub mod types;

// Re-export primary types for convenience.
pub use deploy::DeployOrchestrator;
pub use destination::{DEVICE_APP_DATA_ROOT, PackageInfo, content_destination};
pub use error::DeployError;
pub use events::{EventBus, WeakEventBus};
pub use types::{
    DeployEvent, DeploymentTarget, Milestone, OperationOptions, OperationState, ProgressEvent,
    ProgressKind, StatusEvent,
};
