//! Deploy orchestrator: install a package, then push its content archive.
//!
//! Every transport call runs on the blocking pool. The async methods are the
//! single implementation; the `_blocking` variants drive them to completion
//! on the orchestrator's runtime handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use metaforce_device::{
    DEFAULT_FILE_MODE, DeviceIdentity, DeviceSession, PushRequest, SessionError, TransportError,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::DeployError;
use crate::events::EventBus;
use crate::operation::{Operation, normalize_percent};
use crate::types::{DeployEvent, DeploymentTarget, OperationOptions, ProgressKind};

/// Why a worker-driven transport call did not succeed.
enum WorkerFailure {
    Cancelled,
    Failed(TransportError),
}

/// Sequences package installs and file pushes against the session's device.
///
/// Install and push are not mutually excluded: callers are expected to
/// await the install before starting the push.
pub struct DeployOrchestrator {
    session: Arc<DeviceSession>,
    events: EventBus,
    runtime: Handle,
}

impl DeployOrchestrator {
    /// Creates an orchestrator owning `session`. Worker tasks and the
    /// blocking call forms run on `runtime`.
    pub fn new(session: DeviceSession, runtime: Handle) -> Self {
        Self {
            session: Arc::new(session),
            events: EventBus::new(),
            runtime,
        }
    }

    /// Subscribes to status and progress events of every operation.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeployEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Device
    // -----------------------------------------------------------------------

    /// Starts the bridge server and binds the first attached device.
    pub async fn initialize(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        let session = Arc::clone(&self.session);
        self.session_call(move || session.initialize()).await
    }

    /// Blocking form of [`initialize`](Self::initialize).
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context, like every
    /// `_blocking` method.
    pub fn initialize_blocking(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        self.runtime.block_on(self.initialize())
    }

    /// Returns the currently bound device.
    pub async fn device_info(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        Ok(self.session.current()?)
    }

    pub fn device_info_blocking(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        self.runtime.block_on(self.device_info())
    }

    /// Re-enumerates devices and rebinds. Operations already in flight keep
    /// the device they started with.
    pub async fn refresh_device(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        let session = Arc::clone(&self.session);
        self.session_call(move || session.refresh()).await
    }

    pub fn refresh_device_blocking(&self) -> Result<Arc<DeviceIdentity>, DeployError> {
        self.runtime.block_on(self.refresh_device())
    }

    // -----------------------------------------------------------------------
    // Install
    // -----------------------------------------------------------------------

    /// Installs the package at `local_path` on the bound device.
    ///
    /// A missing or unreadable file fails with `SourceNotFound` before any
    /// event is emitted. Otherwise emits `Started`, install ticks, and one
    /// terminal status, including when no device is bound.
    pub async fn install_package(
        &self,
        local_path: impl AsRef<Path>,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        let local_path = local_path.as_ref().to_path_buf();
        source_size(&local_path).await?;

        let file_name = file_name(&local_path);
        let op = Arc::new(self.operation(ProgressKind::Install, &file_name, options));
        op.start(format!("Installing APK: {}", local_path.display()));
        let device = self.bound_device(&op, "Install failed")?;
        info!(
            operation = %op.id(),
            serial = %device.serial,
            path = %local_path.display(),
            "installing package"
        );

        let transport = self.session.transport();
        let worker_op = Arc::clone(&op);
        let path = local_path.clone();
        let tick_message = format!("Installing {file_name}");
        let result = self
            .run_on_worker(&op, move |cancel| {
                transport.install_package(
                    &device,
                    &path,
                    &mut |percent| {
                        worker_op.progress(normalize_percent(percent), 0, 0, tick_message.clone());
                    },
                    cancel,
                )
            })
            .await;

        match result {
            Ok(()) => {
                op.succeed("APK successfully installed".into(), format!("Installed {file_name}"));
                info!(operation = %op.id(), state = ?op.state(), "package installed");
                Ok(())
            }
            Err(WorkerFailure::Cancelled) => {
                op.cancelled("Install cancelled".into());
                warn!(operation = %op.id(), "install cancelled");
                Err(DeployError::Cancelled)
            }
            Err(WorkerFailure::Failed(e)) => {
                error!(operation = %op.id(), error = %e, "install failed");
                op.fail(format!("Install failed: {e}"));
                Err(DeployError::InstallFailed(e))
            }
        }
    }

    /// Blocking form of [`install_package`](Self::install_package).
    pub fn install_package_blocking(
        &self,
        local_path: impl AsRef<Path>,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        self.runtime
            .block_on(self.install_package(local_path, options))
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Copies `local_path` to `remote_path` on the bound device.
    ///
    /// The first progress event carries the local file size so subscribers
    /// can render a determinate indicator immediately.
    pub async fn push_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        let local_path = local_path.as_ref().to_path_buf();
        let size = source_size(&local_path).await?;

        let file_name = file_name(&local_path);
        let op = Arc::new(self.operation(ProgressKind::FileCopy, &file_name, options));
        op.start(format!(
            "Copying file: {} to {remote_path}",
            local_path.display()
        ));
        let device = self.bound_device(&op, "Copy failed")?;
        info!(
            operation = %op.id(),
            serial = %device.serial,
            path = %local_path.display(),
            remote = %remote_path,
            bytes = size,
            "pushing file"
        );
        let tick_message = format!("Copying {file_name}");
        op.progress(0, 0, size, tick_message.clone());

        let transport = self.session.transport();
        let worker_op = Arc::clone(&op);
        let path = local_path.clone();
        let remote = remote_path.to_string();
        let result = self
            .run_on_worker(&op, move |cancel| {
                let mut file = std::fs::File::open(&path)?;
                let request = PushRequest {
                    source: &mut file,
                    length: size,
                    remote_path: &remote,
                    mode: DEFAULT_FILE_MODE,
                    modified: SystemTime::now(),
                };
                transport.push_file(
                    &device,
                    request,
                    &mut |tick| {
                        worker_op.progress(
                            normalize_percent(tick.percent),
                            tick.received_bytes,
                            tick.total_bytes,
                            tick_message.clone(),
                        );
                    },
                    cancel,
                )
            })
            .await;

        match result {
            Ok(()) => {
                op.succeed("File successfully copied".into(), format!("Copied {file_name}"));
                info!(operation = %op.id(), state = ?op.state(), "file pushed");
                Ok(())
            }
            Err(WorkerFailure::Cancelled) => {
                op.cancelled("Copy cancelled".into());
                warn!(operation = %op.id(), "push cancelled");
                Err(DeployError::Cancelled)
            }
            Err(WorkerFailure::Failed(e)) => {
                error!(operation = %op.id(), error = %e, "push failed");
                op.fail(format!("Copy failed: {e}"));
                Err(DeployError::PushFailed(e))
            }
        }
    }

    /// Blocking form of [`push_file`](Self::push_file).
    pub fn push_file_blocking(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        self.runtime
            .block_on(self.push_file(local_path, remote_path, options))
    }

    // -----------------------------------------------------------------------
    // Full deployment
    // -----------------------------------------------------------------------

    /// Installs the package, then pushes the content archive. The push is
    /// skipped when the install does not succeed.
    pub async fn deploy(
        &self,
        target: &DeploymentTarget,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        self.install_package(&target.package_path, options.clone())
            .await?;
        self.push_file(&target.content_path, &target.destination, options)
            .await
    }

    pub fn deploy_blocking(
        &self,
        target: &DeploymentTarget,
        options: OperationOptions,
    ) -> Result<(), DeployError> {
        self.runtime.block_on(self.deploy(target, options))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn operation(&self, kind: ProgressKind, file_name: &str, options: OperationOptions) -> Operation {
        Operation::new(
            kind,
            file_name.to_string(),
            self.events.downgrade(),
            options.progress,
            options.cancel.unwrap_or_default(),
        )
    }

    /// The bound device, or a failed `op` when there is none.
    fn bound_device(
        &self,
        op: &Operation,
        failure: &str,
    ) -> Result<Arc<DeviceIdentity>, DeployError> {
        self.session.current().map_err(|e| {
            let e = DeployError::from(e);
            error!(operation = %op.id(), error = %e, "no device to deploy to");
            op.fail(format!("{failure}: {e}"));
            e
        })
    }

    async fn session_call<F>(&self, call: F) -> Result<Arc<DeviceIdentity>, DeployError>
    where
        F: FnOnce() -> Result<Arc<DeviceIdentity>, SessionError> + Send + 'static,
    {
        match self.runtime.spawn_blocking(call).await {
            Ok(result) => Ok(result?),
            Err(e) => Err(DeployError::TransportUnavailable(format!(
                "session worker failed: {e}"
            ))),
        }
    }

    /// Runs `work` on the blocking pool and waits for it or for cancellation,
    /// whichever comes first. A cancelled worker is detached; the operation
    /// gate keeps it from emitting anything further.
    async fn run_on_worker<F>(&self, op: &Operation, work: F) -> Result<(), WorkerFailure>
    where
        F: FnOnce(&CancellationToken) -> Result<(), TransportError> + Send + 'static,
    {
        let cancel = op.cancel_token().clone();
        let worker_cancel = cancel.clone();
        let handle = self.runtime.spawn_blocking(move || work(&worker_cancel));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerFailure::Cancelled),
            joined = handle => match joined {
                Ok(_) if cancel.is_cancelled() => Err(WorkerFailure::Cancelled),
                Ok(Ok(())) => Ok(()),
                Ok(Err(TransportError::Cancelled)) => Err(WorkerFailure::Cancelled),
                Ok(Err(e)) => Err(WorkerFailure::Failed(e)),
                Err(e) => Err(WorkerFailure::Failed(TransportError::Command(format!(
                    "transport worker failed: {e}"
                )))),
            },
        }
    }
}

/// Size of a readable regular file, or `SourceNotFound`.
async fn source_size(path: &Path) -> Result<u64, DeployError> {
    let checked = async {
        let file = tokio::fs::File::open(path).await?;
        file.metadata().await
    };
    match checked.await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        _ => {
            error!(path = %path.display(), "source file not found");
            Err(DeployError::SourceNotFound(PathBuf::from(path)))
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
