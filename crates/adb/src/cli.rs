//! [`DeviceTransport`] implementation that drives the `adb` executable.
//!
//! File data is streamed through `adb exec-in` so byte-level progress and
//! cancellation stay under our control. Package installs upload the APK to
//! a temporary location first, then hand it to the package manager.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{PoisonError, RwLock};
use std::time::UNIX_EPOCH;

use metaforce_device::{
    DeviceIdentity, DeviceTransport, PushRequest, ServerStatus, SyncProgress, TransportError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::devices::parse_devices;

/// Bytes written to `exec-in` between progress reports.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Staging directory for package uploads.
const PACKAGE_STAGING_DIR: &str = "/data/local/tmp";

/// Talks to devices through the `adb` command-line client.
pub struct AdbCli {
    executable: RwLock<PathBuf>,
}

impl Default for AdbCli {
    fn default() -> Self {
        Self::new(crate::provision::ADB_EXECUTABLE)
    }
}

impl AdbCli {
    /// Creates a client for `executable`; [`start_server`] may replace it.
    ///
    /// [`start_server`]: DeviceTransport::start_server
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: RwLock::new(executable.into()),
        }
    }

    pub fn executable(&self) -> PathBuf {
        self.executable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn command(&self, args: &[&str]) -> Command {
        let exe = self.executable();
        debug!(exe = %exe.display(), ?args, "adb");
        let mut cmd = Command::new(exe);
        cmd.args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Output, TransportError> {
        let output = self.command(args).stdin(Stdio::null()).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(TransportError::Command(failure_message(&output)))
        }
    }

    fn shell(&self, serial: &str, script: &str) -> Result<Output, TransportError> {
        self.run(&["-s", serial, "shell", script])
    }

    /// Streams `source` into `script`'s stdin on the device.
    ///
    /// `on_chunk` receives the running byte count after every write.
    fn stream_to_device(
        &self,
        serial: &str,
        script: &str,
        source: &mut dyn Read,
        on_chunk: &mut dyn FnMut(u64),
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut child = self
            .command(&["-s", serial, "exec-in", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Command("adb stdin unavailable".into()))?;

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let mut sent: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                drop(stdin);
                abort(child);
                return Err(TransportError::Cancelled);
            }

            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(stdin);
                    abort(child);
                    return Err(e.into());
                }
            };

            if let Err(e) = stdin.write_all(&buf[..n]) {
                // A broken pipe means adb exited; its stderr says why.
                drop(stdin);
                let output = child.wait_with_output()?;
                let msg = failure_message(&output);
                return Err(if msg.is_empty() {
                    e.into()
                } else {
                    TransportError::Command(msg)
                });
            }

            sent += n as u64;
            on_chunk(sent);
        }

        drop(stdin);
        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TransportError::Command(failure_message(&output)))
        }
    }
}

impl DeviceTransport for AdbCli {
    fn start_server(&self, server_path: &Path) -> Result<ServerStatus, TransportError> {
        *self.executable.write().unwrap_or_else(PoisonError::into_inner) =
            server_path.to_path_buf();

        self.run(&["start-server"])
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let version = match self.run(&["version"]) {
            Ok(output) => parse_version(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                warn!(error = %e, "adb version query failed");
                None
            }
        };

        Ok(ServerStatus {
            running: true,
            version,
        })
    }

    fn list_devices(&self) -> Result<Vec<DeviceIdentity>, TransportError> {
        let output = self
            .run(&["devices", "-l"])
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install_package(
        &self,
        device: &DeviceIdentity,
        local_path: &Path,
        progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransportError::Command("package path has no file name".into()))?;
        let staged = format!("{PACKAGE_STAGING_DIR}/{file_name}");

        let mut file = std::fs::File::open(local_path)?;
        let length = file.metadata()?.len();

        let script = format!("cat > {}", shell_quote(&staged));
        self.stream_to_device(
            &device.serial,
            &script,
            &mut file,
            &mut |sent| progress(SyncProgress::from_bytes(sent, length).percent),
            cancel,
        )?;
        if length == 0 {
            progress(100.0);
        }

        if cancel.is_cancelled() {
            self.remove_staged(&device.serial, &staged);
            return Err(TransportError::Cancelled);
        }

        let result = self
            .shell(
                &device.serial,
                &format!("pm install -r {}", shell_quote(&staged)),
            )
            .and_then(|output| {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if stdout.contains("Success") {
                    Ok(())
                } else {
                    Err(TransportError::Command(stdout.trim().to_string()))
                }
            });

        self.remove_staged(&device.serial, &staged);
        result
    }

    fn push_file(
        &self,
        device: &DeviceIdentity,
        request: PushRequest<'_>,
        progress: &mut dyn FnMut(SyncProgress),
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let target = shell_quote(request.remote_path);
        let script = match parent_dir(request.remote_path) {
            Some(parent) => format!("mkdir -p {} && cat > {target}", shell_quote(parent)),
            None => format!("cat > {target}"),
        };

        let length = request.length;
        self.stream_to_device(
            &device.serial,
            &script,
            request.source,
            &mut |sent| progress(SyncProgress::from_bytes(sent, length)),
            cancel,
        )?;
        if length == 0 {
            progress(SyncProgress::from_bytes(0, 0));
        }

        let mtime = request
            .modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let attrs = format!(
            "chmod {:o} {target} && touch -m -d @{mtime} {target}",
            request.mode & 0o7777
        );
        if let Err(e) = self.shell(&device.serial, &attrs) {
            warn!(path = %request.remote_path, error = %e, "failed to set file attributes");
        }

        Ok(())
    }
}

impl AdbCli {
    fn remove_staged(&self, serial: &str, staged: &str) {
        if let Err(e) = self.shell(serial, &format!("rm -f {}", shell_quote(staged))) {
            warn!(path = %staged, error = %e, "failed to remove staged package");
        }
    }
}

fn abort(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.to_string()
    }
}

/// Extracts `1.0.41` from `Android Debug Bridge version 1.0.41`.
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Android Debug Bridge version "))
        .map(|v| v.trim().to_string())
}

/// Parent directory of a device path, if it has a non-root one.
fn parent_dir(remote_path: &str) -> Option<&str> {
    let trimmed = remote_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Single-quotes `value` for the device shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
