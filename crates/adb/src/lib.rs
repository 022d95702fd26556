//! `adb`-backed device transport.
//!
//! [`AdbCli`] shells out to the Android Debug Bridge client for server
//! startup, device enumeration, package installs and file pushes.
//! [`Provisioner`] places a bundled copy of the client in a temp-dir cache
//! on first use.

mod cli;
mod devices;
mod provision;

pub use cli::{AdbCli, STREAM_CHUNK_SIZE, shell_quote};
pub use devices::parse_devices;
pub use provision::{ADB_EXECUTABLE, BundledResource, Provisioner, default_cache_dir};
