//! One-time extraction of the bridge's support binaries.
//!
//! The cache lives under the system temp directory and is guarded only by
//! an existence check on the primary executable. Two processes provisioning
//! at the same moment may both write the files; there is no cross-process
//! lock.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

/// Name of the adb executable on this platform.
#[cfg(windows)]
pub const ADB_EXECUTABLE: &str = "adb.exe";
#[cfg(not(windows))]
pub const ADB_EXECUTABLE: &str = "adb";

/// Default cache directory: `<temp>/metaforce-installer/adb`.
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("metaforce-installer").join("adb")
}

/// A file to place in the cache directory.
#[derive(Debug, Clone)]
pub struct BundledResource {
    pub file_name: String,
    pub contents: Cow<'static, [u8]>,
}

impl BundledResource {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// Extracts bundled resources into a cache directory on first use.
#[derive(Debug, Clone)]
pub struct Provisioner {
    cache_dir: PathBuf,
    primary: String,
    resources: Vec<BundledResource>,
}

impl Provisioner {
    /// Creates a provisioner whose primary file is [`ADB_EXECUTABLE`].
    pub fn new(cache_dir: impl Into<PathBuf>, resources: Vec<BundledResource>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            primary: ADB_EXECUTABLE.into(),
            resources,
        }
    }

    /// Loads every regular file in `bundle_dir` as a resource.
    pub fn from_bundle_dir(
        cache_dir: impl Into<PathBuf>,
        bundle_dir: &Path,
    ) -> std::io::Result<Self> {
        let mut resources = Vec::new();
        for entry in std::fs::read_dir(bundle_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let contents = std::fs::read(entry.path())?;
            resources.push(BundledResource::new(
                entry.file_name().to_string_lossy().into_owned(),
                contents,
            ));
        }
        Ok(Self::new(cache_dir, resources))
    }

    pub fn primary_path(&self) -> PathBuf {
        self.cache_dir.join(&self.primary)
    }

    /// Ensures the cache is populated and returns the primary executable path.
    ///
    /// Idempotent: when the primary file already exists nothing is written.
    pub fn ensure(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let primary = self.primary_path();
        if primary.exists() {
            return Ok(primary);
        }

        if !self.resources.iter().any(|r| r.file_name == self.primary) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("bundle does not contain {}", self.primary),
            ));
        }

        // Primary goes last so an interrupted extraction is retried next time.
        let (rest, primary_res): (Vec<_>, Vec<_>) = self
            .resources
            .iter()
            .partition(|r| r.file_name != self.primary);
        for resource in rest.into_iter().chain(primary_res) {
            let path = self.cache_dir.join(&resource.file_name);
            info!(resource = %resource.file_name, path = %path.display(), "extracting resource");
            let mut file = std::fs::File::create(&path)?;
            file.write_all(&resource.contents)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
            }
        }

        Ok(primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Vec<BundledResource> {
        vec![
            BundledResource::new(ADB_EXECUTABLE, b"#!/bin/sh\n".as_slice()),
            BundledResource::new("AdbWinApi.dll", b"dll".as_slice()),
        ]
    }

    #[test]
    fn default_cache_dir_under_temp() {
        let dir = default_cache_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with("metaforce-installer/adb"));
    }

    #[test]
    fn ensure_extracts_all_resources() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("adb");
        let provisioner = Provisioner::new(&cache, bundle());

        let path = provisioner.ensure().unwrap();

        assert_eq!(path, cache.join(ADB_EXECUTABLE));
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/bin/sh\n");
        assert_eq!(std::fs::read(cache.join("AdbWinApi.dll")).unwrap(), b"dll");
    }

    #[test]
    fn ensure_skips_when_primary_exists() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(ADB_EXECUTABLE), b"already here").unwrap();
        let provisioner = Provisioner::new(tmp.path(), bundle());

        let path = provisioner.ensure().unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"already here");
        assert!(!tmp.path().join("AdbWinApi.dll").exists());
    }

    #[test]
    fn ensure_without_primary_in_bundle_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::new(
            tmp.path(),
            vec![BundledResource::new("AdbWinApi.dll", b"dll".as_slice())],
        );

        let err = provisioner.ensure().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn from_bundle_dir_reads_files() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle_dir = tmp.path().join("bundle");
        std::fs::create_dir_all(bundle_dir.join("nested")).unwrap();
        std::fs::write(bundle_dir.join(ADB_EXECUTABLE), b"bin").unwrap();
        std::fs::write(bundle_dir.join("AdbWinUsbApi.dll"), b"usb").unwrap();

        let provisioner = Provisioner::from_bundle_dir(tmp.path().join("cache"), &bundle_dir).unwrap();
        let path = provisioner.ensure().unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"bin");
        assert!(tmp.path().join("cache").join("AdbWinUsbApi.dll").exists());
        assert!(!tmp.path().join("cache").join("nested").exists());
    }
}
