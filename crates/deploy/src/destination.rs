//! Where a package's content archive lives on the device.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Per-app external storage root on Android devices.
pub const DEVICE_APP_DATA_ROOT: &str = "/storage/emulated/0/Android/data";

/// Identity of an Android package, as reported by its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<String>,
}

impl PackageInfo {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            version_name: None,
            version_code: None,
        }
    }

    /// Content destination for this package under `root`.
    pub fn content_destination(&self, root: &str, archive_path: &Path) -> Option<String> {
        content_destination(root, &self.package_name, archive_path)
    }
}

/// Builds `<root>/<package>/files/<archive file name>`.
///
/// Returns `None` when the package name is blank or the archive path has no
/// file name.
pub fn content_destination(root: &str, package_name: &str, archive_path: &Path) -> Option<String> {
    let package_name = package_name.trim();
    if package_name.is_empty() {
        return None;
    }
    let archive = archive_path.file_name()?.to_string_lossy();
    let root = root.trim_end_matches('/');
    Some(format!("{root}/{package_name}/files/{archive}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_app_files_path() {
        let dest = content_destination(
            DEVICE_APP_DATA_ROOT,
            "com.metaforce.app",
            Path::new("/home/me/builds/content.zip"),
        );
        assert_eq!(
            dest.as_deref(),
            Some("/storage/emulated/0/Android/data/com.metaforce.app/files/content.zip")
        );
    }

    #[test]
    fn trailing_slash_on_root_is_ignored() {
        let info = PackageInfo::new("com.example");
        assert_eq!(
            info.content_destination("/sdcard/Android/data/", Path::new("data.zip"))
                .as_deref(),
            Some("/sdcard/Android/data/com.example/files/data.zip")
        );
    }

    #[test]
    fn rejects_blank_package_or_nameless_archive() {
        assert_eq!(content_destination(DEVICE_APP_DATA_ROOT, "  ", Path::new("a.zip")), None);
        assert_eq!(content_destination(DEVICE_APP_DATA_ROOT, "com.example", Path::new("/")), None);
    }
}
