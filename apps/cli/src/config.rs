//! Installer configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/metaforce/installer.toml`
//! - Windows: `%APPDATA%/metaforce/installer.toml`

use std::path::{Path, PathBuf};

use metaforce_deploy::DEVICE_APP_DATA_ROOT;
use serde::{Deserialize, Serialize};

/// Installer configuration. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit adb executable. Skips provisioning when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb_path: Option<PathBuf>,

    /// Directory holding adb and its support libraries, copied into the
    /// temp-dir cache on first use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb_bundle_dir: Option<PathBuf>,

    /// Device directory under which per-package content folders live.
    #[serde(default = "default_app_data_root")]
    pub app_data_root: String,

    /// Default `tracing` filter; `RUST_LOG` overrides it.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_app_data_root() -> String {
    DEVICE_APP_DATA_ROOT.into()
}

fn default_log_filter() -> String {
    "warn".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: None,
            adb_bundle_dir: None,
            app_data_root: default_app_data_root(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("metaforce")
            .join("installer.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("metaforce")
            .join("installer.toml"))
    }
}
