//! Data types shared between the session and its transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state as reported by the bridge server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Unauthorized,
    Offline,
    #[default]
    Unknown,
}

impl ConnectionState {
    /// Maps the state column of `adb devices` to a connection state.
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => Self::Connected,
            "unauthorized" => Self::Unauthorized,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Unauthorized => "unauthorized",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one attached device.
///
/// The serial is unique per physical connection. Snapshots are replaced
/// wholesale on refresh, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub serial: String,
    pub state: ConnectionState,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(serial: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            serial: serial.into(),
            state,
            model: String::new(),
            name: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, name: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = name.into();
        self
    }
}

/// Result of starting (or attaching to) the bridge server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub running: bool,
    pub version: Option<String>,
}

/// One push progress tick as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncProgress {
    pub received_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

impl SyncProgress {
    /// Builds a tick, deriving the percentage from the byte counters.
    pub fn from_bytes(received_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            100.0
        } else {
            received_bytes as f64 * 100.0 / total_bytes as f64
        };
        Self {
            received_bytes,
            total_bytes,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_adb_column() {
        assert_eq!(ConnectionState::from_adb("device"), ConnectionState::Connected);
        assert_eq!(
            ConnectionState::from_adb("unauthorized"),
            ConnectionState::Unauthorized
        );
        assert_eq!(ConnectionState::from_adb("offline"), ConnectionState::Offline);
        assert_eq!(ConnectionState::from_adb("recovery"), ConnectionState::Unknown);
        assert_eq!(ConnectionState::from_adb(""), ConnectionState::Unknown);
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Unauthorized).unwrap();
        assert_eq!(json, "\"unauthorized\"");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn identity_missing_model_defaults_empty() {
        let id: DeviceIdentity =
            serde_json::from_str(r#"{"serial":"R5CT","state":"offline"}"#).unwrap();
        assert_eq!(id, DeviceIdentity::new("R5CT", ConnectionState::Offline));
    }

    #[test]
    fn sync_progress_percent_from_bytes() {
        let tick = SyncProgress::from_bytes(1024, 4096);
        assert_eq!(tick.percent, 25.0);

        // An empty source is complete as soon as it starts.
        assert_eq!(SyncProgress::from_bytes(0, 0).percent, 100.0);
    }
}
