//! Parser for `adb devices -l` output.

use metaforce_device::{ConnectionState, DeviceIdentity};

const HEADER: &str = "List of devices attached";

/// Parses the long device listing into identities, preserving order.
///
/// Daemon chatter (`* daemon started successfully`) and blank lines are
/// skipped. A line looks like:
///
/// ```text
/// 2G0YC5ZF9J0123	device usb:1-1 product:eureka model:Quest_3 device:eureka transport_id:2
/// ```
pub fn parse_devices(output: &str) -> Vec<DeviceIdentity> {
    let mut lines = output.lines();
    // Everything up to and including the header is noise.
    if output.contains(HEADER) {
        for line in lines.by_ref() {
            if line.trim_start().starts_with(HEADER) {
                break;
            }
        }
    }

    lines.filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<DeviceIdentity> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('*') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let serial = fields.next()?;
    let state = fields.next().unwrap_or_default();

    // "no permissions (...)" spans several words; everything that isn't a
    // key:value pair is ignored.
    let mut identity = DeviceIdentity::new(serial, ConnectionState::from_adb(state));
    for field in fields {
        match field.split_once(':') {
            Some(("model", value)) => identity.model = value.replace('_', " "),
            Some(("device", value)) => identity.name = value.to_string(),
            _ => {}
        }
    }
    Some(identity)
}
