//! Typed views over device API responses.
//!
//! The device cloud reports the same facts under several field names
//! depending on firmware and API revision; each `from_value` constructor
//! accepts every spelling seen in the wild.

use edgecast_core::shape;
use edgecast_core::types::DeviceId;
use serde::Serialize;
use serde_json::Value;

use crate::shadow::ShadowSet;

const DEVICE_LIST_KEYS: &[&str] = &["devices", "data", "items", "results"];
const ALERT_LIST_KEYS: &[&str] = &["alerts", "data", "items", "results"];

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// One row of `GET devices`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    pub name: Option<String>,
    pub model: Option<String>,
    pub online: Option<bool>,
}

impl DeviceSummary {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: shape::first_string(value, &["device_id", "id", "guid", "serial_number"])?,
            name: shape::first_string(value, &["name", "label", "device_name"]),
            model: shape::first_string(value, &["model", "device_type", "product"]),
            online: online_flag(value),
        })
    }

    /// Parse a device listing; rows without an id are skipped.
    pub fn list_from_response(body: &Value) -> Vec<Self> {
        shape::extract_list(body, DEVICE_LIST_KEYS)
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }
}

/// `GET device/{id}/state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub online: Option<bool>,
    /// Address the device's listener outputs are reachable on.
    pub ip_address: Option<String>,
    pub firmware: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl DeviceState {
    pub fn from_value(device_id: &str, value: &Value) -> Self {
        Self {
            device_id: device_id.to_string(),
            online: online_flag(value),
            ip_address: shape::first_string(
                value,
                &[
                    "ip_address",
                    "ip",
                    "public_ip",
                    "wan_ip",
                    "network.ip_address",
                    "network.ip",
                    "state.ip_address",
                ],
            ),
            firmware: shape::first_string(
                value,
                &["firmware", "firmware_version", "version", "state.firmware"],
            ),
            raw: value.clone(),
        }
    }
}

fn online_flag(value: &Value) -> Option<bool> {
    shape::first_bool(value, &["online", "is_online", "connected", "state.online"]).or_else(|| {
        shape::first_string(value, &["status", "connection_status"])
            .map(|s| s.eq_ignore_ascii_case("online") || s.eq_ignore_ascii_case("connected"))
    })
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub severity: Option<String>,
    pub muted: bool,
}

impl Alert {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: shape::first_string(value, &["id", "alert_id", "guid"])?,
            code: shape::first_string(value, &["code", "type", "alert_type"]),
            message: shape::first_string(value, &["message", "description", "text"]),
            severity: shape::first_string(value, &["severity", "level"]),
            muted: shape::first_bool(value, &["muted", "is_muted", "silenced"]).unwrap_or(false),
        })
    }

    pub fn list_from_response(body: &Value) -> Vec<Self> {
        shape::extract_list(body, ALERT_LIST_KEYS)
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// State, shadows and alerts of one device, read concurrently.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub shadows: ShadowSet,
    pub alerts: Vec<Alert>,
}

/// One device of a fleet overview. A device whose state could not be read
/// is still listed, with the error rendered as text.
#[derive(Debug, Clone, Serialize)]
pub struct FleetEntry {
    pub device: DeviceSummary,
    pub state: Option<DeviceState>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
