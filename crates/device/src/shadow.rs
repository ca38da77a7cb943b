//! Versioned shadow documents reported by the device.
//!
//! A shadow's reported state arrives either as an array of entries, as a
//! map of entries keyed by an arbitrary id, or as an object wrapping one
//! array. [`Shadow::from_state`] normalizes all of them into one ordered
//! sequence of [`ShadowEntry`] so matching logic never sniffs shapes.

use std::collections::BTreeMap;

use edgecast_core::shape;
use edgecast_core::types::{EntryId, ShadowVersion};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DeviceError;

/// Shadow holding the device's input sources.
pub const INPUTS: &str = "Inputs";

/// Shadow holding video and audio encoder entries.
pub const ENCODERS: &str = "Encoders";

/// Shadow holding network output entries.
pub const OUTPUTS: &str = "Outputs";

const ID_PATHS: &[&str] = &["id", "_id"];
const NAME_PATHS: &[&str] = &["name", "label", "config.name"];
const KIND_PATHS: &[&str] = &["kind", "type"];
const PORT_PATHS: &[&str] = &[
    "config.destination_port",
    "config.port",
    "destination_port",
    "port",
];
const ENABLE_PATHS: &[&str] = &["enable", "enabled", "config.enable"];

// ---------------------------------------------------------------------------
// ShadowEntry
// ---------------------------------------------------------------------------

/// One entry of a shadow (an input, an encoder, an output).
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowEntry {
    id: Option<EntryId>,
    name: Option<String>,
    body: Value,
}

impl ShadowEntry {
    /// Wrap a raw entry. `key` is the map key the entry was reported
    /// under, used as id when the body carries none.
    pub fn from_value(body: Value, key: Option<&str>) -> Self {
        let id = shape::first_i64(&body, ID_PATHS)
            .or_else(|| key.and_then(|k| k.trim().parse().ok()));
        let name = shape::first_string(&body, NAME_PATHS);
        Self { id, name, body }
    }

    /// Device-assigned id, absent until the device processes a creation.
    pub fn id(&self) -> Option<EntryId> {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// `video` / `audio` for encoder entries.
    pub fn kind(&self) -> Option<String> {
        shape::first_string(&self.body, KIND_PATHS).map(|k| k.to_ascii_lowercase())
    }

    /// Listener or destination port for output entries.
    pub fn port(&self) -> Option<u16> {
        shape::first_i64(&self.body, PORT_PATHS).and_then(|p| u16::try_from(p).ok())
    }

    pub fn enabled(&self) -> Option<bool> {
        shape::first_bool(&self.body, ENABLE_PATHS)
    }

    /// Entry body to send back in a write, with `id` restored when the
    /// device only reported it as a map key.
    pub fn to_state(&self) -> Value {
        let mut body = self.body.clone();
        if let (Some(id), Value::Object(map)) = (self.id, &mut body) {
            map.entry("id").or_insert(Value::from(id));
        }
        body
    }

    /// Entry body with the enable flag set to `enable`.
    pub fn to_state_with_enable(&self, enable: bool) -> Value {
        let mut body = self.to_state();
        if let Value::Object(map) = &mut body {
            if let Some(Value::Object(config)) = map.get_mut("config") {
                if config.contains_key("enable") {
                    config.insert("enable".into(), Value::Bool(enable));
                }
            }
            if map.contains_key("enabled") {
                map.insert("enabled".into(), Value::Bool(enable));
            } else {
                map.insert("enable".into(), Value::Bool(enable));
            }
        }
        body
    }
}

// ---------------------------------------------------------------------------
// Shadow
// ---------------------------------------------------------------------------

/// A named, versioned sub-document reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub name: String,
    pub version: ShadowVersion,
    pub entries: Vec<ShadowEntry>,
}

impl Shadow {
    /// An empty shadow; what the device reports for a document it never
    /// populated.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            entries: Vec::new(),
        }
    }

    /// Normalize a reported state into an ordered entry sequence.
    ///
    /// - Array: entries in reported order.
    /// - Object whose values are all objects: map of id -> entry, ordered
    ///   by numeric key first, then lexically.
    /// - Object with an array-valued field: that array.
    /// - Anything else: no entries.
    pub fn from_state(name: impl Into<String>, version: ShadowVersion, state: &Value) -> Self {
        let entries = match state {
            Value::Array(items) => items
                .iter()
                .map(|item| ShadowEntry::from_value(item.clone(), None))
                .collect(),
            Value::Object(map) if !map.is_empty() && map.values().all(Value::is_object) => {
                entries_from_map(map)
            }
            Value::Object(map) => map
                .values()
                .find_map(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .map(|item| ShadowEntry::from_value(item.clone(), None))
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Self {
            name: name.into(),
            version,
            entries,
        }
    }

    pub fn find_by_id(&self, id: EntryId) -> Option<&ShadowEntry> {
        self.entries.iter().find(|e| e.id() == Some(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ShadowEntry> {
        self.entries.iter().find(|e| e.name() == Some(name))
    }

    pub fn find_by_port(&self, port: u16) -> Option<&ShadowEntry> {
        self.entries.iter().find(|e| e.port() == Some(port))
    }

    /// All ids currently reported.
    pub fn ids(&self) -> Vec<EntryId> {
        self.entries.iter().filter_map(ShadowEntry::id).collect()
    }

    /// Whether this report can include a write made against
    /// `target_version`. A device that reports no version (0) cannot be
    /// ruled out.
    pub fn reflects_write(&self, target_version: ShadowVersion) -> bool {
        self.version == 0 || self.version > target_version
    }
}

fn entries_from_map(map: &Map<String, Value>) -> Vec<ShadowEntry> {
    let mut keyed: Vec<(&String, &Value)> = map.iter().collect();
    keyed.sort_by(|(a, _), (b, _)| {
        match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        }
    });
    keyed
        .into_iter()
        .map(|(key, value)| ShadowEntry::from_value(value.clone(), Some(key)))
        .collect()
}

// ---------------------------------------------------------------------------
// ShadowSet
// ---------------------------------------------------------------------------

/// Every shadow reported by one device, keyed by shadow name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowSet {
    shadows: BTreeMap<String, Shadow>,
}

impl ShadowSet {
    pub fn new(shadows: impl IntoIterator<Item = Shadow>) -> Self {
        Self {
            shadows: shadows.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Parse a `GET device/{id}/shadows` body.
    ///
    /// Accepts `{"shadows": [...]}`, a bare array of shadow records, or an
    /// object keyed by shadow name. Each record may nest its state and
    /// version under `reported` or carry them at top level.
    pub fn from_response(body: &Value) -> Result<Self, DeviceError> {
        let records: Vec<(String, &Value)> = match body {
            Value::Object(map) if map.contains_key("shadows") => match &map["shadows"] {
                Value::Array(items) => named_records(items)?,
                Value::Object(inner) => inner.iter().map(|(k, v)| (k.clone(), v)).collect(),
                other => {
                    return Err(DeviceError::Decode(format!(
                        "\"shadows\" is neither array nor object: {other}"
                    )))
                }
            },
            Value::Array(items) => named_records(items)?,
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            other => {
                return Err(DeviceError::Decode(format!(
                    "shadow listing is not an object: {other}"
                )))
            }
        };

        let shadows = records.into_iter().map(|(name, record)| {
            let reported = record.get("reported").unwrap_or(record);
            let version = shape::first_i64(reported, &["version"])
                .or_else(|| shape::first_i64(record, &["version", "metadata.version"]))
                .unwrap_or(0);
            let state = reported.get("state").unwrap_or(&Value::Null);
            Shadow::from_state(name, version, state)
        });

        Ok(Self::new(shadows))
    }

    /// Look up a shadow by name, case-insensitively as a fallback.
    pub fn get(&self, name: &str) -> Option<&Shadow> {
        self.shadows.get(name).or_else(|| {
            self.shadows
                .values()
                .find(|s| s.name.eq_ignore_ascii_case(name))
        })
    }

    /// The named shadow, or an empty version-0 shadow if not reported.
    pub fn get_or_empty(&self, name: &str) -> Shadow {
        self.get(name).cloned().unwrap_or_else(|| Shadow::empty(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shadows.keys().map(String::as_str)
    }
}

fn named_records(items: &[Value]) -> Result<Vec<(String, &Value)>, DeviceError> {
    items
        .iter()
        .map(|item| {
            shape::first_string(item, &["shadow_name", "name"])
                .map(|name| (name, item))
                .ok_or_else(|| DeviceError::Decode("shadow record without a name".into()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One `set` command against a shadow, guarded by the last seen version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowWrite {
    pub shadow_name: String,
    pub target_version: ShadowVersion,
    pub state: Value,
}

impl ShadowWrite {
    /// Write `entries` as the full state of `shadow`, guarded by the
    /// version the shadow was read at.
    pub fn replace(shadow: &Shadow, entries: Vec<Value>) -> Self {
        Self {
            shadow_name: shadow.name.clone(),
            target_version: shadow.version,
            state: Value::Array(entries),
        }
    }

    /// Request body for `POST device/{id}/shadows/commands`.
    pub fn command_body(&self) -> Value {
        serde_json::json!({
            "command_type": "set",
            "commands": [self],
        })
    }
}

/// Acknowledgement of an accepted shadow command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowAck {
    pub command_id: Option<String>,
}

impl ShadowAck {
    pub fn from_response(body: &Value) -> Self {
        Self {
            command_id: shape::first_string(body, &["command_guid", "command_id", "id"]),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
