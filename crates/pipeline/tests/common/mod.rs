#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edgecast_core::ports::PortRange;
use edgecast_core::profile::{Profile, TargetKind};
use edgecast_core::settings::{AuthScheme, ConnectionSettings, DeviceSettings};
use edgecast_core::types::{EntryId, ShadowVersion};
use edgecast_device::error::DeviceError;
use edgecast_device::gateway::DeviceGateway;
use edgecast_device::messages::DeviceState;
use edgecast_device::shadow::{ShadowAck, ShadowSet, ShadowWrite, ENCODERS, INPUTS, OUTPUTS};
use edgecast_pipeline::downstream::Registries;
use edgecast_pipeline::orchestrator::Orchestrator;
use edgecast_registry::entity::{RemoteEntity, StreamPayload};
use edgecast_registry::error::RegistryError;
use edgecast_registry::Registry;
use serde_json::{json, Value};

pub const DEVICE_ID: &str = "dev-1";
pub const DEVICE_IP: &str = "203.0.113.7";

/// Settings pointing nowhere; the fakes below never touch the network.
pub fn test_settings(port_range: PortRange) -> ConnectionSettings {
    ConnectionSettings {
        device: DeviceSettings {
            base_url: "http://device.invalid".into(),
            token: "t".into(),
            auth: AuthScheme::Bearer,
            org: None,
        },
        channel: None,
        ingest: None,
        relay_url: None,
        request_timeout: Duration::from_secs(5),
        port_range,
    }
}

/// The profile of the reference scenario: one channel output.
pub fn studio_a() -> Profile {
    let mut profile = Profile::new("Studio-A");
    profile.add_output(TargetKind::Channel, "primary");
    profile
}

// ---------------------------------------------------------------------------
// Fake device
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateShape {
    Array,
    /// Entries keyed by id, without an `id` field in the body.
    Map,
}

#[derive(Debug, Clone)]
struct FakeShadow {
    version: ShadowVersion,
    entries: Vec<Value>,
}

#[derive(Debug)]
struct DeviceModel {
    shadows: BTreeMap<String, FakeShadow>,
    next_ids: BTreeMap<String, EntryId>,
    /// Reads still answered with the pre-write snapshot.
    stale_reads: usize,
    stale_snapshot: Option<Value>,
}

/// In-memory device: assigns ids on write, bumps versions, rejects stale
/// versions and can lag behind its own writes.
pub struct FakeDevice {
    model: Mutex<DeviceModel>,
    pub ip: Mutex<Option<String>>,
    pub shape: StateShape,
    /// Number of reads after each write that still see the old state.
    pub read_lag: usize,
    /// Shadow whose writes are rejected with a 500.
    pub reject_writes_to: Option<&'static str>,
    /// Shadow whose writes are acknowledged but never applied.
    pub ignore_writes_to: Option<&'static str>,
    pub state_fails: bool,
    pub writes: AtomicUsize,
    pub output_updates: AtomicUsize,
    pub write_log: Mutex<Vec<ShadowWrite>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        let mut shadows = BTreeMap::new();
        shadows.insert(
            INPUTS.to_string(),
            FakeShadow {
                version: 1,
                entries: vec![json!({ "id": 1, "name": "SDI 1" })],
            },
        );
        for name in [ENCODERS, OUTPUTS] {
            shadows.insert(
                name.to_string(),
                FakeShadow {
                    version: 1,
                    entries: Vec::new(),
                },
            );
        }
        let next_ids = [(ENCODERS.to_string(), 10), (OUTPUTS.to_string(), 20)]
            .into_iter()
            .collect();

        Self {
            model: Mutex::new(DeviceModel {
                shadows,
                next_ids,
                stale_reads: 0,
                stale_snapshot: None,
            }),
            ip: Mutex::new(Some(DEVICE_IP.to_string())),
            shape: StateShape::Array,
            read_lag: 0,
            reject_writes_to: None,
            ignore_writes_to: None,
            state_fails: false,
            writes: AtomicUsize::new(0),
            output_updates: AtomicUsize::new(0),
            write_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_shape(mut self, shape: StateShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_read_lag(mut self, reads: usize) -> Self {
        self.read_lag = reads;
        self
    }

    pub fn rejecting_writes_to(mut self, shadow: &'static str) -> Self {
        self.reject_writes_to = Some(shadow);
        self
    }

    pub fn ignoring_writes_to(mut self, shadow: &'static str) -> Self {
        self.ignore_writes_to = Some(shadow);
        self
    }

    pub fn without_state(mut self) -> Self {
        self.state_fails = true;
        self
    }

    /// Seed a shadow's entries directly, as if written earlier.
    pub fn seed(&self, shadow: &str, entries: Vec<Value>) {
        let mut model = self.model.lock().unwrap();
        let slot = model.shadows.entry(shadow.to_string()).or_insert(FakeShadow {
            version: 1,
            entries: Vec::new(),
        });
        slot.entries = entries;
        slot.version += 1;
    }

    pub fn entries(&self, shadow: &str) -> Vec<Value> {
        self.model.lock().unwrap().shadows[shadow].entries.clone()
    }

    pub fn version(&self, shadow: &str) -> ShadowVersion {
        self.model.lock().unwrap().shadows[shadow].version
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn render(&self, model: &DeviceModel) -> Value {
        let shadows: Vec<Value> = model
            .shadows
            .iter()
            .map(|(name, shadow)| {
                let state = match self.shape {
                    StateShape::Array => Value::Array(shadow.entries.clone()),
                    StateShape::Map => {
                        let map = shadow
                            .entries
                            .iter()
                            .map(|entry| {
                                let mut body = entry.clone();
                                let id = body
                                    .as_object_mut()
                                    .and_then(|o| o.remove("id"))
                                    .map(|v| v.to_string())
                                    .unwrap_or_default();
                                (id, body)
                            })
                            .collect();
                        Value::Object(map)
                    }
                };
                json!({
                    "shadow_name": name,
                    "reported": { "state": state, "version": shadow.version }
                })
            })
            .collect();
        json!({ "shadows": shadows })
    }

    fn mark_written(&self, model: &mut DeviceModel, before: Value) {
        if self.read_lag > 0 {
            model.stale_reads = self.read_lag;
            model.stale_snapshot = Some(before);
        }
    }
}

#[async_trait]
impl DeviceGateway for FakeDevice {
    async fn read_shadows(&self, _device_id: &str) -> Result<ShadowSet, DeviceError> {
        let mut model = self.model.lock().unwrap();
        let body = match (&model.stale_snapshot, model.stale_reads) {
            (Some(snapshot), n) if n > 0 => {
                let body = snapshot.clone();
                model.stale_reads -= 1;
                body
            }
            _ => self.render(&model),
        };
        ShadowSet::from_response(&body)
    }

    async fn write_shadow(
        &self,
        _device_id: &str,
        write: &ShadowWrite,
    ) -> Result<ShadowAck, DeviceError> {
        if self.reject_writes_to == Some(write.shadow_name.as_str()) {
            return Err(DeviceError::Api {
                status: 500,
                body: "internal error".into(),
            });
        }

        let mut model = self.model.lock().unwrap();
        let before = self.render(&model);
        let current = model
            .shadows
            .get(&write.shadow_name)
            .map(|s| s.version)
            .unwrap_or(0);
        if current != write.target_version {
            return Err(DeviceError::VersionConflict {
                shadow: write.shadow_name.clone(),
                target_version: write.target_version,
            });
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        self.write_log.lock().unwrap().push(write.clone());
        let ack = ShadowAck {
            command_id: Some(format!("cmd-{}", self.write_count())),
        };
        if self.ignore_writes_to == Some(write.shadow_name.as_str()) {
            return Ok(ack);
        }

        let mut next_id = model.next_ids.get(&write.shadow_name).copied().unwrap_or(100);
        let entries: Vec<Value> = write
            .state
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut entry| {
                if entry.get("id").is_none() {
                    entry["id"] = json!(next_id);
                    next_id += 1;
                }
                entry
            })
            .collect();
        model.next_ids.insert(write.shadow_name.clone(), next_id);
        model.shadows.insert(
            write.shadow_name.clone(),
            FakeShadow {
                version: current + 1,
                entries,
            },
        );
        self.mark_written(&mut model, before);
        Ok(ack)
    }

    async fn device_state(&self, device_id: &str) -> Result<DeviceState, DeviceError> {
        if self.state_fails {
            return Err(DeviceError::Api {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let ip = self.ip.lock().unwrap().clone();
        Ok(DeviceState::from_value(
            device_id,
            &json!({ "online": true, "ip_address": ip }),
        ))
    }

    async fn update_output(
        &self,
        _device_id: &str,
        output_id: EntryId,
        enable: bool,
    ) -> Result<(), DeviceError> {
        let mut model = self.model.lock().unwrap();
        let before = self.render(&model);
        let outputs = model
            .shadows
            .get_mut(OUTPUTS)
            .ok_or_else(|| DeviceError::Decode("no outputs".into()))?;
        let entry = outputs
            .entries
            .iter_mut()
            .find(|e| e["id"] == json!(output_id))
            .ok_or(DeviceError::Api {
                status: 404,
                body: "no such output".into(),
            })?;
        entry["enable"] = json!(enable);
        outputs.version += 1;
        self.mark_written(&mut model, before);
        self.output_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake registry
// ---------------------------------------------------------------------------

/// In-memory downstream registry that counts what it was asked to do.
pub struct FakeRegistry {
    name: &'static str,
    entities: Mutex<Vec<RemoteEntity>>,
    pub payloads: Mutex<Vec<StreamPayload>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub failing: bool,
}

impl FakeRegistry {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entities: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            failing: false,
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            failing: true,
            ..Self::new(name)
        }
    }

    pub fn entities(&self) -> Vec<RemoteEntity> {
        self.entities.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.failing {
            return Err(RegistryError::Api {
                registry: self.name,
                status: 502,
                body: "upstream down".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteEntity>, RegistryError> {
        self.check()?;
        Ok(self
            .entities
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.label.eq_ignore_ascii_case(label))
            .cloned())
    }

    async fn create(&self, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        self.check()?;
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let entity = RemoteEntity {
            id: format!("{}-{n}", self.name),
            label: payload.label.clone(),
            stream_url: Some(payload.stream_url.clone()),
        };
        self.entities.lock().unwrap().push(entity.clone());
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(entity)
    }

    async fn update(&self, id: &str, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        self.check()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut entities = self.entities.lock().unwrap();
        let entity = entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RegistryError::Api {
                registry: self.name,
                status: 404,
                body: format!("no entity {id}"),
            })?;
        entity.stream_url = Some(payload.stream_url.clone());
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(entity.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        self.check()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.entities.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub device: Arc<FakeDevice>,
    pub channel: Arc<FakeRegistry>,
    pub ingest: Arc<FakeRegistry>,
    pub orchestrator: Orchestrator,
}

pub fn harness(device: FakeDevice) -> Harness {
    harness_with(device, FakeRegistry::new("channel"), FakeRegistry::new("ingest"), PortRange::default())
}

pub fn harness_with(
    device: FakeDevice,
    channel: FakeRegistry,
    ingest: FakeRegistry,
    port_range: PortRange,
) -> Harness {
    let device = Arc::new(device);
    let channel = Arc::new(channel);
    let ingest = Arc::new(ingest);
    let registries = Registries {
        channel: Some(Arc::clone(&channel) as Arc<dyn Registry>),
        ingest: Some(Arc::clone(&ingest) as Arc<dyn Registry>),
    };
    let orchestrator = Orchestrator::new(
        Arc::new(test_settings(port_range)),
        Arc::clone(&device) as Arc<dyn DeviceGateway>,
        registries,
    );
    Harness {
        device,
        channel,
        ingest,
        orchestrator,
    }
}
