//! Output entries: planning one per intent, merging into the `Outputs`
//! shadow, and matching what the device reports back.

use std::collections::{BTreeMap, HashSet};

use edgecast_core::profile::{Profile, TargetKind};
use edgecast_core::types::EntryId;
use edgecast_device::shadow::{Shadow, ShadowEntry};
use serde_json::{json, Value};

use crate::encoders::EncoderIds;
use crate::error::DeployError;

/// SRT handshake role of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// The device listens; the platform pulls.
    Listener,
    /// The device pushes to an operator-supplied address.
    Caller,
}

impl CallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::Caller => "caller",
        }
    }
}

/// The output entry the run will write for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub intent_id: String,
    pub target: TargetKind,
    pub entry_name: String,
    pub port: u16,
    pub mode: CallMode,
    /// Push destination, caller mode only.
    pub destination_ip: Option<String>,
}

/// One plan per intent, in profile order.
///
/// Platform intents listen on their allocated port. Manual intents call
/// the operator's destination, offsetting its port by the intent's index
/// so several manual outputs never share one.
pub fn plan_outputs(
    profile: &Profile,
    ports: &BTreeMap<String, u16>,
) -> Result<Vec<OutputPlan>, DeployError> {
    profile
        .outputs
        .iter()
        .enumerate()
        .map(|(index, intent)| {
            let entry_name = profile.output_entry_name(intent);
            if intent.target.is_platform() {
                let port = *ports.get(&intent.id).ok_or_else(|| DeployError::NotFound {
                    entity: "port allocation",
                    name: intent.name.clone(),
                })?;
                return Ok(OutputPlan {
                    intent_id: intent.id.clone(),
                    target: intent.target,
                    entry_name,
                    port,
                    mode: CallMode::Listener,
                    destination_ip: None,
                });
            }

            let manual = profile.manual.as_ref().ok_or_else(|| {
                DeployError::Validation("A manual output requires a destination IP and port".into())
            })?;
            let port = u16::try_from(usize::from(manual.port) + index).map_err(|_| {
                DeployError::Validation(format!(
                    "Manual port {} + {index} is out of range",
                    manual.port
                ))
            })?;
            Ok(OutputPlan {
                intent_id: intent.id.clone(),
                target: intent.target,
                entry_name,
                port,
                mode: CallMode::Caller,
                destination_ip: Some(manual.ip.clone()),
            })
        })
        .collect()
}

/// Body of a new output entry.
pub fn output_entry(plan: &OutputPlan, encoders: EncoderIds) -> Value {
    let mut config = json!({
        "call_mode": plan.mode.as_str(),
        "destination_port": plan.port,
    });
    if let Some(ip) = &plan.destination_ip {
        config["destination_ip"] = Value::from(ip.as_str());
    }
    json!({
        "name": plan.entry_name,
        "protocol": "srt",
        "enable": true,
        "sources": [encoders.video, encoders.audio],
        "config": config,
    })
}

/// Whether an existing entry is superseded by this run: it carries an id
/// remembered from a previous deploy, or the name of a planned entry.
fn is_replaced(entry: &ShadowEntry, remembered: &HashSet<EntryId>, names: &HashSet<&str>) -> bool {
    entry.id().is_some_and(|id| remembered.contains(&id))
        || entry.name().is_some_and(|n| names.contains(n))
}

/// New `Outputs` state: existing entries minus those this run replaces,
/// followed by one fresh entry per plan.
pub fn merge_outputs(
    shadow: &Shadow,
    profile: &Profile,
    plans: &[OutputPlan],
    encoders: EncoderIds,
) -> Vec<Value> {
    let remembered: HashSet<EntryId> = profile
        .outputs
        .iter()
        .filter_map(|o| o.device_output_id)
        .collect();
    let names: HashSet<&str> = plans.iter().map(|p| p.entry_name.as_str()).collect();

    let mut state: Vec<Value> = shadow
        .entries
        .iter()
        .filter(|e| !is_replaced(e, &remembered, &names))
        .map(ShadowEntry::to_state)
        .collect();
    state.extend(plans.iter().map(|plan| output_entry(plan, encoders)));
    state
}

/// Ports held by entries the merge keeps; a planned port among them would
/// collide on the device.
pub fn retained_ports(shadow: &Shadow, profile: &Profile, plans: &[OutputPlan]) -> HashSet<u16> {
    let remembered: HashSet<EntryId> = profile
        .outputs
        .iter()
        .filter_map(|o| o.device_output_id)
        .collect();
    let names: HashSet<&str> = plans.iter().map(|p| p.entry_name.as_str()).collect();
    shadow
        .entries
        .iter()
        .filter(|e| !is_replaced(e, &remembered, &names))
        .filter_map(ShadowEntry::port)
        .collect()
}

/// A reported output entry matched to its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedOutput {
    pub id: EntryId,
    pub port: u16,
}

/// Match reported entries to plans: same name and port first, then port
/// alone, then name alone. Entries whose id was reported before the write
/// (`before`) are never matched. Unmatched plans are absent from the
/// result.
pub fn match_outputs(
    shadow: &Shadow,
    plans: &[OutputPlan],
    before: &HashSet<EntryId>,
) -> BTreeMap<String, MatchedOutput> {
    let fresh: Vec<&ShadowEntry> = shadow
        .entries
        .iter()
        .filter(|e| e.id().is_some_and(|id| !before.contains(&id)))
        .collect();

    plans
        .iter()
        .filter_map(|plan| {
            let on_port = |e: &ShadowEntry| e.port() == Some(plan.port);
            let named = |e: &ShadowEntry| e.name() == Some(plan.entry_name.as_str());
            let entry = fresh
                .iter()
                .copied()
                .find(|e| on_port(e) && named(e))
                .or_else(|| fresh.iter().copied().find(|e| on_port(e)))
                .or_else(|| fresh.iter().copied().find(|e| named(e)))?;
            Some((
                plan.intent_id.clone(),
                MatchedOutput {
                    id: entry.id()?,
                    port: entry.port().unwrap_or(plan.port),
                },
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
