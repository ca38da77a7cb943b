//! Downstream payloads: labels and connection parameters for the channel
//! and ingest registries.

use std::sync::Arc;

use edgecast_core::encoding::{audio_track, video_track};
use edgecast_core::profile::{slugify, OutputIntent, Profile, TargetKind};
use edgecast_registry::entity::StreamPayload;
use edgecast_registry::Registry;

/// Registry clients available to a deployment. A platform left `None` is
/// not configured; intents targeting it fail validation.
#[derive(Clone, Default)]
pub struct Registries {
    pub channel: Option<Arc<dyn Registry>>,
    pub ingest: Option<Arc<dyn Registry>>,
}

impl Registries {
    pub fn for_target(&self, target: TargetKind) -> Option<&Arc<dyn Registry>> {
        match target {
            TargetKind::Channel => self.channel.as_ref(),
            TargetKind::Ingest => self.ingest.as_ref(),
            TargetKind::Manual => None,
        }
    }
}

pub fn stream_url(device_ip: &str, port: u16) -> String {
    format!("srt://{device_ip}:{port}")
}

/// Label of the downstream entity for `intent`.
///
/// The platform's configured label, or the slug of the profile name, with
/// the intent's slug appended when more than one intent targets the same
/// platform.
pub fn label_for(profile: &Profile, intent: &OutputIntent) -> String {
    let configured = match intent.target {
        TargetKind::Channel => profile.channel.label.as_deref(),
        TargetKind::Ingest => profile.ingest.label.as_deref(),
        TargetKind::Manual => None,
    };
    let base = configured
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(&profile.name));

    let sharing = profile
        .outputs
        .iter()
        .filter(|o| o.target == intent.target)
        .count();
    if sharing > 1 {
        format!("{base}-{}", slugify(&intent.name))
    } else {
        base
    }
}

pub fn build_payload(
    profile: &Profile,
    intent: &OutputIntent,
    device_ip: &str,
    port: u16,
) -> StreamPayload {
    let (latency_ms, passphrase) = match intent.target {
        TargetKind::Ingest => (profile.ingest.latency_ms, profile.ingest.passphrase.clone()),
        _ => (profile.channel.latency_ms, profile.channel.passphrase.clone()),
    };
    let is_channel = intent.target == TargetKind::Channel;

    StreamPayload {
        label: label_for(profile, intent),
        description: profile.channel.description.clone().filter(|_| is_channel),
        stream_url: stream_url(device_ip, port),
        latency_ms,
        passphrase,
        region: profile.channel.region.clone().filter(|_| is_channel),
        record: is_channel && profile.channel.record,
        stream_id: profile
            .ingest
            .stream_id
            .clone()
            .filter(|_| intent.target == TargetKind::Ingest),
        video: video_track(&profile.encoder),
        audio: audio_track(&profile.encoder),
    }
}
