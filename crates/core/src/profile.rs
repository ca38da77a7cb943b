//! Operator-owned configuration bundles.
//!
//! A [`Profile`] is applied to a device but not owned by it. It carries the
//! encoder settings, the ordered list of [`OutputIntent`]s and the per-platform
//! downstream configuration. After a successful deploy each intent remembers
//! the identifiers the device and the downstream platform assigned, so a
//! re-run can replace instead of duplicate.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EntryId;

/// Maximum length of a profile name.
const MAX_NAME_LEN: usize = 64;

/// Video bitrate bounds accepted by the encoder (kbps).
pub const VIDEO_BITRATE_RANGE_KBPS: std::ops::RangeInclusive<u32> = 100..=50_000;

/// Audio bitrate bounds accepted by the encoder (kbps).
pub const AUDIO_BITRATE_RANGE_KBPS: std::ops::RangeInclusive<u32> = 32..=512;

/// Upper bound on the keyframe interval count, whatever the unit.
const MAX_KEYFRAME_COUNT: u32 = 600;

// ---------------------------------------------------------------------------
// Encoder settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "2160p")]
    Uhd2160,
    #[serde(rename = "1080p")]
    Fhd1080,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "576p")]
    Sd576,
    #[serde(rename = "480p")]
    Sd480,
}

impl Resolution {
    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Uhd2160 => (3840, 2160),
            Self::Fhd1080 => (1920, 1080),
            Self::Hd720 => (1280, 720),
            Self::Sd576 => (720, 576),
            Self::Sd480 => (720, 480),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRate {
    #[serde(rename = "23.98")]
    Fps23_98,
    #[serde(rename = "24")]
    Fps24,
    #[serde(rename = "25")]
    Fps25,
    #[serde(rename = "29.97")]
    Fps29_97,
    #[serde(rename = "30")]
    Fps30,
    #[serde(rename = "50")]
    Fps50,
    #[serde(rename = "59.94")]
    Fps59_94,
    #[serde(rename = "60")]
    Fps60,
}

impl FrameRate {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Fps23_98 => 24_000.0 / 1001.0,
            Self::Fps24 => 24.0,
            Self::Fps25 => 25.0,
            Self::Fps29_97 => 30_000.0 / 1001.0,
            Self::Fps30 => 30.0,
            Self::Fps50 => 50.0,
            Self::Fps59_94 => 60_000.0 / 1001.0,
            Self::Fps60 => 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitrateMode {
    Cbr,
    Vbr,
    /// Constrained VBR.
    Cvbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyframeUnit {
    Frames,
    Seconds,
}

/// How often the encoder emits an IDR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframePolicy {
    pub unit: KeyframeUnit,
    pub count: u32,
}

/// Whether the encoder favours picture quality or end-to-end latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyBias {
    Quality,
    Balanced,
    Latency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Aac,
    Opus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    #[serde(rename = "44100")]
    Hz44100,
    #[serde(rename = "48000")]
    Hz48000,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz44100 => 44_100,
            Self::Hz48000 => 48_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
}

impl ChannelLayout {
    pub fn channel_count(self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround51 => 6,
        }
    }
}

/// Video and audio encoder parameters of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub video_codec: VideoCodec,
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    pub video_bitrate_kbps: u32,
    pub bitrate_mode: BitrateMode,
    pub keyframe: KeyframePolicy,
    pub bias: LatencyBias,
    pub audio_codec: AudioCodec,
    pub audio_bitrate_kbps: u32,
    pub sample_rate: SampleRate,
    pub channel_layout: ChannelLayout,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            resolution: Resolution::Fhd1080,
            frame_rate: FrameRate::Fps30,
            video_bitrate_kbps: 6_000,
            bitrate_mode: BitrateMode::Cbr,
            keyframe: KeyframePolicy {
                unit: KeyframeUnit::Seconds,
                count: 2,
            },
            bias: LatencyBias::Balanced,
            audio_codec: AudioCodec::Aac,
            audio_bitrate_kbps: 128,
            sample_rate: SampleRate::Hz48000,
            channel_layout: ChannelLayout::Stereo,
        }
    }
}

impl EncoderSettings {
    /// Validate numeric encoder parameters.
    ///
    /// Rules:
    /// - Video bitrate within [`VIDEO_BITRATE_RANGE_KBPS`].
    /// - Audio bitrate within [`AUDIO_BITRATE_RANGE_KBPS`].
    /// - Keyframe count between 1 and `MAX_KEYFRAME_COUNT`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !VIDEO_BITRATE_RANGE_KBPS.contains(&self.video_bitrate_kbps) {
            return Err(CoreError::Validation(format!(
                "Video bitrate {} kbps is outside {}..={} kbps",
                self.video_bitrate_kbps,
                VIDEO_BITRATE_RANGE_KBPS.start(),
                VIDEO_BITRATE_RANGE_KBPS.end(),
            )));
        }
        if !AUDIO_BITRATE_RANGE_KBPS.contains(&self.audio_bitrate_kbps) {
            return Err(CoreError::Validation(format!(
                "Audio bitrate {} kbps is outside {}..={} kbps",
                self.audio_bitrate_kbps,
                AUDIO_BITRATE_RANGE_KBPS.start(),
                AUDIO_BITRATE_RANGE_KBPS.end(),
            )));
        }
        if self.keyframe.count == 0 || self.keyframe.count > MAX_KEYFRAME_COUNT {
            return Err(CoreError::Validation(format!(
                "Keyframe count must be between 1 and {MAX_KEYFRAME_COUNT}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output intents
// ---------------------------------------------------------------------------

/// Where an output intent delivers its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Platform A: the channel registry.
    Channel,
    /// Platform B: the ingest registry.
    Ingest,
    /// Operator-supplied SRT destination; no downstream registry involved.
    Manual,
}

impl TargetKind {
    /// Whether this target is registered on a downstream platform.
    pub fn is_platform(self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Ingest => "ingest",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One egress target inside a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputIntent {
    pub id: String,
    pub target: TargetKind,
    pub name: String,
    /// Output entry id the device assigned on the last successful deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_output_id: Option<EntryId>,
    /// Channel or ingest id returned by the downstream platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Stream URL last sent to the downstream platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

impl OutputIntent {
    pub fn new(target: TargetKind, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            name: name.into(),
            device_output_id: None,
            remote_id: None,
            stream_url: None,
        }
    }

    /// Forget everything learned from the downstream platform.
    pub fn clear_downstream(&mut self) {
        self.remote_id = None;
        self.stream_url = None;
    }
}

// ---------------------------------------------------------------------------
// Downstream configuration
// ---------------------------------------------------------------------------

/// Platform A (channel registry) settings carried by a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Overrides the label derived from the profile name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u32,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub record: bool,
}

/// Platform B (ingest registry) settings carried by a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u32,
    #[serde(default)]
    pub passphrase: Option<String>,
    /// SRT `streamid` the platform should present when pulling.
    #[serde(default)]
    pub stream_id: Option<String>,
}

fn default_latency_ms() -> u32 {
    200
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            label: None,
            description: None,
            region: None,
            latency_ms: default_latency_ms(),
            passphrase: None,
            record: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            label: None,
            latency_ms: default_latency_ms(),
            passphrase: None,
            stream_id: None,
        }
    }
}

/// Where manual (caller-mode) outputs push to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDestination {
    pub ip: String,
    pub port: u16,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A named configuration bundle owned by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub encoder: EncoderSettings,
    #[serde(default)]
    pub outputs: Vec<OutputIntent>,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub manual: Option<ManualDestination>,
}

impl Profile {
    /// Create an empty profile with default encoder settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            encoder: EncoderSettings::default(),
            outputs: Vec::new(),
            channel: ChannelConfig::default(),
            ingest: IngestConfig::default(),
            manual: None,
        }
    }

    /// Append an output intent and return its id.
    pub fn add_output(&mut self, target: TargetKind, name: impl Into<String>) -> String {
        let intent = OutputIntent::new(target, name);
        let id = intent.id.clone();
        self.outputs.push(intent);
        id
    }

    pub fn intent(&self, intent_id: &str) -> Option<&OutputIntent> {
        self.outputs.iter().find(|o| o.id == intent_id)
    }

    pub fn intent_mut(&mut self, intent_id: &str) -> Option<&mut OutputIntent> {
        self.outputs.iter_mut().find(|o| o.id == intent_id)
    }

    /// Deterministic name of the video encoder entry on the device.
    pub fn video_encoder_name(&self) -> String {
        format!("{}_video", self.name)
    }

    /// Deterministic name of the audio encoder entry on the device.
    pub fn audio_encoder_name(&self) -> String {
        format!("{}_audio", self.name)
    }

    /// Deterministic name of the device output entry for an intent.
    pub fn output_entry_name(&self, intent: &OutputIntent) -> String {
        format!("{}_{}", self.name, intent.name)
    }

    /// Validate the profile before it is applied to a device.
    ///
    /// Rules:
    /// - Name must be non-empty, at most `MAX_NAME_LEN` characters, and
    ///   contain no `/` (it becomes part of device entry names).
    /// - Encoder settings must pass [`EncoderSettings::validate`].
    /// - Intent names must be non-empty and unique.
    /// - A manual destination is required when any intent targets
    ///   [`TargetKind::Manual`].
    pub fn validate(&self) -> Result<(), CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "Profile name must not be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Profile name must not exceed {MAX_NAME_LEN} characters"
            )));
        }
        if name.contains('/') {
            return Err(CoreError::Validation(
                "Profile name must not contain '/'".to_string(),
            ));
        }

        self.encoder.validate()?;

        let mut seen = std::collections::HashSet::with_capacity(self.outputs.len());
        for (i, intent) in self.outputs.iter().enumerate() {
            if intent.name.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Output at index {i} must have a name"
                )));
            }
            if !seen.insert(intent.name.to_lowercase()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate output name: \"{}\"",
                    intent.name
                )));
            }
        }

        let has_manual = self.outputs.iter().any(|o| o.target == TargetKind::Manual);
        if has_manual && self.manual.is_none() {
            return Err(CoreError::Validation(
                "A manual output requires a destination IP and port".to_string(),
            ));
        }

        Ok(())
    }
}

/// Lowercase, hyphen-separated form of a name, used as downstream label.
///
/// Runs of non-alphanumeric characters collapse into a single `-`, and
/// leading/trailing separators are dropped: `"Studio-A"` -> `"studio-a"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn slugify_lowercases_and_joins() {
        assert_eq!(slugify("Studio-A"), "studio-a");
        assert_eq!(slugify("  Main  Hall #2 "), "main-hall-2");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn entry_names_are_deterministic() {
        let mut profile = Profile::new("Studio-A");
        let id = profile.add_output(TargetKind::Channel, "primary");
        let intent = profile.intent(&id).unwrap().clone();

        assert_eq!(profile.video_encoder_name(), "Studio-A_video");
        assert_eq!(profile.audio_encoder_name(), "Studio-A_audio");
        assert_eq!(profile.output_entry_name(&intent), "Studio-A_primary");
    }

    #[test]
    fn valid_profile_passes() {
        let mut profile = Profile::new("Studio-A");
        profile.add_output(TargetKind::Channel, "a");
        profile.add_output(TargetKind::Ingest, "b");
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let profile = Profile::new("   ");
        assert_matches!(profile.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn duplicate_intent_names_rejected() {
        let mut profile = Profile::new("Studio-A");
        profile.add_output(TargetKind::Channel, "Main");
        profile.add_output(TargetKind::Ingest, "main");
        assert_matches!(profile.validate(), Err(CoreError::Validation(msg)) if msg.contains("Duplicate"));
    }

    #[test]
    fn manual_intent_requires_destination() {
        let mut profile = Profile::new("Studio-A");
        profile.add_output(TargetKind::Manual, "backup");
        assert!(profile.validate().is_err());

        profile.manual = Some(ManualDestination {
            ip: "203.0.113.5".into(),
            port: 9000,
        });
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn bitrate_out_of_range_rejected() {
        let mut profile = Profile::new("Studio-A");
        profile.encoder.video_bitrate_kbps = 10;
        assert!(profile.validate().is_err());

        profile.encoder.video_bitrate_kbps = 6_000;
        profile.encoder.audio_bitrate_kbps = 1_000;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn zero_keyframe_count_rejected() {
        let mut profile = Profile::new("Studio-A");
        profile.encoder.keyframe.count = 0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": "p1",
            "name": "Studio-A",
            "outputs": [{ "id": "o1", "target": "channel", "name": "main" }]
        });
        let profile: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.encoder, EncoderSettings::default());
        assert_eq!(profile.outputs[0].target, TargetKind::Channel);
        assert!(profile.outputs[0].remote_id.is_none());
    }

    #[test]
    fn clear_downstream_keeps_device_id() {
        let mut intent = OutputIntent::new(TargetKind::Ingest, "b");
        intent.device_output_id = Some(20);
        intent.remote_id = Some("77".into());
        intent.stream_url = Some("srt://10.0.0.2:10001".into());

        intent.clear_downstream();
        assert_eq!(intent.device_output_id, Some(20));
        assert!(intent.remote_id.is_none());
        assert!(intent.stream_url.is_none());
    }
}
