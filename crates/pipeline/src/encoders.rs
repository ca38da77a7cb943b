//! Encoder entries: building, merging into the `Encoders` shadow, and
//! resolving the ids the device assigned.

use std::collections::HashSet;

use edgecast_core::encoding::{audio_encoder_entry, video_encoder_entry};
use edgecast_core::profile::Profile;
use edgecast_core::types::EntryId;
use edgecast_device::shadow::{Shadow, ShadowEntry};
use serde_json::Value;

/// Device ids of the profile's two encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderIds {
    pub video: EntryId,
    pub audio: EntryId,
}

/// First input reported by the device; encoders read from it.
pub fn first_input_id(inputs: &Shadow) -> Option<EntryId> {
    inputs.entries.iter().find_map(ShadowEntry::id)
}

/// New `Encoders` state: every existing entry except the profile's own
/// (matched by name), followed by freshly built video and audio entries.
pub fn merge_encoders(shadow: &Shadow, profile: &Profile, input_id: EntryId) -> Vec<Value> {
    let video_name = profile.video_encoder_name();
    let audio_name = profile.audio_encoder_name();

    let mut state: Vec<Value> = shadow
        .entries
        .iter()
        .filter(|e| !matches!(e.name(), Some(n) if n == video_name || n == audio_name))
        .map(ShadowEntry::to_state)
        .collect();

    state.push(video_encoder_entry(&video_name, input_id, &profile.encoder));
    state.push(audio_encoder_entry(&audio_name, input_id, &profile.encoder));
    state
}

/// Find the profile's encoders in a re-read shadow.
///
/// Only ids that were not present before the write count; the write
/// replaces the profile's entries, so an old id under the right name is a
/// report the device has not caught up on. Entries are matched by name
/// first. When the device dropped or rewrote the names, the new ids are
/// taken instead: their `kind` decides which is which, otherwise the
/// first new id is the video encoder and the second the audio encoder.
pub fn resolve_encoders(
    shadow: &Shadow,
    profile: &Profile,
    before: &HashSet<EntryId>,
) -> Option<EncoderIds> {
    let by_name = |name: &str| {
        shadow
            .find_by_name(name)
            .and_then(ShadowEntry::id)
            .filter(|id| !before.contains(id))
    };
    if let (Some(video), Some(audio)) = (
        by_name(&profile.video_encoder_name()),
        by_name(&profile.audio_encoder_name()),
    ) {
        return Some(EncoderIds { video, audio });
    }

    let fresh: Vec<&ShadowEntry> = shadow
        .entries
        .iter()
        .filter(|e| e.id().is_some_and(|id| !before.contains(&id)))
        .collect();

    let of_kind = |kind: &str| {
        fresh
            .iter()
            .find(|e| e.kind().as_deref() == Some(kind))
            .and_then(|e| e.id())
    };
    if let (Some(video), Some(audio)) = (of_kind("video"), of_kind("audio")) {
        return Some(EncoderIds { video, audio });
    }

    match fresh.as_slice() {
        [video, audio, ..] => Some(EncoderIds {
            video: video.id()?,
            audio: audio.id()?,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
