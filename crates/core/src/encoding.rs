//! Pure mapping from profile encoder settings to device encoder entries and
//! to the track metadata downstream platforms expect.
//!
//! Nothing in here touches the network; every function is deterministic in
//! its inputs so the orchestrator can rebuild identical entries on re-runs.

use serde::Serialize;
use serde_json::{json, Value};

use crate::profile::{
    AudioCodec, BitrateMode, ChannelLayout, EncoderSettings, FrameRate, KeyframeUnit,
    LatencyBias, Resolution, SampleRate, VideoCodec,
};
use crate::types::EntryId;

// ---------------------------------------------------------------------------
// Device tags
// ---------------------------------------------------------------------------

pub fn video_codec_tag(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "VIDEO_CODEC_H264",
        VideoCodec::Hevc => "VIDEO_CODEC_H265",
    }
}

pub fn audio_codec_tag(codec: AudioCodec) -> &'static str {
    match codec {
        AudioCodec::Aac => "AUDIO_CODEC_AAC",
        AudioCodec::Opus => "AUDIO_CODEC_OPUS",
    }
}

pub fn bitrate_mode_tag(mode: BitrateMode) -> &'static str {
    match mode {
        BitrateMode::Cbr => "BITRATE_MODE_CBR",
        BitrateMode::Vbr => "BITRATE_MODE_VBR",
        BitrateMode::Cvbr => "BITRATE_MODE_CVBR",
    }
}

pub fn resolution_tag(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Uhd2160 => "RESOLUTION_3840x2160",
        Resolution::Fhd1080 => "RESOLUTION_1920x1080",
        Resolution::Hd720 => "RESOLUTION_1280x720",
        Resolution::Sd576 => "RESOLUTION_720x576",
        Resolution::Sd480 => "RESOLUTION_720x480",
    }
}

pub fn frame_rate_tag(rate: FrameRate) -> &'static str {
    match rate {
        FrameRate::Fps23_98 => "FRAME_RATE_23_98",
        FrameRate::Fps24 => "FRAME_RATE_24",
        FrameRate::Fps25 => "FRAME_RATE_25",
        FrameRate::Fps29_97 => "FRAME_RATE_29_97",
        FrameRate::Fps30 => "FRAME_RATE_30",
        FrameRate::Fps50 => "FRAME_RATE_50",
        FrameRate::Fps59_94 => "FRAME_RATE_59_94",
        FrameRate::Fps60 => "FRAME_RATE_60",
    }
}

pub fn keyframe_unit_tag(unit: KeyframeUnit) -> &'static str {
    match unit {
        KeyframeUnit::Frames => "KEYFRAME_UNIT_FRAMES",
        KeyframeUnit::Seconds => "KEYFRAME_UNIT_SECONDS",
    }
}

pub fn latency_mode_tag(bias: LatencyBias) -> &'static str {
    match bias {
        LatencyBias::Quality => "LATENCY_MODE_QUALITY",
        LatencyBias::Balanced => "LATENCY_MODE_NORMAL",
        LatencyBias::Latency => "LATENCY_MODE_LOW",
    }
}

pub fn sample_rate_tag(rate: SampleRate) -> &'static str {
    match rate {
        SampleRate::Hz44100 => "SAMPLE_RATE_44100",
        SampleRate::Hz48000 => "SAMPLE_RATE_48000",
    }
}

pub fn channel_count_tag(layout: ChannelLayout) -> &'static str {
    match layout {
        ChannelLayout::Mono => "CHANNELS_1",
        ChannelLayout::Stereo => "CHANNELS_2",
        ChannelLayout::Surround51 => "CHANNELS_6",
    }
}

/// Keyframe interval expressed in frames, whatever unit the profile uses.
///
/// Seconds are multiplied by the nominal frame rate and rounded to the
/// nearest frame, never below one.
pub fn keyframe_interval_frames(settings: &EncoderSettings) -> u32 {
    match settings.keyframe.unit {
        KeyframeUnit::Frames => settings.keyframe.count.max(1),
        KeyframeUnit::Seconds => {
            let frames = (settings.keyframe.count as f64 * settings.frame_rate.as_f64()).round();
            (frames as u32).max(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Device encoder entries
// ---------------------------------------------------------------------------

/// Body of a new video encoder entry for the `Encoders` shadow.
///
/// The entry carries no `id`: the device assigns one when it processes the
/// write.
pub fn video_encoder_entry(name: &str, input_id: EntryId, settings: &EncoderSettings) -> Value {
    json!({
        "name": name,
        "kind": "video",
        "in_channel_id": input_id,
        "codec": video_codec_tag(settings.video_codec),
        "bitrate_mode": bitrate_mode_tag(settings.bitrate_mode),
        "bitrate": settings.video_bitrate_kbps,
        "scaling_resolution": resolution_tag(settings.resolution),
        "frame_rate": frame_rate_tag(settings.frame_rate),
        "keyframe_interval": settings.keyframe.count,
        "keyframe_unit": keyframe_unit_tag(settings.keyframe.unit),
        "latency_mode": latency_mode_tag(settings.bias),
    })
}

/// Body of a new audio encoder entry for the `Encoders` shadow.
pub fn audio_encoder_entry(name: &str, input_id: EntryId, settings: &EncoderSettings) -> Value {
    json!({
        "name": name,
        "kind": "audio",
        "in_channel_id": input_id,
        "codec": audio_codec_tag(settings.audio_codec),
        "bitrate": settings.audio_bitrate_kbps,
        "sample_rate": sample_rate_tag(settings.sample_rate),
        "channel_count": channel_count_tag(settings.channel_layout),
    })
}

// ---------------------------------------------------------------------------
// Downstream track metadata
// ---------------------------------------------------------------------------

/// Video track description sent to downstream platforms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTrack {
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bitrate_kbps: u32,
    pub keyframe_interval_frames: u32,
}

/// Audio track description sent to downstream platforms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrack {
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate_kbps: u32,
}

pub fn video_track(settings: &EncoderSettings) -> VideoTrack {
    let (width, height) = settings.resolution.dimensions();
    VideoTrack {
        codec: match settings.video_codec {
            VideoCodec::H264 => "H264",
            VideoCodec::Hevc => "HEVC",
        },
        width,
        height,
        frame_rate: (settings.frame_rate.as_f64() * 100.0).round() / 100.0,
        bitrate_kbps: settings.video_bitrate_kbps,
        keyframe_interval_frames: keyframe_interval_frames(settings),
    }
}

pub fn audio_track(settings: &EncoderSettings) -> AudioTrack {
    AudioTrack {
        codec: match settings.audio_codec {
            AudioCodec::Aac => "AAC",
            AudioCodec::Opus => "OPUS",
        },
        sample_rate: settings.sample_rate.hz(),
        channels: settings.channel_layout.channel_count(),
        bitrate_kbps: settings.audio_bitrate_kbps,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::KeyframePolicy;

    #[test]
    fn keyframe_seconds_converted_to_frames() {
        let settings = EncoderSettings {
            frame_rate: FrameRate::Fps30,
            keyframe: KeyframePolicy {
                unit: KeyframeUnit::Seconds,
                count: 2,
            },
            ..Default::default()
        };
        assert_eq!(keyframe_interval_frames(&settings), 60);
    }

    #[test]
    fn keyframe_seconds_rounded_for_fractional_rates() {
        let settings = EncoderSettings {
            frame_rate: FrameRate::Fps29_97,
            keyframe: KeyframePolicy {
                unit: KeyframeUnit::Seconds,
                count: 1,
            },
            ..Default::default()
        };
        assert_eq!(keyframe_interval_frames(&settings), 30);
    }

    #[test]
    fn keyframe_frames_passed_through() {
        let settings = EncoderSettings {
            keyframe: KeyframePolicy {
                unit: KeyframeUnit::Frames,
                count: 48,
            },
            ..Default::default()
        };
        assert_eq!(keyframe_interval_frames(&settings), 48);
    }

    #[test]
    fn video_entry_carries_tags_and_no_id() {
        let settings = EncoderSettings {
            video_codec: VideoCodec::Hevc,
            bitrate_mode: BitrateMode::Vbr,
            bias: LatencyBias::Latency,
            ..Default::default()
        };
        let entry = video_encoder_entry("Studio-A_video", 1, &settings);

        assert_eq!(entry["name"], "Studio-A_video");
        assert_eq!(entry["kind"], "video");
        assert_eq!(entry["in_channel_id"], 1);
        assert_eq!(entry["codec"], "VIDEO_CODEC_H265");
        assert_eq!(entry["bitrate_mode"], "BITRATE_MODE_VBR");
        assert_eq!(entry["bitrate"], 6_000);
        assert_eq!(entry["scaling_resolution"], "RESOLUTION_1920x1080");
        assert_eq!(entry["latency_mode"], "LATENCY_MODE_LOW");
        assert!(entry.get("id").is_none());
    }

    #[test]
    fn audio_entry_maps_layout_and_rate() {
        let settings = EncoderSettings {
            sample_rate: SampleRate::Hz44100,
            channel_layout: ChannelLayout::Surround51,
            ..Default::default()
        };
        let entry = audio_encoder_entry("Studio-A_audio", 3, &settings);

        assert_eq!(entry["kind"], "audio");
        assert_eq!(entry["sample_rate"], "SAMPLE_RATE_44100");
        assert_eq!(entry["channel_count"], "CHANNELS_6");
        assert_eq!(entry["codec"], "AUDIO_CODEC_AAC");
    }

    #[test]
    fn tracks_describe_profile() {
        let settings = EncoderSettings {
            resolution: Resolution::Hd720,
            frame_rate: FrameRate::Fps59_94,
            ..Default::default()
        };
        let video = video_track(&settings);
        assert_eq!((video.width, video.height), (1280, 720));
        assert_eq!(video.frame_rate, 59.94);
        assert_eq!(video.codec, "H264");

        let audio = audio_track(&settings);
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.channels, 2);
    }
}
