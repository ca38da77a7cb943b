//! Downstream entities and the payload used to create or update them.

use edgecast_core::encoding::{AudioTrack, VideoTrack};
use edgecast_core::shape;
use serde::Serialize;
use serde_json::Value;

/// Wrapper keys a registry may nest its lists under.
pub const LIST_KEYS: &[&str] = &["channels", "ingests", "data", "items", "results"];

/// A channel or ingest as the registry reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteEntity {
    pub id: String,
    pub label: String,
    pub stream_url: Option<String>,
}

impl RemoteEntity {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: shape::first_string(value, &["id", "_id", "channel_id", "ingest_id", "uuid"])?,
            label: shape::first_string(value, &["label", "name", "title"]).unwrap_or_default(),
            stream_url: shape::first_string(
                value,
                &["stream_url", "source.url", "source_url", "url", "ingest_url"],
            ),
        })
    }

    /// Parse a listing in any of the accepted shapes, skipping rows
    /// without an id.
    pub fn list_from_response(body: &Value) -> Vec<Self> {
        shape::extract_list(body, LIST_KEYS)
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }

    /// Parse a create/update response, which may wrap the entity once.
    pub fn from_response(body: &Value) -> Option<Self> {
        Self::from_value(body).or_else(|| {
            ["channel", "ingest", "data", "result"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Self::from_value))
        })
    }
}

/// Choose the entity for `label` from a listing.
///
/// A case-insensitive exact match wins. When the listing was already
/// filtered by label server-side, its first row is accepted as a match.
pub fn pick_by_label(items: Vec<RemoteEntity>, label: &str, filtered: bool) -> Option<RemoteEntity> {
    if let Some(exact) = items.iter().find(|e| e.label.eq_ignore_ascii_case(label)) {
        return Some(exact.clone());
    }
    if filtered {
        items.into_iter().next()
    } else {
        None
    }
}

/// Everything a registry needs to pull the device's SRT listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamPayload {
    pub label: String,
    pub description: Option<String>,
    /// `srt://<device-ip>:<port>`.
    pub stream_url: String,
    pub latency_ms: u32,
    pub passphrase: Option<String>,
    pub region: Option<String>,
    pub record: bool,
    pub stream_id: Option<String>,
    pub video: VideoTrack,
    pub audio: AudioTrack,
}

/// Result of [`Registry::upsert`](crate::Registry::upsert).
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub entity: RemoteEntity,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: &str, label: &str) -> RemoteEntity {
        RemoteEntity {
            id: id.into(),
            label: label.into(),
            stream_url: None,
        }
    }

    #[test]
    fn exact_match_preferred() {
        let items = vec![entity("1", "studio-a-backup"), entity("2", "Studio-A")];
        assert_eq!(pick_by_label(items, "studio-a", true).unwrap().id, "2");
    }

    #[test]
    fn first_result_only_for_filtered_listings() {
        let items = vec![entity("1", "studio-a (old)")];
        assert_eq!(pick_by_label(items.clone(), "studio-a", true).unwrap().id, "1");
        assert!(pick_by_label(items, "studio-a", false).is_none());
    }

    #[test]
    fn wrapped_listings() {
        for body in [
            json!([{ "id": 1, "label": "a" }]),
            json!({ "ingests": [{ "id": 1, "name": "a" }] }),
            json!({ "data": { "items": [{ "_id": "1", "label": "a" }] } }),
            json!({ "results": [{ "id": "1", "label": "a" }] }),
        ] {
            let items = RemoteEntity::list_from_response(&body);
            assert_eq!(items, vec![entity("1", "a")]);
        }
    }

    #[test]
    fn wrapped_create_response() {
        let body = json!({ "channel": { "id": 77, "label": "studio-a", "source": { "url": "srt://x:1" } } });
        let entity = RemoteEntity::from_response(&body).unwrap();
        assert_eq!(entity.id, "77");
        assert_eq!(entity.stream_url.as_deref(), Some("srt://x:1"));
    }
}
