//! Downstream registry clients.
//!
//! Two delivery platforms accept the device's SRT stream: a channel
//! registry and an ingest registry. Each speaks a legacy (`v1`) and a
//! current (`v2`) dialect and both are driven through the [`Registry`]
//! trait, whose provided [`Registry::upsert`] keeps repeated deployments
//! idempotent by finding an entity by label before creating one.

pub mod channel;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod org;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use edgecast_core::settings::ConnectionSettings;

use crate::entity::{RemoteEntity, StreamPayload, UpsertOutcome};
use crate::error::{RegistryError, TransportError};
use crate::transport::{DirectTransport, RelayTransport, Transport};

pub use channel::ChannelRegistry;
pub use ingest::IngestRegistry;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// The entity whose label matches `label`, if any.
    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteEntity>, RegistryError>;

    async fn create(&self, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError>;

    async fn update(&self, id: &str, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError>;

    async fn delete(&self, id: &str) -> Result<(), RegistryError>;

    /// Update the entity labelled `payload.label`, or create it.
    async fn upsert(&self, payload: &StreamPayload) -> Result<UpsertOutcome, RegistryError> {
        match self.find_by_label(&payload.label).await? {
            Some(existing) => {
                tracing::info!(registry = self.name(), label = %payload.label, id = %existing.id, "Updating downstream entity");
                let entity = self.update(&existing.id, payload).await?;
                Ok(UpsertOutcome {
                    entity,
                    created: false,
                })
            }
            None => {
                tracing::info!(registry = self.name(), label = %payload.label, "Creating downstream entity");
                let entity = self.create(payload).await?;
                Ok(UpsertOutcome {
                    entity,
                    created: true,
                })
            }
        }
    }
}

/// The transport selected by the settings: the relay when one is
/// configured, otherwise direct.
pub fn transport_for(settings: &ConnectionSettings) -> Result<Arc<dyn Transport>, TransportError> {
    Ok(match &settings.relay_url {
        Some(relay) => Arc::new(RelayTransport::new(relay.clone(), settings.request_timeout)?),
        None => Arc::new(DirectTransport::new(settings.request_timeout)?),
    })
}

/// Entity returned by an update. Registries that answer an update with an
/// empty body get the entity rebuilt from what was sent.
pub(crate) fn updated_entity(
    body: &serde_json::Value,
    id: &str,
    payload: &StreamPayload,
) -> RemoteEntity {
    RemoteEntity::from_response(body).unwrap_or_else(|| RemoteEntity {
        id: id.to_string(),
        label: payload.label.clone(),
        stream_url: Some(payload.stream_url.clone()),
    })
}
