//! Channel registry client (platform A).
//!
//! | Operation | `v1` (legacy)                      | `v2` (current)                                |
//! |-----------|------------------------------------|-----------------------------------------------|
//! | find      | `POST channel/get`                 | `GET v2/organizations/{org}/channels?label=`  |
//! | create    | `POST channel/add`                 | `POST v2/organizations/{org}/channels`        |
//! | update    | `POST channel/edit`                | `PUT v2/organizations/{org}/channels/{id}`    |
//! | delete    | `POST channel/delete`              | `DELETE v2/organizations/{org}/channels/{id}` |
//!
//! Legacy calls carry `organization_id` in the body. When the current
//! dialect's listing answers "not supported", the client stays on the
//! legacy verbs from then on. An organization name that cannot be
//! resolved has no v2 path, so every call made with it uses the legacy
//! verbs as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use edgecast_core::settings::{Dialect, RegistrySettings};
use reqwest::Method;
use serde_json::{json, Value};

use crate::entity::{pick_by_label, RemoteEntity, StreamPayload};
use crate::error::RegistryError;
use crate::org::{Scope, ScopeResolver, ORGANIZATIONS};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::{updated_entity, Registry};

const NAME: &str = "channel";

pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
    dialect: Dialect,
    organization: String,
    resolver: ScopeResolver,
    /// Set once the current dialect reported itself unsupported.
    downgraded: AtomicBool,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Build a client. The organization (id or name) and a token are
    /// required.
    pub fn new(settings: &RegistrySettings, transport: Arc<dyn Transport>) -> Result<Self, RegistryError> {
        if settings.token.trim().is_empty() {
            return Err(RegistryError::Validation(
                "channel registry token must be set".into(),
            ));
        }
        let organization = settings
            .scope
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                RegistryError::Validation("channel registry organization must be set".into())
            })?;

        Ok(Self {
            transport,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            dialect: settings.dialect,
            organization,
            resolver: ScopeResolver::new(),
            downgraded: AtomicBool::new(false),
        })
    }

    /// Dialect in effect, after any downgrade.
    pub fn dialect(&self) -> Dialect {
        if self.downgraded.load(Ordering::Relaxed) {
            Dialect::Legacy
        } else {
            self.dialect
        }
    }

    /// Dialect for a call scoped to `org`.
    fn dialect_for(&self, org: &Scope) -> Dialect {
        if org.is_resolved() {
            self.dialect()
        } else {
            Dialect::Legacy
        }
    }

    async fn organization(&self) -> Scope {
        self.resolver
            .resolve(
                self.transport.as_ref(),
                &self.base_url,
                &self.token,
                ORGANIZATIONS,
                &self.organization,
            )
            .await
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RegistryError> {
        Ok(self.transport.send(request.bearer(&self.token)).await?)
    }

    fn channels_url(&self, org: &Scope) -> String {
        format!(
            "{}/v2/organizations/{}/channels",
            self.base_url,
            org.as_path_segment()
        )
    }

    // ---- legacy dialect ----

    async fn legacy_raw(&self, verb: &str, org: &Scope, mut body: Value) -> Result<HttpResponse, RegistryError> {
        body["organization_id"] = org.as_json();
        let request = HttpRequest::new(Method::POST, format!("{}/channel/{verb}", self.base_url)).json(body);
        self.send(request).await
    }

    async fn legacy(&self, verb: &str, org: &Scope, body: Value) -> Result<HttpResponse, RegistryError> {
        self.legacy_raw(verb, org, body).await?.error_for_status(NAME)
    }

    async fn legacy_find(&self, label: &str, org: &Scope) -> Result<Option<RemoteEntity>, RegistryError> {
        let response = self.legacy_raw("get", org, json!({ "label": label })).await?;
        // `channel/get` answers an unknown label with 404.
        if response.status == 404 {
            return Ok(None);
        }
        let response = response.error_for_status(NAME)?;
        Ok(pick_by_label(
            RemoteEntity::list_from_response(&response.body),
            label,
            true,
        ))
    }
}

fn channel_body(payload: &StreamPayload) -> Value {
    json!({
        "label": payload.label,
        "description": payload.description,
        "region": payload.region,
        "record": payload.record,
        "source": {
            "protocol": "srt",
            "mode": "caller",
            "url": payload.stream_url,
            "latency": payload.latency_ms,
            "passphrase": payload.passphrase,
        },
        "video": payload.video,
        "audio": payload.audio,
    })
}

#[async_trait]
impl Registry for ChannelRegistry {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteEntity>, RegistryError> {
        let org = self.organization().await;
        if !org.is_resolved() && self.dialect() == Dialect::Current {
            tracing::warn!(organization = %self.organization, "Organization unresolved, using legacy verbs");
        }
        if self.dialect_for(&org) == Dialect::Legacy {
            return self.legacy_find(label, &org).await;
        }

        let url = reqwest::Url::parse_with_params(&self.channels_url(&org), &[("label", label)])
            .map_err(|e| RegistryError::Validation(format!("invalid channel registry URL: {e}")))?;
        let response = self.send(HttpRequest::new(Method::GET, url.as_str())).await?;

        if response.is_not_supported() {
            tracing::warn!(status = response.status, "Channel listing not supported, falling back to v1");
            self.downgraded.store(true, Ordering::Relaxed);
            return self.legacy_find(label, &org).await;
        }

        let response = response.error_for_status(NAME)?;
        Ok(pick_by_label(
            RemoteEntity::list_from_response(&response.body),
            label,
            true,
        ))
    }

    async fn create(&self, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        let org = self.organization().await;
        let body = channel_body(payload);
        let response = match self.dialect_for(&org) {
            Dialect::Legacy => self.legacy("add", &org, body).await?,
            Dialect::Current => self
                .send(HttpRequest::new(Method::POST, self.channels_url(&org)).json(body))
                .await?
                .error_for_status(NAME)?,
        };

        RemoteEntity::from_response(&response.body).ok_or_else(|| RegistryError::Decode {
            registry: NAME,
            detail: format!("create returned no channel id: {}", response.text),
        })
    }

    async fn update(&self, id: &str, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        let org = self.organization().await;
        let mut body = channel_body(payload);
        let response = match self.dialect_for(&org) {
            Dialect::Legacy => {
                body["channel_id"] = Value::from(id);
                self.legacy("edit", &org, body).await?
            }
            Dialect::Current => {
                let url = format!("{}/{id}", self.channels_url(&org));
                self.send(HttpRequest::new(Method::PUT, url).json(body))
                    .await?
                    .error_for_status(NAME)?
            }
        };
        Ok(updated_entity(&response.body, id, payload))
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let org = self.organization().await;
        match self.dialect_for(&org) {
            Dialect::Legacy => {
                self.legacy("delete", &org, json!({ "channel_id": id })).await?;
            }
            Dialect::Current => {
                let url = format!("{}/{id}", self.channels_url(&org));
                self.send(HttpRequest::new(Method::DELETE, url))
                    .await?
                    .error_for_status(NAME)?;
            }
        }
        tracing::info!(channel_id = %id, "Deleted channel");
        Ok(())
    }
}
