//! Ingest registry client (platform B).
//!
//! Both dialects are REST; they differ only in the collection path:
//! `v1/ingests` (legacy, account passed in the body when known) and
//! `v2/accounts/{account}/ingests` (current). Listings may be a bare array
//! or wrapped under `ingests`, `data`, `items` or `results`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use edgecast_core::settings::{Dialect, RegistrySettings};
use reqwest::Method;
use serde_json::{json, Value};

use crate::entity::{pick_by_label, RemoteEntity, StreamPayload};
use crate::error::RegistryError;
use crate::org::{Scope, ScopeResolver, ACCOUNTS};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::{updated_entity, Registry};

const NAME: &str = "ingest";

pub struct IngestRegistry {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
    dialect: Dialect,
    account: Option<String>,
    resolver: ScopeResolver,
    downgraded: AtomicBool,
}

impl IngestRegistry {
    pub fn new(settings: &RegistrySettings, transport: Arc<dyn Transport>) -> Result<Self, RegistryError> {
        if settings.token.trim().is_empty() {
            return Err(RegistryError::Validation(
                "ingest registry token must be set".into(),
            ));
        }
        let account = settings.scope.clone().filter(|s| !s.trim().is_empty());
        if settings.dialect == Dialect::Current && account.is_none() {
            return Err(RegistryError::Validation(
                "ingest registry account must be set for the v2 API".into(),
            ));
        }

        Ok(Self {
            transport,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            dialect: settings.dialect,
            account,
            resolver: ScopeResolver::new(),
            downgraded: AtomicBool::new(false),
        })
    }

    pub fn dialect(&self) -> Dialect {
        if self.downgraded.load(Ordering::Relaxed) {
            Dialect::Legacy
        } else {
            self.dialect
        }
    }

    async fn account(&self) -> Option<Scope> {
        let raw = self.account.as_deref()?;
        Some(
            self.resolver
                .resolve(self.transport.as_ref(), &self.base_url, &self.token, ACCOUNTS, raw)
                .await,
        )
    }

    /// Collection URL for the dialect in effect.
    async fn collection_url(&self, dialect: Dialect) -> String {
        if dialect == Dialect::Current {
            if let Some(account) = self.account().await {
                return format!(
                    "{}/v2/accounts/{}/ingests",
                    self.base_url,
                    account.as_path_segment()
                );
            }
        }
        format!("{}/v1/ingests", self.base_url)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RegistryError> {
        Ok(self.transport.send(request.bearer(&self.token)).await?)
    }

    async fn list(&self, dialect: Dialect, label: &str) -> Result<HttpResponse, RegistryError> {
        let collection = self.collection_url(dialect).await;
        let url = reqwest::Url::parse_with_params(&collection, &[("label", label)])
            .map_err(|e| RegistryError::Validation(format!("invalid ingest registry URL: {e}")))?;
        self.send(HttpRequest::new(Method::GET, url.as_str())).await
    }

    async fn ingest_body(&self, payload: &StreamPayload) -> Value {
        let mut body = json!({
            "label": payload.label,
            "description": payload.description,
            "protocol": "srt",
            "source_url": payload.stream_url,
            "latency": payload.latency_ms,
            "passphrase": payload.passphrase,
            "stream_id": payload.stream_id,
            "video": payload.video,
            "audio": payload.audio,
        });
        if self.dialect() == Dialect::Legacy {
            if let Some(account) = self.account().await {
                body["account_id"] = account.as_json();
            }
        }
        body
    }
}

#[async_trait]
impl Registry for IngestRegistry {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteEntity>, RegistryError> {
        let dialect = self.dialect();
        let mut response = self.list(dialect, label).await?;

        if dialect == Dialect::Current && response.is_not_supported() {
            tracing::warn!(status = response.status, "Ingest listing not supported, falling back to v1");
            self.downgraded.store(true, Ordering::Relaxed);
            response = self.list(Dialect::Legacy, label).await?;
        }

        let response = response.error_for_status(NAME)?;
        Ok(pick_by_label(
            RemoteEntity::list_from_response(&response.body),
            label,
            true,
        ))
    }

    async fn create(&self, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        let url = self.collection_url(self.dialect()).await;
        let body = self.ingest_body(payload).await;
        let response = self
            .send(HttpRequest::new(Method::POST, url).json(body))
            .await?
            .error_for_status(NAME)?;

        RemoteEntity::from_response(&response.body).ok_or_else(|| RegistryError::Decode {
            registry: NAME,
            detail: format!("create returned no ingest id: {}", response.text),
        })
    }

    async fn update(&self, id: &str, payload: &StreamPayload) -> Result<RemoteEntity, RegistryError> {
        let url = format!("{}/{id}", self.collection_url(self.dialect()).await);
        let body = self.ingest_body(payload).await;
        let response = self
            .send(HttpRequest::new(Method::PUT, url).json(body))
            .await?
            .error_for_status(NAME)?;
        Ok(updated_entity(&response.body, id, payload))
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let url = format!("{}/{id}", self.collection_url(self.dialect()).await);
        self.send(HttpRequest::new(Method::DELETE, url))
            .await?
            .error_for_status(NAME)?;
        tracing::info!(ingest_id = %id, "Deleted ingest");
        Ok(())
    }
}
