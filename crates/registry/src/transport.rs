//! How registry requests reach the network.
//!
//! Registry clients build an [`HttpRequest`] and hand it to a
//! [`Transport`]; they never learn whether it went out directly or through
//! the same-origin relay. Responses are normalized into [`HttpResponse`]
//! so non-JSON and empty bodies need no special casing downstream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::{RegistryError, TransportError};

/// A registry request, fully addressed.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.headers
            .push(("Authorization".to_string(), format!("Bearer {token}")));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Normalized registry response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub ok: bool,
    /// Parsed body, `Value::Null` when empty or not JSON.
    pub body: Value,
    pub text: String,
}

impl HttpResponse {
    pub fn new(status: u16, text: String) -> Self {
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            ok: (200..300).contains(&status),
            body,
            text,
        }
    }

    /// Whether the endpoint does not exist in this API revision: 404, 405,
    /// 501, or a body saying so.
    pub fn is_not_supported(&self) -> bool {
        matches!(self.status, 404 | 405 | 501)
            || (!self.ok && self.text.to_ascii_lowercase().contains("not supported"))
    }

    /// Turn a non-2xx response into [`RegistryError::Api`].
    pub fn error_for_status(self, registry: &'static str) -> Result<Self, RegistryError> {
        if self.ok {
            Ok(self)
        } else {
            Err(RegistryError::Api {
                registry,
                status: self.status,
                body: self.text,
            })
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// DirectTransport
// ---------------------------------------------------------------------------

/// Sends requests straight to the registry with [`reqwest`].
pub struct DirectTransport {
    client: reqwest::Client,
}

impl DirectTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "Registry request");

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(HttpResponse::new(status, text))
    }
}

// ---------------------------------------------------------------------------
// RelayTransport
// ---------------------------------------------------------------------------

/// Forwards requests through a same-origin relay.
///
/// The relay receives `POST {relay}` with `{url, method, headers, body}`
/// and answers with the upstream status and body. A 502 carrying a
/// `relay_error` field is the relay's own failure, not the registry's.
pub struct RelayTransport {
    client: reqwest::Client,
    relay_url: String,
}

impl RelayTransport {
    pub fn new(relay_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            relay_url: relay_url.into(),
        })
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "Relayed registry request");

        let headers: Map<String, Value> = request
            .headers
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let envelope = json!({
            "url": request.url,
            "method": request.method.as_str(),
            "headers": headers,
            "body": request.body,
        });

        let response = self
            .client
            .post(&self.relay_url)
            .json(&envelope)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let normalized = HttpResponse::new(status, text);

        if status == 502 {
            if let Some(detail) = normalized.body.get("relay_error") {
                return Err(TransportError::Relay {
                    status,
                    body: detail.to_string(),
                });
            }
        }
        Ok(normalized)
    }
}
