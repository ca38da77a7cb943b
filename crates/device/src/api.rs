//! REST client for the device cloud API.
//!
//! Wraps the shadow, output, command, alert and device-state endpoints
//! using [`reqwest`]. Every request carries the configured authorization
//! header and, when set, the `org_guid` query parameter. The client never
//! caches: every read goes to the API.

use std::time::Duration;

use edgecast_core::settings::DeviceSettings;
use edgecast_core::types::{Approval, EntryId};
use futures::future::join_all;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::error::DeviceError;
use crate::messages::{Alert, DeviceSnapshot, DeviceState, DeviceSummary, FleetEntry};
use crate::shadow::{ShadowAck, ShadowSet, ShadowWrite};

/// HTTP client for one device cloud account.
#[derive(Clone)]
pub struct DeviceApi {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
    org: Option<String>,
}

impl DeviceApi {
    /// Build a client from connection settings.
    pub fn new(settings: &DeviceSettings, timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, settings: &DeviceSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            authorization: settings.auth.header_value(&settings.token),
            org: settings.org.clone(),
        }
    }

    // ---- devices ----

    /// `GET devices`.
    pub async fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError> {
        let body = self.send_json(self.request(Method::GET, "devices")).await?;
        Ok(DeviceSummary::list_from_response(&body))
    }

    /// `GET device/{id}/state`.
    pub async fn device_state(&self, device_id: &str) -> Result<DeviceState, DeviceError> {
        let path = format!("device/{device_id}/state");
        let body = self.send_json(self.request(Method::GET, &path)).await?;
        Ok(DeviceState::from_value(device_id, &body))
    }

    /// State, shadows and alerts of one device, fetched concurrently.
    pub async fn snapshot(&self, device_id: &str) -> Result<DeviceSnapshot, DeviceError> {
        let (state, shadows, alerts) = tokio::try_join!(
            self.device_state(device_id),
            self.read_shadows(device_id),
            self.list_alerts(device_id),
        )?;
        Ok(DeviceSnapshot {
            state,
            shadows,
            alerts,
        })
    }

    /// Every listed device with its state, the state reads joined
    /// concurrently. A failed state read is reported on its row.
    pub async fn fleet_overview(&self) -> Result<Vec<FleetEntry>, DeviceError> {
        let devices = self.list_devices().await?;
        let states = join_all(devices.iter().map(|d| self.device_state(&d.id))).await;

        Ok(devices
            .into_iter()
            .zip(states)
            .map(|(device, state)| match state {
                Ok(state) => FleetEntry {
                    device,
                    state: Some(state),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(device_id = %device.id, error = %e, "Device state read failed");
                    FleetEntry {
                        device,
                        state: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect())
    }

    // ---- shadows ----

    /// `GET device/{id}/shadows`, normalized.
    pub async fn read_shadows(&self, device_id: &str) -> Result<ShadowSet, DeviceError> {
        let path = format!("device/{device_id}/shadows");
        let body = self.send_json(self.request(Method::GET, &path)).await?;
        ShadowSet::from_response(&body)
    }

    /// `POST device/{id}/shadows/commands` with a single `set` command.
    ///
    /// A 409, or any error body mentioning a version mismatch, maps to
    /// [`DeviceError::VersionConflict`]. Acceptance does not mean the device
    /// has applied the state; callers confirm by re-reading.
    pub async fn write_shadow(
        &self,
        device_id: &str,
        write: &ShadowWrite,
    ) -> Result<ShadowAck, DeviceError> {
        let path = format!("device/{device_id}/shadows/commands");
        tracing::info!(
            device_id = %device_id,
            shadow = %write.shadow_name,
            target_version = write.target_version,
            "Writing shadow",
        );

        let result = self
            .send_json(self.request(Method::POST, &path).json(&write.command_body()))
            .await;

        match result {
            Ok(body) => Ok(ShadowAck::from_response(&body)),
            Err(DeviceError::Api { status, body }) if is_version_conflict(status, &body) => {
                Err(DeviceError::VersionConflict {
                    shadow: write.shadow_name.clone(),
                    target_version: write.target_version,
                })
            }
            Err(e) => Err(e),
        }
    }

    // ---- outputs and commands ----

    /// Targeted enable/disable of one output (`POST device/{id}/outputs`).
    pub async fn update_output(
        &self,
        device_id: &str,
        output_id: EntryId,
        enable: bool,
    ) -> Result<(), DeviceError> {
        let path = format!("device/{device_id}/outputs");
        let body = json!({ "outputs": [{ "id": output_id, "enable": enable }] });
        tracing::info!(device_id = %device_id, output_id, enable, "Updating output");
        self.send_json(self.request(Method::POST, &path).json(&body))
            .await
            .map(|_| ())
    }

    /// `POST device/{id}/commands`, e.g. `reboot`.
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &str,
        parameters: Option<Value>,
    ) -> Result<Value, DeviceError> {
        let path = format!("device/{device_id}/commands");
        let mut body = json!({ "command_type": command });
        if let Some(parameters) = parameters {
            body["parameters"] = parameters;
        }
        tracing::info!(device_id = %device_id, command, "Sending device command");
        self.send_json(self.request(Method::POST, &path).json(&body))
            .await
    }

    // ---- alerts ----

    /// `GET device/{id}/alerts`.
    pub async fn list_alerts(&self, device_id: &str) -> Result<Vec<Alert>, DeviceError> {
        let path = format!("device/{device_id}/alerts");
        let body = self.send_json(self.request(Method::GET, &path)).await?;
        Ok(Alert::list_from_response(&body))
    }

    /// `PATCH device/{id}/alerts/{alertId}` to mute or unmute.
    pub async fn set_alert_muted(
        &self,
        device_id: &str,
        alert_id: &str,
        muted: bool,
    ) -> Result<(), DeviceError> {
        let path = format!("device/{device_id}/alerts/{alert_id}");
        self.send_json(self.request(Method::PATCH, &path).json(&json!({ "muted": muted })))
            .await
            .map(|_| ())
    }

    /// `DELETE device/{id}/alerts/{alertId}`; refused unless confirmed.
    pub async fn delete_alert(
        &self,
        device_id: &str,
        alert_id: &str,
        approval: Approval,
    ) -> Result<(), DeviceError> {
        if !approval.is_confirmed() {
            return Err(DeviceError::NotConfirmed(format!("delete alert {alert_id}")));
        }
        let path = format!("device/{device_id}/alerts/{alert_id}");
        tracing::info!(device_id = %device_id, alert_id, "Deleting alert");
        self.send_json(self.request(Method::DELETE, &path))
            .await
            .map(|_| ())
    }

    // ---- private helpers ----

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path))
            .header(reqwest::header::AUTHORIZATION, &self.authorization);
        match &self.org {
            Some(org) => builder.query(&[("org_guid", org)]),
            None => builder,
        }
    }

    /// Send a request and decode its body as JSON. An empty body decodes
    /// to `Value::Null`.
    async fn send_json(&self, request: RequestBuilder) -> Result<Value, DeviceError> {
        let response = Self::ensure_success(request.send().await?).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DeviceError::Decode(e.to_string()))
    }

    /// Ensure the response has a success status code, otherwise return a
    /// [`DeviceError::Api`] carrying status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DeviceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DeviceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn is_version_conflict(status: u16, body: &str) -> bool {
    if status == StatusCode::CONFLICT.as_u16() {
        return true;
    }
    let body = body.to_ascii_lowercase();
    body.contains("version")
        && ["mismatch", "conflict", "stale", "outdated"]
            .iter()
            .any(|w| body.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_detection() {
        assert!(is_version_conflict(409, ""));
        assert!(is_version_conflict(400, r#"{"error":"Target version mismatch"}"#));
        assert!(!is_version_conflict(400, r#"{"error":"bad shadow name"}"#));
        assert!(!is_version_conflict(500, "internal"));
    }
}
