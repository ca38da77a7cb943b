//! HTTP-level tests for the device cloud client against a mock server.

use std::time::Duration;

use assert_matches::assert_matches;
use edgecast_core::settings::{AuthScheme, DeviceSettings};
use edgecast_core::types::Approval;
use edgecast_device::api::DeviceApi;
use edgecast_device::error::DeviceError;
use edgecast_device::shadow::{Shadow, ShadowWrite, ENCODERS, OUTPUTS};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer, auth: AuthScheme, org: Option<&str>) -> DeviceApi {
    let settings = DeviceSettings {
        base_url: format!("{}/api/", server.uri()),
        token: "secret".into(),
        auth,
        org: org.map(str::to_string),
    };
    DeviceApi::new(&settings, Duration::from_secs(5)).unwrap()
}

// ---------------------------------------------------------------------------
// Shadows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_shadows_sends_auth_and_org() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/shadows"))
        .and(header("authorization", "PAT secret"))
        .and(query_param("org_guid", "org-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shadows": [
                { "shadow_name": "Encoders", "reported": { "version": 5, "state": { "10": { "name": "a_video" } } } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let shadows = api(&server, AuthScheme::Pat, Some("org-9"))
        .read_shadows("d-1")
        .await
        .unwrap();

    let encoders = shadows.get(ENCODERS).unwrap();
    assert_eq!(encoders.version, 5);
    assert_eq!(encoders.find_by_name("a_video").and_then(|e| e.id()), Some(10));
}

#[tokio::test]
async fn write_shadow_posts_set_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device/d-1/shadows/commands"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({
            "command_type": "set",
            "commands": [{ "shadow_name": "Outputs", "target_version": 2, "state": [] }]
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "command_guid": "c-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let shadow = Shadow::from_state(OUTPUTS, 2, &json!([]));
    let ack = api(&server, AuthScheme::Bearer, None)
        .write_shadow("d-1", &ShadowWrite::replace(&shadow, Vec::new()))
        .await
        .unwrap();

    assert_eq!(ack.command_id.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn stale_version_maps_to_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device/d-1/shadows/commands"))
        .respond_with(ResponseTemplate::new(409).set_body_string("version mismatch"))
        .mount(&server)
        .await;

    let shadow = Shadow::from_state(ENCODERS, 1, &json!([]));
    let result = api(&server, AuthScheme::Bearer, None)
        .write_shadow("d-1", &ShadowWrite::replace(&shadow, Vec::new()))
        .await;

    assert_matches!(
        result,
        Err(DeviceError::VersionConflict { ref shadow, target_version: 1 }) if shadow == "Encoders"
    );
}

#[tokio::test]
async fn other_failures_keep_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/shadows"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = api(&server, AuthScheme::Bearer, None).read_shadows("d-1").await;
    assert_matches!(result, Err(DeviceError::Api { status: 503, ref body }) if body == "maintenance");
}

// ---------------------------------------------------------------------------
// Outputs, commands, alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_output_is_targeted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device/d-1/outputs"))
        .and(body_json(json!({ "outputs": [{ "id": 20, "enable": false }] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, AuthScheme::Bearer, None)
        .update_output("d-1", 20, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn send_command_includes_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device/d-1/commands"))
        .and(body_json(json!({ "command_type": "reboot", "parameters": { "delay": 5 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accepted": true })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = api(&server, AuthScheme::Bearer, None)
        .send_command("d-1", "reboot", Some(json!({ "delay": 5 })))
        .await
        .unwrap();
    assert_eq!(reply["accepted"], true);
}

#[tokio::test]
async fn delete_alert_requires_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/device/d-1/alerts/a-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = api(&server, AuthScheme::Bearer, None);
    let refused = client.delete_alert("d-1", "a-7", Approval::Declined).await;
    assert_matches!(refused, Err(DeviceError::NotConfirmed(_)));

    client
        .delete_alert("d-1", "a-7", Approval::Confirmed)
        .await
        .unwrap();
}

#[tokio::test]
async fn mute_alert_patches() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/device/d-1/alerts/a-7"))
        .and(body_json(json!({ "muted": true })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, AuthScheme::Bearer, None)
        .set_alert_muted("d-1", "a-7", true)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Aggregate reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_joins_three_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "online": true, "ip": "198.51.100.4" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/shadows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "shadows": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "a-1" }])))
        .mount(&server)
        .await;

    let snapshot = api(&server, AuthScheme::Bearer, None)
        .snapshot("d-1")
        .await
        .unwrap();

    assert_eq!(snapshot.state.ip_address.as_deref(), Some("198.51.100.4"));
    assert_eq!(snapshot.alerts.len(), 1);
    assert!(snapshot.shadows.get(OUTPUTS).is_none());
}

#[tokio::test]
async fn fleet_overview_reports_failed_state_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "device_id": "d-1" }, { "device_id": "d-2" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "online": true })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/device/d-2/state"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown device"))
        .mount(&server)
        .await;

    let fleet = api(&server, AuthScheme::Bearer, None)
        .fleet_overview()
        .await
        .unwrap();

    assert_eq!(fleet.len(), 2);
    assert_eq!(fleet[0].state.as_ref().and_then(|s| s.online), Some(true));
    assert!(fleet[1].state.is_none());
    assert!(fleet[1].error.as_deref().unwrap_or_default().contains("404"));
}
