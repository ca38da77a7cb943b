mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use assert_matches::assert_matches;
use edgecast_core::confirm::PollSchedule;
use edgecast_device::gateway::DeviceGateway;
use edgecast_device::shadow::OUTPUTS;
use edgecast_pipeline::error::DeployError;
use edgecast_pipeline::reconciler::OutputReconciler;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{FakeDevice, DEVICE_ID};

fn reconciler(device: &Arc<FakeDevice>) -> OutputReconciler {
    OutputReconciler::new(
        Arc::clone(device) as Arc<dyn DeviceGateway>,
        PollSchedule::default(),
    )
}

fn seeded(outputs: serde_json::Value) -> Arc<FakeDevice> {
    let device = FakeDevice::new();
    device.seed(OUTPUTS, outputs.as_array().cloned().unwrap_or_default());
    Arc::new(device)
}

#[tokio::test(start_paused = true)]
async fn restart_without_enabled_outputs_writes_nothing() {
    let device = seeded(json!([{ "id": 20, "name": "A_out", "enable": false }]));

    let report = reconciler(&device)
        .bulk_restart(DEVICE_ID, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.disabled.is_empty());
    assert!(report.confirmed);
    assert_eq!(device.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_cycles_only_enabled_outputs() {
    let device = seeded(json!([
        { "id": 20, "name": "A_out", "enable": true },
        { "id": 21, "name": "B_out", "enable": false }
    ]));
    let start_version = device.version(OUTPUTS);

    let report = reconciler(&device)
        .bulk_restart(DEVICE_ID, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.disabled, vec![20]);
    assert_eq!(report.reenabled, vec![20]);
    assert!(report.confirmed);

    let writes = device.write_log.lock().unwrap().clone();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].target_version, start_version);
    assert_eq!(writes[0].state[0]["enable"], false);
    assert_eq!(writes[0].state[1]["enable"], false);
    // The re-enable is written against the version observed after the
    // disable, not the one captured at the start.
    assert_eq!(writes[1].target_version, start_version + 1);
    assert_eq!(writes[1].state[0]["enable"], true);
    assert_eq!(writes[1].state[1]["enable"], false);

    let entries = device.entries(OUTPUTS);
    assert_eq!(entries[0]["enable"], true);
    assert_eq!(entries[1]["enable"], false);
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_the_enabled_spelling() {
    let device = seeded(json!([{ "id": 20, "name": "A_out", "enabled": true }]));

    reconciler(&device)
        .bulk_restart(DEVICE_ID, &CancellationToken::new())
        .await
        .unwrap();

    let entry = &device.entries(OUTPUTS)[0];
    assert_eq!(entry["enabled"], true);
    assert!(entry.get("enable").is_none());
}

#[tokio::test(start_paused = true)]
async fn toggle_confirms_reported_flag() {
    let device = Arc::new(FakeDevice::new().with_read_lag(1));
    device.seed(OUTPUTS, vec![json!({ "id": 20, "name": "A_out", "enable": true })]);

    let confirmed = reconciler(&device)
        .toggle(DEVICE_ID, 20, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(confirmed);
    assert_eq!(device.output_updates.load(Ordering::SeqCst), 1);
    assert_eq!(device.write_count(), 0);
    assert_eq!(device.entries(OUTPUTS)[0]["enable"], false);
}

#[tokio::test(start_paused = true)]
async fn toggle_unknown_output_is_not_found() {
    let device = seeded(json!([{ "id": 20, "name": "A_out", "enable": true }]));

    let result = reconciler(&device)
        .toggle(DEVICE_ID, 99, true, &CancellationToken::new())
        .await;

    assert_matches!(
        result,
        Err(DeployError::NotFound { entity: "output", ref name }) if name == "99"
    );
    assert_eq!(device.output_updates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_toggle_reports_cancellation() {
    let device = Arc::new(FakeDevice::new().with_read_lag(10));
    device.seed(OUTPUTS, vec![json!({ "id": 20, "name": "A_out", "enable": true })]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = reconciler(&device)
        .toggle(DEVICE_ID, 20, false, &cancel)
        .await;

    assert_matches!(result, Err(DeployError::Cancelled));
    // The update itself was already sent.
    assert_eq!(device.output_updates.load(Ordering::SeqCst), 1);
}
