//! Day-to-day operations on outputs that already exist on a device.

use std::collections::HashSet;
use std::sync::Arc;

use edgecast_core::confirm::{confirm, PollSchedule};
use edgecast_core::error::CoreError;
use edgecast_core::types::EntryId;
use edgecast_device::gateway::DeviceGateway;
use edgecast_device::shadow::{ShadowEntry, ShadowSet, ShadowWrite, OUTPUTS};
use tokio_util::sync::CancellationToken;

use crate::error::DeployError;

/// Result of a bulk restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartReport {
    /// Outputs that were enabled and got switched off.
    pub disabled: Vec<EntryId>,
    /// Outputs switched back on; those that vanished in between are absent.
    pub reenabled: Vec<EntryId>,
    /// Whether the device reported every re-enabled output as enabled.
    pub confirmed: bool,
}

pub struct OutputReconciler {
    device: Arc<dyn DeviceGateway>,
    schedule: PollSchedule,
}

impl OutputReconciler {
    pub fn new(device: Arc<dyn DeviceGateway>, schedule: PollSchedule) -> Self {
        Self { device, schedule }
    }

    /// Switch one output on or off and wait until the device reports it.
    /// Returns whether the new flag was observed.
    pub async fn toggle(
        &self,
        device_id: &str,
        output_id: EntryId,
        enable: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, DeployError> {
        let current = self.device.read_shadows(device_id).await?;
        if current.get_or_empty(OUTPUTS).find_by_id(output_id).is_none() {
            return Err(CoreError::missing_entry("output", output_id).into());
        }

        self.device
            .update_output(device_id, output_id, enable)
            .await?;

        let confirmation = confirm(
            || self.device.read_shadows(device_id),
            |set: &ShadowSet| {
                set.get_or_empty(OUTPUTS)
                    .find_by_id(output_id)
                    .and_then(ShadowEntry::enabled)
                    == Some(enable)
            },
            &self.schedule,
            cancel,
        )
        .await;
        if confirmation.cancelled {
            return Err(DeployError::Cancelled);
        }

        tracing::info!(device_id = %device_id, output_id, enable, confirmed = confirmation.ok, "Output toggled");
        Ok(confirmation.ok)
    }

    /// Disable every enabled output, wait for the device to settle, then
    /// enable the same outputs again.
    ///
    /// The re-enable write is built from a fresh read, with the version that
    /// read reports, so entries changed in between are not overwritten with
    /// stale bodies. Outputs removed in the meantime stay removed.
    pub async fn bulk_restart(
        &self,
        device_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RestartReport, DeployError> {
        let outputs = self.device.read_shadows(device_id).await?.get_or_empty(OUTPUTS);
        let enabled: Vec<EntryId> = outputs
            .entries
            .iter()
            .filter(|e| e.enabled() == Some(true))
            .filter_map(ShadowEntry::id)
            .collect();

        if enabled.is_empty() {
            tracing::info!(device_id = %device_id, "No enabled outputs, nothing to restart");
            return Ok(RestartReport {
                confirmed: true,
                ..RestartReport::default()
            });
        }

        let targets: HashSet<EntryId> = enabled.iter().copied().collect();
        let disabled_state = outputs
            .entries
            .iter()
            .map(|e| match e.id() {
                Some(id) if targets.contains(&id) => e.to_state_with_enable(false),
                _ => e.to_state(),
            })
            .collect();
        self.device
            .write_shadow(device_id, &ShadowWrite::replace(&outputs, disabled_state))
            .await?;
        tracing::info!(device_id = %device_id, count = enabled.len(), version = outputs.version, "Outputs disabled");

        let all_off = |set: &ShadowSet| {
            let shadow = set.get_or_empty(OUTPUTS);
            shadow
                .entries
                .iter()
                .filter(|e| e.id().is_some_and(|id| targets.contains(&id)))
                .all(|e| e.enabled() != Some(true))
        };
        let settled = confirm(
            || self.device.read_shadows(device_id),
            all_off,
            &self.schedule,
            cancel,
        )
        .await;
        if settled.cancelled {
            return Err(DeployError::Cancelled);
        }
        if !settled.ok {
            tracing::warn!(device_id = %device_id, "Device did not report outputs disabled, re-enabling anyway");
        }

        let fresh = self.device.read_shadows(device_id).await?.get_or_empty(OUTPUTS);
        let reenabled: Vec<EntryId> = enabled
            .iter()
            .copied()
            .filter(|id| fresh.find_by_id(*id).is_some())
            .collect();
        let reenable: HashSet<EntryId> = reenabled.iter().copied().collect();
        let enabled_state = fresh
            .entries
            .iter()
            .map(|e| match e.id() {
                Some(id) if reenable.contains(&id) => e.to_state_with_enable(true),
                _ => e.to_state(),
            })
            .collect();
        self.device
            .write_shadow(device_id, &ShadowWrite::replace(&fresh, enabled_state))
            .await?;

        let confirmation = confirm(
            || self.device.read_shadows(device_id),
            |set: &ShadowSet| {
                let shadow = set.get_or_empty(OUTPUTS);
                reenabled
                    .iter()
                    .all(|id| shadow.find_by_id(*id).and_then(ShadowEntry::enabled) == Some(true))
            },
            &self.schedule,
            cancel,
        )
        .await;
        if confirmation.cancelled {
            return Err(DeployError::Cancelled);
        }

        tracing::info!(device_id = %device_id, count = reenabled.len(), version = fresh.version, confirmed = confirmation.ok, "Outputs re-enabled");
        Ok(RestartReport {
            disabled: enabled,
            reenabled,
            confirmed: confirmation.ok,
        })
    }
}
