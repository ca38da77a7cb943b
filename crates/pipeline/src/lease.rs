//! Per-device deployment leases.
//!
//! At most one deployment may run against a device at a time; a second
//! attempt fails fast with [`DeployError::Busy`] instead of interleaving
//! shadow writes. The lease is released when the guard drops, including on
//! early return and panic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DeployError;

#[derive(Debug, Clone, Default)]
pub struct DeviceLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl DeviceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, device_id: &str) -> Result<DeviceLease, DeployError> {
        if !lock(&self.held).insert(device_id.to_string()) {
            return Err(DeployError::Busy(device_id.to_string()));
        }
        Ok(DeviceLease {
            held: Arc::clone(&self.held),
            device_id: device_id.to_string(),
        })
    }

    pub fn is_held(&self, device_id: &str) -> bool {
        lock(&self.held).contains(device_id)
    }
}

/// Guard returned by [`DeviceLeases::acquire`].
#[derive(Debug)]
pub struct DeviceLease {
    held: Arc<Mutex<HashSet<String>>>,
    device_id: String,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.device_id);
    }
}

// A panic while holding the set cannot leave it inconsistent.
fn lock(held: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
