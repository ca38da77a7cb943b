//! The seam between orchestration and the device cloud.
//!
//! The orchestrator and reconciler only need four calls; everything else
//! on [`DeviceApi`] is operator tooling. Tests substitute an in-memory
//! implementation.

use async_trait::async_trait;
use edgecast_core::types::EntryId;

use crate::api::DeviceApi;
use crate::error::DeviceError;
use crate::messages::DeviceState;
use crate::shadow::{ShadowAck, ShadowSet, ShadowWrite};

#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn read_shadows(&self, device_id: &str) -> Result<ShadowSet, DeviceError>;

    async fn write_shadow(
        &self,
        device_id: &str,
        write: &ShadowWrite,
    ) -> Result<ShadowAck, DeviceError>;

    async fn device_state(&self, device_id: &str) -> Result<DeviceState, DeviceError>;

    async fn update_output(
        &self,
        device_id: &str,
        output_id: EntryId,
        enable: bool,
    ) -> Result<(), DeviceError>;
}

#[async_trait]
impl DeviceGateway for DeviceApi {
    async fn read_shadows(&self, device_id: &str) -> Result<ShadowSet, DeviceError> {
        DeviceApi::read_shadows(self, device_id).await
    }

    async fn write_shadow(
        &self,
        device_id: &str,
        write: &ShadowWrite,
    ) -> Result<ShadowAck, DeviceError> {
        DeviceApi::write_shadow(self, device_id, write).await
    }

    async fn device_state(&self, device_id: &str) -> Result<DeviceState, DeviceError> {
        DeviceApi::device_state(self, device_id).await
    }

    async fn update_output(
        &self,
        device_id: &str,
        output_id: EntryId,
        enable: bool,
    ) -> Result<(), DeviceError> {
        DeviceApi::update_output(self, device_id, output_id, enable).await
    }
}
