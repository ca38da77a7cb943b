//! Device cloud client.
//!
//! Provides typed access to the device's versioned shadow documents, the
//! targeted output and command endpoints, alerts, and the
//! [`DeviceGateway`](gateway::DeviceGateway) seam the orchestrator depends
//! on.

pub mod api;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod shadow;
