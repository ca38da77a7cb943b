//! Device configuration orchestration.
//!
//! [`Orchestrator`](orchestrator::Orchestrator) applies a profile to a
//! device: encoders, then outputs, each confirmed by re-reading the
//! device's shadows, then the downstream channel and ingest registries.
//! [`OutputReconciler`](reconciler::OutputReconciler) handles the smaller
//! day-to-day operations on outputs that already exist.

pub mod downstream;
pub mod encoders;
pub mod error;
pub mod lease;
pub mod orchestrator;
pub mod outputs;
pub mod reconciler;
pub mod steps;
