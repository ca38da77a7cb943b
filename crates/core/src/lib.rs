//! Domain types and pure logic shared by every `edgecast` crate.
//!
//! Holds the profile data model, the encoder field mapping, the port
//! allocator, the confirmation poller and the connection settings. Has no
//! dependency on any other workspace crate.

pub mod confirm;
pub mod encoding;
pub mod error;
pub mod ports;
pub mod profile;
pub mod settings;
pub mod shape;
pub mod types;
