use edgecast_core::error::CoreError;
use edgecast_core::types::ShadowVersion;
use edgecast_device::error::DeviceError;
use edgecast_registry::error::RegistryError;

/// Why a deployment step failed.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Network failure or non-2xx answer from any backend.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Version conflict on shadow {shadow}: target version {target_version} is stale")]
    VersionConflict {
        shadow: String,
        target_version: ShadowVersion,
    },

    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("Port range exhausted: requested {requested}, only {available} free")]
    RangeExhausted { requested: usize, available: usize },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Another deployment holds the device's lease.
    #[error("Device {0} is busy with another deployment")]
    Busy(String),

    #[error("Deployment cancelled")]
    Cancelled,
}

impl From<DeviceError> for DeployError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::VersionConflict {
                shadow,
                target_version,
            } => Self::VersionConflict {
                shadow,
                target_version,
            },
            DeviceError::NotConfirmed(what) => {
                Self::Validation(format!("{what} requires confirmation"))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<RegistryError> for DeployError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Validation(msg) => Self::Validation(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<CoreError> for DeployError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound { entity, name } => Self::NotFound { entity, name },
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::RangeExhausted {
                requested,
                available,
            } => Self::RangeExhausted {
                requested,
                available,
            },
        }
    }
}
