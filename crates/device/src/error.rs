use edgecast_core::types::ShadowVersion;

/// Errors from the device cloud client.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The device API returned a non-2xx status code.
    #[error("Device API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A shadow write carried a version the device no longer holds.
    #[error("Version conflict on shadow {shadow}: target version {target_version} is stale")]
    VersionConflict {
        shadow: String,
        target_version: ShadowVersion,
    },

    /// A destructive call was made without operator confirmation.
    #[error("Refusing to {0} without operator confirmation")]
    NotConfirmed(String),

    /// The response body did not have any recognised shape.
    #[error("Unexpected response from device API: {0}")]
    Decode(String),
}

impl DeviceError {
    /// Whether the error is a stale-version rejection of a shadow write.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
