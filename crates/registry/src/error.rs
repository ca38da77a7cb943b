/// Errors from moving a request to a registry, directly or via the relay.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay refused to forward the request.
    #[error("Relay error ({status}): {body}")]
    Relay { status: u16, body: String },
}

/// Errors from the channel and ingest registry clients.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The registry returned a non-2xx status code.
    #[error("{registry} registry error ({status}): {body}")]
    Api {
        registry: &'static str,
        status: u16,
        body: String,
    },

    /// A required setting (token, organization, account) is missing.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A create or update answered without a recognisable entity.
    #[error("Unexpected response from {registry} registry: {detail}")]
    Decode {
        registry: &'static str,
        detail: String,
    },
}
