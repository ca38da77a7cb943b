//! Operator connection settings.
//!
//! Loaded once from the environment and handed to the orchestrator as an
//! immutable snapshot (`Arc<ConnectionSettings>`), so edits made while a
//! deployment is in flight never affect it.

use std::time::Duration;

use crate::error::CoreError;
use crate::ports::PortRange;

/// Default HTTP request timeout for all backends.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Protocol dialect spoken by a downstream registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `v1`: verb-style endpoints.
    Legacy,
    /// `v2`: REST resources.
    Current,
}

impl Dialect {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "v1" | "legacy" => Ok(Self::Legacy),
            "v2" | "current" => Ok(Self::Current),
            other => Err(CoreError::Validation(format!(
                "Unknown dialect \"{other}\" (expected v1 or v2)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "v1",
            Self::Current => "v2",
        }
    }
}

/// How the device API token is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    /// Personal access token: `Authorization: PAT <token>`.
    Pat,
}

impl AuthScheme {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(Self::Bearer),
            "pat" => Ok(Self::Pat),
            other => Err(CoreError::Validation(format!(
                "Unknown auth scheme \"{other}\" (expected bearer or pat)"
            ))),
        }
    }

    /// Value of the `Authorization` header for `token`.
    pub fn header_value(self, token: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {token}"),
            Self::Pat => format!("PAT {token}"),
        }
    }
}

/// Device cloud API access.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub base_url: String,
    pub token: String,
    pub auth: AuthScheme,
    /// Organization scoping sent as the `org_guid` query parameter.
    pub org: Option<String>,
}

/// Access to one downstream registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub base_url: String,
    pub token: String,
    pub dialect: Dialect,
    /// Organization (channel registry) or account (ingest registry), either
    /// as a numeric id or as a display name to be resolved.
    pub scope: Option<String>,
}

impl RegistrySettings {
    /// Numeric scope id when the operator supplied one directly.
    pub fn numeric_scope(&self) -> Option<i64> {
        self.scope.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

/// Everything the orchestrator needs to reach the three backends.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub device: DeviceSettings,
    pub channel: Option<RegistrySettings>,
    pub ingest: Option<RegistrySettings>,
    /// Same-origin relay that forwards registry calls, if used.
    pub relay_url: Option<String>,
    pub request_timeout: Duration,
    pub port_range: PortRange,
}

impl ConnectionSettings {
    /// Load settings from process environment variables.
    ///
    /// | Env Var                         | Required | Default        |
    /// |---------------------------------|----------|----------------|
    /// | `EDGECAST_DEVICE_API_URL`       | yes      | --             |
    /// | `EDGECAST_DEVICE_TOKEN`         | yes      | --             |
    /// | `EDGECAST_DEVICE_AUTH_SCHEME`   | no       | `bearer`       |
    /// | `EDGECAST_DEVICE_ORG`           | no       | --             |
    /// | `EDGECAST_CHANNEL_API_URL`      | no       | --             |
    /// | `EDGECAST_CHANNEL_TOKEN`        | with URL | --             |
    /// | `EDGECAST_CHANNEL_DIALECT`      | no       | `v2`           |
    /// | `EDGECAST_CHANNEL_ORG`          | no       | --             |
    /// | `EDGECAST_INGEST_API_URL`       | no       | --             |
    /// | `EDGECAST_INGEST_TOKEN`         | with URL | --             |
    /// | `EDGECAST_INGEST_DIALECT`       | no       | `v2`           |
    /// | `EDGECAST_INGEST_ACCOUNT`       | no       | --             |
    /// | `EDGECAST_RELAY_URL`            | no       | --             |
    /// | `EDGECAST_REQUEST_TIMEOUT_SECS` | no       | `30`           |
    /// | `EDGECAST_PORT_RANGE`           | no       | `10001-10100`  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| CoreError::Validation(format!("{key} must be set")))
        };

        let device = DeviceSettings {
            base_url: trim_base(&require("EDGECAST_DEVICE_API_URL")?),
            token: require("EDGECAST_DEVICE_TOKEN")?,
            auth: get("EDGECAST_DEVICE_AUTH_SCHEME")
                .map(|v| AuthScheme::parse(&v))
                .transpose()?
                .unwrap_or(AuthScheme::Bearer),
            org: get("EDGECAST_DEVICE_ORG"),
        };

        let registry = |prefix: &str, scope_key: &str| -> Result<Option<RegistrySettings>, CoreError> {
            let Some(base_url) = get(&format!("EDGECAST_{prefix}_API_URL")) else {
                return Ok(None);
            };
            Ok(Some(RegistrySettings {
                base_url: trim_base(&base_url),
                token: require(&format!("EDGECAST_{prefix}_TOKEN"))?,
                dialect: get(&format!("EDGECAST_{prefix}_DIALECT"))
                    .map(|v| Dialect::parse(&v))
                    .transpose()?
                    .unwrap_or(Dialect::Current),
                scope: get(scope_key),
            }))
        };

        let request_timeout_secs = match get("EDGECAST_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                CoreError::Validation(
                    "EDGECAST_REQUEST_TIMEOUT_SECS must be a valid u64".to_string(),
                )
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let port_range = match get("EDGECAST_PORT_RANGE") {
            Some(raw) => PortRange::parse(&raw)?,
            None => PortRange::default(),
        };

        Ok(Self {
            device,
            channel: registry("CHANNEL", "EDGECAST_CHANNEL_ORG")?,
            ingest: registry("INGEST", "EDGECAST_INGEST_ACCOUNT")?,
            relay_url: get("EDGECAST_RELAY_URL").map(|u| trim_base(&u)),
            request_timeout: Duration::from_secs(request_timeout_secs),
            port_range,
        })
    }
}

/// Drop trailing slashes so paths can be appended with `format!("{base}/...")`.
fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
