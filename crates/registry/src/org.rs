//! Organization / account scope resolution.
//!
//! Operators may name their organization (channel registry) or account
//! (ingest registry) instead of giving its numeric id. Names are resolved
//! once through the registry's listing endpoint and cached for the life of
//! the resolver, keyed by token, base URL and name. Resolution never fails
//! a call: any error is logged and the caller falls back to the raw value.

use std::collections::HashMap;

use edgecast_core::shape;
use reqwest::Method;
use tokio::sync::RwLock;

use crate::transport::{HttpRequest, Transport};

/// Scope as the registry client will use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Numeric id, given directly or resolved from a name.
    Id(i64),
    /// A name that could not be resolved, passed through unchanged.
    Raw(String),
}

impl Scope {
    pub fn as_path_segment(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }

    pub fn as_json(&self) -> serde_json::Value {
        match self {
            Self::Id(id) => serde_json::Value::from(*id),
            Self::Raw(raw) => serde_json::Value::from(raw.as_str()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

/// Listing endpoint and wrapper keys for one kind of scope.
#[derive(Debug, Clone, Copy)]
pub struct ScopeListing {
    /// Path under the registry base, e.g. `v2/organizations`.
    pub path: &'static str,
    pub list_keys: &'static [&'static str],
}

pub const ORGANIZATIONS: ScopeListing = ScopeListing {
    path: "v2/organizations",
    list_keys: &["organizations", "data", "items", "results"],
};

pub const ACCOUNTS: ScopeListing = ScopeListing {
    path: "v2/accounts",
    list_keys: &["accounts", "data", "items", "results"],
};

#[derive(Default)]
pub struct ScopeResolver {
    cache: RwLock<HashMap<String, i64>>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `raw` to a [`Scope`]. Numeric input passes through without
    /// a request; names hit the cache first, then the listing endpoint.
    pub async fn resolve(
        &self,
        transport: &dyn Transport,
        base_url: &str,
        token: &str,
        listing: ScopeListing,
        raw: &str,
    ) -> Scope {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Scope::Id(id);
        }

        let key = format!("{token}|{base_url}|{raw}");
        if let Some(id) = self.cache.read().await.get(&key) {
            return Scope::Id(*id);
        }

        match lookup(transport, base_url, token, listing, raw).await {
            Some(id) => {
                tracing::info!(scope = %raw, id, "Resolved registry scope");
                self.cache.write().await.insert(key, id);
                Scope::Id(id)
            }
            None => Scope::Raw(raw.to_string()),
        }
    }
}

async fn lookup(
    transport: &dyn Transport,
    base_url: &str,
    token: &str,
    listing: ScopeListing,
    name: &str,
) -> Option<i64> {
    let request = HttpRequest::new(Method::GET, format!("{base_url}/{}", listing.path)).bearer(token);
    let response = match transport.send(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(scope = %name, error = %e, "Scope resolution failed");
            return None;
        }
    };
    if !response.ok {
        tracing::warn!(scope = %name, status = response.status, "Scope listing rejected");
        return None;
    }

    let found = shape::extract_list(&response.body, listing.list_keys)
        .into_iter()
        .find(|item| {
            shape::first_string(item, &["name", "label", "slug"])
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|item| shape::first_i64(&item, &["id", "organization_id", "account_id"]));

    if found.is_none() {
        tracing::warn!(scope = %name, "Scope not found in listing");
    }
    found
}
