use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};

/// One entry of the service routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRoute {
    pub prefix: String,
    pub base_url: String,
}

impl ServiceRoute {
    pub fn new(prefix: &str, base_url: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            base_url: base_url.to_string(),
        }
    }
}

/// Client configuration: service routing table, auth endpoints and
/// request timeout.
///
/// Base URLs are environment-driven at deploy time (`from_env`); a JSON
/// file with the same shape is accepted for local setups (`from_file`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Ordered prefix table; first match wins.
    #[serde(default = "default_routes")]
    pub routes: Vec<ServiceRoute>,

    /// Fallback for paths matching no registered prefix (local API gateway).
    #[serde(default = "default_gateway")]
    pub default_base_url: String,

    /// Base URL for the token refresh call.
    #[serde(default = "default_auth_base")]
    pub auth_base_url: String,

    /// Path of the refresh endpoint on the auth service.
    #[serde(default = "default_refresh_endpoint")]
    pub refresh_endpoint: String,

    /// Pre-authentication endpoints: a 401 here is a credential failure,
    /// never session expiry, so it must not provoke a refresh attempt.
    #[serde(default = "default_exempt_endpoints")]
    pub exempt_endpoints: Vec<String>,

    /// App routes reachable without a session; the forced-logout redirect
    /// is suppressed when the user is already on one of these.
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,

    /// Redirect target after an unrecoverable session failure.
    #[serde(default = "default_sign_in_route")]
    pub sign_in_route: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_routes() -> Vec<ServiceRoute> {
    vec![
        ServiceRoute::new("/auth", "http://localhost:8001"),
        ServiceRoute::new("/patient", "http://localhost:8002"),
        ServiceRoute::new("/orders", "http://localhost:8003"),
        ServiceRoute::new("/instrument", "http://localhost:8004"),
        ServiceRoute::new("/warehouse", "http://localhost:8005"),
        ServiceRoute::new("/roles", "http://localhost:8006"),
    ]
}

fn default_gateway() -> String {
    "http://localhost:8000".to_string()
}

fn default_auth_base() -> String {
    "http://localhost:8001".to_string()
}

fn default_refresh_endpoint() -> String {
    "/auth/refresh-token".to_string()
}

fn default_exempt_endpoints() -> Vec<String> {
    [
        "/auth/login",
        "/auth/register",
        "/auth/refresh-token",
        "/auth/forgot-password",
        "/auth/reset-password",
        "/auth/social",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_public_routes() -> Vec<String> {
    ["/signin", "/signup", "/forgot-password", "/reset-password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sign_in_route() -> String {
    "/signin".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
            default_base_url: default_gateway(),
            auth_base_url: default_auth_base(),
            refresh_endpoint: default_refresh_endpoint(),
            exempt_endpoints: default_exempt_endpoints(),
            public_routes: default_public_routes(),
            sign_in_route: default_sign_in_route(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden from the environment.
    ///
    /// Per-service base URLs come from `LIMS_<SERVICE>_URL` (e.g.
    /// `LIMS_PATIENT_URL` for the `/patient` prefix), the gateway
    /// fallback from `LIMS_GATEWAY_URL`, the timeout from
    /// `LIMS_TIMEOUT_SECS`. The `/auth` override also moves the refresh
    /// call's base URL.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        for route in &mut cfg.routes {
            let var = format!(
                "LIMS_{}_URL",
                route.prefix.trim_matches('/').to_uppercase()
            );
            if let Ok(value) = std::env::var(&var) {
                debug!(var = %var, url = %value, "base URL overridden from environment");
                route.base_url = value;
            }
        }
        if let Ok(value) = std::env::var("LIMS_GATEWAY_URL") {
            cfg.default_base_url = value;
        }
        if let Some(auth) = cfg.routes.iter().find(|r| r.prefix == "/auth") {
            cfg.auth_base_url = auth.base_url.clone();
        }
        if let Ok(value) = std::env::var("LIMS_TIMEOUT_SECS") {
            cfg.timeout_secs = value.parse().map_err(|_| ClientError::Config {
                message: format!("LIMS_TIMEOUT_SECS is not a number: {value}"),
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from a JSON file. Missing fields fall back to
    /// the defaults.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ClientError::Config {
            message: format!("reading config file {path}: {e}"),
        })?;
        let cfg: Self = serde_json::from_str(&raw).map_err(|e| ClientError::Config {
            message: format!("parsing config file {path}: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let bases = self
            .routes
            .iter()
            .map(|r| r.base_url.as_str())
            .chain([self.default_base_url.as_str(), self.auth_base_url.as_str()]);
        for base in bases {
            Url::parse(base).map_err(|e| ClientError::Config {
                message: format!("invalid base URL {base}: {e}"),
            })?;
        }
        Ok(())
    }

    /// Whether a 401 on this path must never provoke a refresh attempt.
    ///
    /// Matching is by whole path segments, never substring, so
    /// `/auth/login-history` does not ride on the `/auth/login` exemption.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.exempt_endpoints
            .iter()
            .any(|e| matches_segments(path, e))
    }

    /// Whether this path is the refresh endpoint itself.
    pub fn is_refresh_endpoint(&self, path: &str) -> bool {
        matches_segments(strip_query(path), &self.refresh_endpoint)
    }

    /// Whether an app route is reachable without a session.
    pub fn is_public_route(&self, route: &str) -> bool {
        let route = strip_query(route);
        self.public_routes.iter().any(|r| matches_segments(route, r))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Exact path or a longer path under it (`/auth/social` covers
/// `/auth/social/google/callback` but not `/auth/social-club`).
fn matches_segments(path: &str, endpoint: &str) -> bool {
    path == endpoint
        || path
            .strip_prefix(endpoint)
            .is_some_and(|rest| rest.starts_with('/'))
}
