use tracing::trace;

use crate::config::{ClientConfig, ServiceRoute};

/// Maps request paths to backend base URLs.
///
/// Pure lookup over an ordered prefix table: the first registered
/// prefix matching the path wins, anything else falls back to the
/// default gateway. Routing is total; there is no error case.
#[derive(Debug, Clone)]
pub struct ServiceRouter {
    routes: Vec<ServiceRoute>,
    default_base_url: String,
}

impl ServiceRouter {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            routes: config.routes.clone(),
            default_base_url: config.default_base_url.clone(),
        }
    }

    /// Base URL for a relative request path.
    pub fn resolve(&self, path: &str) -> &str {
        for route in &self.routes {
            if path.starts_with(route.prefix.as_str()) {
                trace!(path = %path, prefix = %route.prefix, base = %route.base_url, "route matched");
                return &route.base_url;
            }
        }
        trace!(path = %path, base = %self.default_base_url, "no prefix matched, using gateway");
        &self.default_base_url
    }

    /// Full target URL for a request path. Absolute URLs bypass routing
    /// entirely so the client can also call external endpoints.
    pub fn target_url(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        format!("{}{}", self.resolve(path), path)
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}
