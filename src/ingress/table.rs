//! Host + path-prefix dispatch table.
//!
//! Populated during compilation and read-only afterwards; the proxy shares
//! it behind an `Arc` without locking.

use crate::config::Protocol;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Where a route forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Backend {
    /// A backend on the workstation. TLS backends are addressed as
    /// `localhost` so the upstream certificate name matches.
    pub fn local(protocol: Protocol, port: u16) -> Self {
        let host = match protocol {
            Protocol::Http => "127.0.0.1",
            Protocol::Https => "localhost",
        };
        Self {
            protocol,
            host: host.to_string(),
            port,
        }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol.scheme(), self.authority())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub service: String,
    /// Lower-cased host.
    pub host: String,
    /// Normalised path prefix: starts with `/`, no trailing `/` unless root.
    pub path: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    /// Routes per host, longest path first.
    by_host: HashMap<String, Vec<Route>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `host` + `path`. A second registration of the
    /// same pair fails unless it comes from the same service.
    pub fn insert(&mut self, service: &str, host: &str, path: &str, backend: Backend) -> Result<()> {
        let host = host.to_ascii_lowercase();
        let path = normalize_prefix(path);
        let routes = self.by_host.entry(host.clone()).or_default();

        if let Some(existing) = routes.iter_mut().find(|r| r.path == path) {
            if existing.service != service {
                return Err(Error::RouteConflict {
                    host,
                    path,
                    existing: existing.service.clone(),
                    service: service.to_string(),
                });
            }
            existing.backend = backend;
            return Ok(());
        }

        routes.push(Route {
            service: service.to_string(),
            host,
            path,
            backend,
        });
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Ok(())
    }

    /// Longest matching prefix among the routes for `host`.
    ///
    /// `host` may carry a port (`app.workleap.localhost:1347`).
    pub fn resolve(&self, host: &str, path: &str) -> Option<&Route> {
        let host = strip_port(host).to_ascii_lowercase();
        self.by_host
            .get(&host)?
            .iter()
            .find(|route| prefix_matches(&route.path, path))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.by_host.values().flatten()
    }

    pub fn route_for_service(&self, service: &str) -> Option<&Route> {
        self.routes().find(|r| r.service == service)
    }

    pub fn len(&self) -> usize {
        self.by_host.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(port: u16) -> Backend {
        Backend::local(Protocol::Http, port)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = DispatchTable::new();
        table.insert("web", "app.workleap.localhost", "/", backend(1)).unwrap();
        table.insert("api", "app.workleap.localhost", "/api", backend(2)).unwrap();
        table.insert("v2", "app.workleap.localhost", "/api/v2/", backend(3)).unwrap();

        let pick = |path: &str| table.resolve("app.workleap.localhost", path).unwrap().service.as_str();
        assert_eq!(pick("/"), "web");
        assert_eq!(pick("/apix"), "web");
        assert_eq!(pick("/api"), "api");
        assert_eq!(pick("/api/users"), "api");
        assert_eq!(pick("/api/v2/users"), "v2");
    }

    #[test]
    fn test_unknown_host_does_not_match() {
        let mut table = DispatchTable::new();
        table.insert("api", "api.workleap.localhost", "/api", backend(2)).unwrap();

        assert!(table.resolve("other.workleap.localhost", "/api").is_none());
        assert!(table.resolve("api.workleap.localhost", "/").is_none());
    }

    #[test]
    fn test_host_is_case_insensitive_and_port_is_ignored() {
        let mut table = DispatchTable::new();
        table.insert("api", "API.workleap.localhost", "/", backend(2)).unwrap();
        assert!(table.resolve("api.WORKLEAP.localhost:1347", "/x").is_some());
    }

    #[test]
    fn test_conflicting_routes_are_rejected() {
        let mut table = DispatchTable::new();
        table.insert("a", "app.workleap.localhost", "/api/", backend(1)).unwrap();
        let err = table
            .insert("b", "app.workleap.localhost", "/api", backend(2))
            .unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));

        // Re-registering the same service just updates the backend.
        table.insert("a", "app.workleap.localhost", "/api", backend(3)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.resolve("app.workleap.localhost", "/api").unwrap().backend.port,
            3
        );
    }

    #[test]
    fn test_backend_urls() {
        let b = Backend::local(Protocol::Https, 7001);
        assert_eq!(b.base_url(), "https://localhost:7001");
        assert_eq!(b.to_string(), "https://localhost:7001");
        assert_eq!(Backend::local(Protocol::Http, 80).authority(), "127.0.0.1:80");
    }
}
