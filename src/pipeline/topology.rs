use super::{BuildState, ExecutionContext};
use crate::config::{Ingress, ServiceGraph};
use crate::error::{Error, Result};
use crate::ingress::DispatchTable;
use crate::manifest::Manifests;
use crate::port::PortAllocator;
use crate::runner::{CompiledEndpoint, ExecutionMode, ResolutionFailure};
use crate::tools::WrittenManifests;
use indexmap::IndexMap;
use std::sync::Arc;

/// How one service can be addressed after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AddressEntry {
    Resolved {
        endpoint: CompiledEndpoint,
        /// Present only when the service is routed through the proxy.
        ingress: Option<Ingress>,
        healthcheck: Option<String>,
    },
    Failed(ResolutionFailure),
}

/// Resolved-address query over a compiled topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBook {
    proxy_port: u16,
    entries: IndexMap<String, AddressEntry>,
}

impl AddressBook {
    fn from_state(state: &BuildState, proxy_port: u16) -> Self {
        let mut entries = IndexMap::new();
        for (name, service) in &state.services {
            let entry = if let Some(failure) = state.failures.get(name) {
                AddressEntry::Failed(failure.clone())
            } else if let Some(endpoint) = state.endpoints.get(name) {
                let routed = state.routes.route_for_service(name).is_some();
                AddressEntry::Resolved {
                    endpoint: endpoint.clone(),
                    ingress: service.ingress.clone().filter(|_| routed),
                    healthcheck: service.healthcheck.clone(),
                }
            } else {
                continue;
            };
            entries.insert(name.clone(), entry);
        }
        Self {
            proxy_port,
            entries,
        }
    }

    /// A book with no services, for gates that only poll fixed URLs.
    pub fn empty(proxy_port: u16) -> Self {
        Self {
            proxy_port,
            entries: IndexMap::new(),
        }
    }

    fn resolved(&self, service: &str) -> Result<(&CompiledEndpoint, Option<&Ingress>)> {
        match self.entries.get(service) {
            Some(AddressEntry::Resolved {
                endpoint, ingress, ..
            }) => Ok((endpoint, ingress.as_ref())),
            Some(AddressEntry::Failed(failure)) => Err(failure.to_error()),
            None => Err(Error::ServiceNotFound(service.to_string())),
        }
    }

    /// Preferred URL for `service`: the remote URL in a remote environment,
    /// else the proxy URL when it has ingress, else its backend.
    pub fn resolve_url(&self, service: &str) -> Result<String> {
        let (endpoint, ingress) = self.resolved(service)?;
        match (endpoint, ingress) {
            (CompiledEndpoint::Remote { url }, _) => Ok(url.clone()),
            (_, Some(ingress)) => Ok(self.format_proxy_url(ingress)),
            (endpoint, None) => Ok(endpoint.direct_url()),
        }
    }

    /// URL through the ingress proxy. Fails for services without a route.
    pub fn proxy_url(&self, service: &str) -> Result<String> {
        match self.resolved(service)? {
            (_, Some(ingress)) => Ok(self.format_proxy_url(ingress)),
            (_, None) => Err(Error::NotReachableThroughProxy(service.to_string())),
        }
    }

    /// URL that bypasses the proxy: the backend, or the remote URL.
    pub fn direct_url(&self, service: &str) -> Result<String> {
        self.resolved(service).map(|(endpoint, _)| endpoint.direct_url())
    }

    /// Health-check path declared for `service`, if any.
    pub fn healthcheck_path(&self, service: &str) -> Option<&str> {
        match self.entries.get(service)? {
            AddressEntry::Resolved { healthcheck, .. } => healthcheck.as_deref(),
            AddressEntry::Failed(_) => None,
        }
    }

    /// Locally started services, in declaration order.
    pub fn local_endpoints(&self) -> impl Iterator<Item = (&str, &CompiledEndpoint)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            AddressEntry::Resolved { endpoint, .. } if !endpoint.is_remote() => {
                Some((name.as_str(), endpoint))
            }
            _ => None,
        })
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResolutionFailure)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            AddressEntry::Failed(failure) => Some((name.as_str(), failure)),
            AddressEntry::Resolved { .. } => None,
        })
    }

    pub fn proxy_port(&self) -> u16 {
        self.proxy_port
    }

    /// Record the port the proxy actually bound, when it was asked for `0`.
    pub(crate) fn set_proxy_port(&mut self, port: u16) {
        self.proxy_port = port;
    }

    fn format_proxy_url(&self, ingress: &Ingress) -> String {
        let path = ingress.path.trim_end_matches('/');
        format!(
            "http://{}:{}{}",
            ingress.host.to_ascii_lowercase(),
            self.proxy_port,
            path
        )
    }
}

/// Append `path` to `base` with exactly one separating slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// The output of a pipeline run.
#[derive(Debug)]
pub struct CompiledTopology {
    pub name: String,
    pub mode: ExecutionMode,
    pub manifests: Manifests,
    pub routes: Arc<DispatchTable>,
    pub addresses: AddressBook,
    /// Manifest tokens; `None` when the run did not persist manifests.
    pub written: Option<WrittenManifests>,
    pub requires_mock_server: bool,
    /// Held until the tools launch so ephemeral ports stay reserved.
    ports: PortAllocator,
}

impl CompiledTopology {
    pub fn from_state(
        state: BuildState,
        graph: &ServiceGraph,
        context: &ExecutionContext,
    ) -> Result<Self> {
        let addresses = AddressBook::from_state(&state, context.proxy_port);
        let manifests = match state.manifests {
            Some(manifests) => manifests,
            None => Manifests::render(&state.compose, &state.supervisor)?,
        };
        Ok(Self {
            name: graph.name.clone(),
            mode: context.mode.clone(),
            manifests,
            routes: Arc::new(state.routes),
            addresses,
            written: state.written,
            requires_mock_server: state.requires_mock_server,
            ports: state.ports,
        })
    }

    /// Close the port reservations right before the tools bind them.
    pub fn release_ports(&mut self) {
        self.ports.release_listeners();
    }
}
