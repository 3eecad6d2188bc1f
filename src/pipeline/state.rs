use crate::config::{Service, ServiceGraph};
use crate::ingress::DispatchTable;
use crate::manifest::{ComposeManifestBuilder, Manifests, SupervisorManifestBuilder};
use crate::port::PortAllocator;
use crate::runner::{CompiledEndpoint, ResolutionFailure};
use crate::tools::WrittenManifests;
use indexmap::IndexMap;

/// Accumulator threaded by value through every pipeline step.
///
/// Steps own the state for the duration of their run and hand it to the next
/// step; nothing outside the pipeline holds a reference to it.
#[derive(Debug)]
pub struct BuildState {
    /// Declared services plus synthetic ones added by dependency expansion.
    pub services: IndexMap<String, Service>,
    pub compose: ComposeManifestBuilder,
    pub supervisor: SupervisorManifestBuilder,
    pub routes: DispatchTable,
    /// Compiled endpoint per successfully resolved service.
    pub endpoints: IndexMap<String, CompiledEndpoint>,
    /// Services whose active runner could not resolve in this mode.
    pub failures: IndexMap<String, ResolutionFailure>,
    pub ports: PortAllocator,
    /// Whether any service needs the mock-server binary.
    pub requires_mock_server: bool,
    /// Set once manifests are rendered.
    pub manifests: Option<Manifests>,
    /// Set once manifests are persisted.
    pub written: Option<WrittenManifests>,
}

impl BuildState {
    pub fn new(graph: &ServiceGraph) -> Self {
        Self {
            services: graph.services.clone(),
            compose: ComposeManifestBuilder::new(),
            supervisor: SupervisorManifestBuilder::new(),
            routes: DispatchTable::new(),
            endpoints: IndexMap::new(),
            failures: IndexMap::new(),
            ports: PortAllocator::new(),
            requires_mock_server: false,
            manifests: None,
            written: None,
        }
    }

    pub fn synthetic_services(&self) -> impl Iterator<Item = (&String, &Service)> {
        self.services.iter().filter(|(_, s)| s.is_synthetic())
    }
}
