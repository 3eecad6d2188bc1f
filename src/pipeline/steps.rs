use super::{BuildState, Capability, ExecutionContext, PipelineStep};
use crate::config::hostname::validate_ingress_host;
use crate::config::{
    ContainerRunner, Dependency, Protocol, Runner, Service, ServiceGraph, ServiceOrigin,
};
use crate::error::{Error, Result};
use crate::manifest::Manifests;
use crate::runner::{
    select_runner, CompileTarget, CompiledEndpoint, ExecutionMode, ResolutionFailure,
};
use indexmap::IndexMap;

/// Adds one synthetic container service per built-in dependency.
///
/// Running it again over the same state adds nothing.
pub struct ExpandDependencies;

impl ExpandDependencies {
    fn synthetic_service(dependency: Dependency) -> Service {
        let blueprint = dependency.blueprint();
        let runner = ContainerRunner {
            image: blueprint.image.to_string(),
            container_port: blueprint.container_port,
            host_port: Some(blueprint.host_port),
            protocol: Protocol::Http,
            environment: blueprint.environment.iter().copied().collect(),
            volumes: vec![format!("{}:{}", blueprint.volume, blueprint.data_path)],
            command: blueprint.command.iter().map(|s| s.to_string()).collect(),
        };
        let mut service = Service::new(vec![Runner::Docker(runner)]);
        service.origin = ServiceOrigin::Dependency(dependency);
        service
    }
}

impl PipelineStep for ExpandDependencies {
    fn name(&self) -> &'static str {
        "expand-dependencies"
    }

    fn run(
        &self,
        mut state: BuildState,
        graph: &ServiceGraph,
        _context: &ExecutionContext,
    ) -> Result<BuildState> {
        for &dependency in &graph.dependencies {
            let service_name = dependency.blueprint().service_name;
            match state.services.get(service_name) {
                Some(existing) if existing.origin == ServiceOrigin::Dependency(dependency) => {
                    tracing::debug!("Dependency '{}' already expanded", dependency.type_name());
                }
                Some(_) => {
                    return Err(Error::Config(format!(
                        "Service '{}' collides with the built-in '{}' dependency; rename the service",
                        service_name,
                        dependency.type_name()
                    )))
                }
                None => {
                    tracing::debug!(
                        "Expanding dependency '{}' into service '{}'",
                        dependency.type_name(),
                        service_name
                    );
                    state
                        .services
                        .insert(service_name.to_string(), Self::synthetic_service(dependency));
                }
            }
        }
        Ok(state)
    }
}

/// Checks every ingress host against the accepted-hostname policy.
pub struct ValidateIngress;

impl PipelineStep for ValidateIngress {
    fn name(&self) -> &'static str {
        "validate-ingress"
    }

    fn run(
        &self,
        state: BuildState,
        _graph: &ServiceGraph,
        _context: &ExecutionContext,
    ) -> Result<BuildState> {
        for (name, service) in &state.services {
            let Some(ingress) = &service.ingress else {
                continue;
            };
            validate_ingress_host(name, &ingress.host)?;
            if !ingress.path.starts_with('/') {
                return Err(Error::Config(format!(
                    "Service '{}' has ingress path '{}'; paths must start with '/'",
                    name, ingress.path
                )));
            }
        }
        Ok(state)
    }
}

/// Compiles the active runner of every service and binds ingress routes.
///
/// A service whose runner cannot resolve in the current mode is recorded as
/// a failure and left out; any other error aborts the step.
pub struct CompileRunners;

impl PipelineStep for CompileRunners {
    fn name(&self) -> &'static str {
        "compile-runners"
    }

    fn run(
        &self,
        mut state: BuildState,
        _graph: &ServiceGraph,
        context: &ExecutionContext,
    ) -> Result<BuildState> {
        let services = std::mem::take(&mut state.services);
        claim_declared_ports(&mut state, &services, &context.mode)?;

        for (name, service) in &services {
            let target = CompileTarget { name, service };
            let compiled = select_runner(name, service, &context.mode)
                .and_then(|runner| runner.compile(target, &mut state, context));

            let endpoint = match compiled {
                Ok(endpoint) => endpoint,
                Err(error) => {
                    let failure = ResolutionFailure::from_error(error)?;
                    tracing::warn!("Skipping service '{}': {}", name, failure);
                    state.failures.insert(name.clone(), failure);
                    continue;
                }
            };

            if let Some(ingress) = &service.ingress {
                match &endpoint {
                    CompiledEndpoint::Local { backend, .. } => {
                        state
                            .routes
                            .insert(name, &ingress.host, &ingress.path, backend.clone())?;
                    }
                    CompiledEndpoint::Remote { url } => {
                        tracing::debug!(
                            "Service '{}' resolves to {}; not routed through the proxy",
                            name,
                            url
                        );
                    }
                }
            }

            tracing::debug!("Compiled '{}' -> {}", name, endpoint.direct_url());
            state.endpoints.insert(name.clone(), endpoint);
        }

        state.services = services;
        Ok(state)
    }
}

/// Claim every fixed port up front so an ephemeral allocation for an earlier
/// service cannot take a port a later service declares.
fn claim_declared_ports(
    state: &mut BuildState,
    services: &IndexMap<String, Service>,
    mode: &ExecutionMode,
) -> Result<()> {
    for (name, service) in services {
        if let Ok(runner) = select_runner(name, service, mode) {
            if let Some(port) = runner.declared_port() {
                state.ports.claim(name, port)?;
            }
        }
    }
    Ok(())
}

/// Renders both manifests and hands them to their tool managers.
pub struct WriteManifests;

impl PipelineStep for WriteManifests {
    fn name(&self) -> &'static str {
        "write-manifests"
    }

    fn required_capability(&self) -> Option<Capability> {
        Some(Capability::PersistManifests)
    }

    fn run(
        &self,
        mut state: BuildState,
        _graph: &ServiceGraph,
        context: &ExecutionContext,
    ) -> Result<BuildState> {
        let manifests = Manifests::render(&state.compose, &state.supervisor)?;
        let written = context.toolchain.write_manifests(&manifests)?;
        state.manifests = Some(manifests);
        state.written = Some(written);
        Ok(state)
    }
}
