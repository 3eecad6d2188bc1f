//! Runner compilation.
//!
//! Each service has exactly one *active* runner for a given
//! [`ExecutionMode`]. Compiling it appends manifest fragments to the
//! [`BuildState`](crate::pipeline::BuildState) and yields a
//! [`CompiledEndpoint`] describing where the service can be reached.

mod container;
mod local_project;
mod mock_server;
mod remote;

use crate::config::{Runner, Service};
use crate::error::{Error, Result};
use crate::ingress::Backend;
use crate::pipeline::{BuildState, ExecutionContext};
use std::fmt;

/// Whether services run on the workstation or resolve to a named remote
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    #[default]
    Local,
    Remote(String),
}

impl ExecutionMode {
    pub fn remote(environment: impl Into<String>) -> Self {
        ExecutionMode::Remote(environment.into())
    }

    pub fn environment(&self) -> Option<&str> {
        match self {
            ExecutionMode::Local => None,
            ExecutionMode::Remote(env) => Some(env),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => f.write_str("local"),
            ExecutionMode::Remote(env) => write!(f, "remote '{}'", env),
        }
    }
}

/// Where a compiled service is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledEndpoint {
    /// Started on the workstation. `scheme` is what clients dial, which
    /// differs from the backend protocol for non-HTTP dependencies.
    Local {
        backend: Backend,
        scheme: &'static str,
    },
    /// An already deployed instance.
    Remote { url: String },
}

impl CompiledEndpoint {
    pub fn local(backend: Backend) -> Self {
        let scheme = backend.protocol.scheme();
        CompiledEndpoint::Local { backend, scheme }
    }

    /// URL that bypasses the proxy.
    pub fn direct_url(&self) -> String {
        match self {
            CompiledEndpoint::Local { backend, scheme } => {
                format!("{}://{}", scheme, backend.authority())
            }
            CompiledEndpoint::Remote { url } => url.clone(),
        }
    }

    pub fn backend(&self) -> Option<&Backend> {
        match self {
            CompiledEndpoint::Local { backend, .. } => Some(backend),
            CompiledEndpoint::Remote { .. } => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, CompiledEndpoint::Remote { .. })
    }
}

/// A service whose active runner could not be resolved in the current mode.
///
/// Recorded instead of aborting compilation so the rest of the topology can
/// still come up; querying the service's address reproduces the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    UnsupportedInExecutionMode { service: String, mode: String },
    MissingEnvironmentMapping { service: String, environment: String },
}

impl ResolutionFailure {
    pub fn to_error(&self) -> Error {
        match self.clone() {
            ResolutionFailure::UnsupportedInExecutionMode { service, mode } => {
                Error::UnsupportedInExecutionMode { service, mode }
            }
            ResolutionFailure::MissingEnvironmentMapping {
                service,
                environment,
            } => Error::MissingEnvironmentMapping {
                service,
                environment,
            },
        }
    }

    /// Split a resolution error off from a fatal one.
    pub fn from_error(error: Error) -> std::result::Result<Self, Error> {
        match error {
            Error::UnsupportedInExecutionMode { service, mode } => {
                Ok(ResolutionFailure::UnsupportedInExecutionMode { service, mode })
            }
            Error::MissingEnvironmentMapping {
                service,
                environment,
            } => Ok(ResolutionFailure::MissingEnvironmentMapping {
                service,
                environment,
            }),
            other => Err(other),
        }
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_error().fmt(f)
    }
}

/// The service currently being compiled.
#[derive(Debug, Clone, Copy)]
pub struct CompileTarget<'a> {
    pub name: &'a str,
    pub service: &'a Service,
}

/// Pick the runner that is active for `service` under `mode`.
///
/// Local mode takes the first non-remote runner. A named remote environment
/// makes the first remote runner authoritative when one is declared, even if
/// it does not map the environment; that case fails rather than falling
/// back to a local runner.
pub fn select_runner<'a>(
    name: &str,
    service: &'a Service,
    mode: &ExecutionMode,
) -> Result<&'a Runner> {
    match mode {
        ExecutionMode::Local => service
            .runners
            .iter()
            .find(|r| !r.is_remote())
            .ok_or_else(|| Error::UnsupportedInExecutionMode {
                service: name.to_string(),
                mode: mode.to_string(),
            }),
        ExecutionMode::Remote(_) => service
            .runners
            .iter()
            .find(|r| r.is_remote())
            .or_else(|| service.runners.first())
            .ok_or_else(|| {
                Error::Config(format!("Service '{}' declares no runners", name))
            }),
    }
}

impl Runner {
    /// Compile this runner into `state` and report where it will listen.
    pub fn compile(
        &self,
        target: CompileTarget<'_>,
        state: &mut BuildState,
        context: &ExecutionContext,
    ) -> Result<CompiledEndpoint> {
        match self {
            Runner::Docker(runner) => runner.compile(target, state),
            Runner::Dotnet(runner) => runner.compile(target, state, context),
            Runner::Executable(runner) => runner.compile(target, state, context),
            Runner::OpenApi(runner) => runner.compile(target, state, context),
            Runner::Remote(runner) => runner
                .resolve_address(target.name, &context.mode)
                .map(|url| CompiledEndpoint::Remote { url }),
        }
    }
}

/// Claim the declared port, or allocate an ephemeral one.
fn resolve_port(state: &mut BuildState, service: &str, declared: Option<u16>) -> Result<u16> {
    match declared {
        Some(port) => state.ports.claim(service, port),
        None => {
            let port = state.ports.allocate(service)?;
            tracing::debug!("Allocated ephemeral port {} for '{}'", port, service);
            Ok(port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerRunner, Protocol, RemoteRunner};
    use std::collections::BTreeMap;

    fn container() -> Runner {
        Runner::Docker(ContainerRunner {
            image: "nginx".to_string(),
            container_port: 80,
            host_port: Some(8080),
            protocol: Protocol::Http,
            environment: Default::default(),
            volumes: Vec::new(),
            command: Vec::new(),
        })
    }

    fn remote(envs: &[(&str, &str)]) -> Runner {
        Runner::Remote(RemoteRunner {
            environments: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    #[test]
    fn local_mode_skips_remote_runners() {
        let service = Service::new(vec![remote(&[("dev", "https://x")]), container()]);
        let runner = select_runner("api", &service, &ExecutionMode::Local).unwrap();
        assert_eq!(runner.type_name(), "docker");
    }

    #[test]
    fn local_mode_rejects_remote_only_service() {
        let service = Service::new(vec![remote(&[("dev", "https://x")])]);
        let err = select_runner("api", &service, &ExecutionMode::Local).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInExecutionMode { .. }));
    }

    #[test]
    fn remote_mode_prefers_remote_runner_regardless_of_position() {
        let service = Service::new(vec![container(), remote(&[("dev", "https://x")])]);
        let runner = select_runner("api", &service, &ExecutionMode::remote("dev")).unwrap();
        assert!(runner.is_remote());
    }

    #[test]
    fn remote_mode_falls_back_to_local_without_remote_runner() {
        let service = Service::new(vec![container()]);
        let runner = select_runner("api", &service, &ExecutionMode::remote("dev")).unwrap();
        assert_eq!(runner.type_name(), "docker");
    }

    #[test]
    fn resolution_failures_round_trip_through_errors() {
        let failure = ResolutionFailure::MissingEnvironmentMapping {
            service: "api".to_string(),
            environment: "qa".to_string(),
        };
        let back = ResolutionFailure::from_error(failure.to_error()).unwrap();
        assert_eq!(back, failure);
        assert!(ResolutionFailure::from_error(Error::Config("x".into())).is_err());
    }

    #[test]
    fn direct_url_uses_endpoint_scheme() {
        let endpoint = CompiledEndpoint::Local {
            backend: Backend::local(Protocol::Http, 27217),
            scheme: "mongodb",
        };
        assert_eq!(endpoint.direct_url(), "mongodb://127.0.0.1:27217");
        assert_eq!(
            CompiledEndpoint::local(Backend::local(Protocol::Http, 5000)).direct_url(),
            "http://127.0.0.1:5000"
        );
    }
}
