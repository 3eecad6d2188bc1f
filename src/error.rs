// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(devstack::config::invalid),
        help("Run `devstack validate` to check your devstack.yaml")
    )]
    Config(String),

    #[error("Pipeline step '{step}' failed: {source}")]
    #[diagnostic(code(devstack::pipeline::step_failed))]
    PipelineStep {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Service '{service}' cannot run in {mode} mode: it only declares remote runners")]
    #[diagnostic(
        code(devstack::runner::unsupported_mode),
        help("Add a docker, dotnet, executable or openapi runner, or run with --remote-env")
    )]
    UnsupportedInExecutionMode { service: String, mode: String },

    #[error("Service '{service}' has no remote URL for environment '{environment}'")]
    #[diagnostic(
        code(devstack::runner::missing_environment),
        help("Add '{environment}' to the 'environments' map of the remote runner")
    )]
    MissingEnvironmentMapping {
        service: String,
        environment: String,
    },

    #[error("Failed to acquire {tool}: {reason}")]
    #[diagnostic(
        code(devstack::tool::acquisition),
        help("Check your network connection and retry; partial downloads were removed")
    )]
    ToolAcquisition { tool: String, reason: String },

    #[error("{tool} exited with {}", .code.map(|c| format!("code {}", c)).unwrap_or_else(|| "a signal".to_string()))]
    #[diagnostic(code(devstack::tool::exit))]
    SubprocessExit { tool: String, code: Option<i32> },

    #[error("Timed out after {timeout:?} waiting for health checks: {}", .checks.join(", "))]
    #[diagnostic(
        code(devstack::readiness::timeout),
        help("Check the output of the failing services above, or raise --timeout")
    )]
    ReadinessTimeout {
        checks: Vec<String>,
        timeout: Duration,
    },

    #[error("Manifest for {tool} was not written: {path}")]
    #[diagnostic(code(devstack::tool::manifest_missing))]
    ManifestMissing { tool: String, path: String },

    #[error("Service not found: {0}")]
    #[diagnostic(
        code(devstack::service::not_found),
        help("Check the 'services' section of devstack.yaml")
    )]
    ServiceNotFound(String),

    #[error("Service '{0}' has no ingress and is not reachable through the proxy")]
    #[diagnostic(
        code(devstack::ingress::not_reachable),
        help("Declare 'ingress: {{ host: <name>.workleap.localhost }}' on the service")
    )]
    NotReachableThroughProxy(String),

    #[error("Route {host}{path} is claimed by both '{existing}' and '{service}'")]
    #[diagnostic(code(devstack::ingress::route_conflict))]
    RouteConflict {
        host: String,
        path: String,
        existing: String,
        service: String,
    },

    #[error("Port allocation failed: {0}")]
    #[diagnostic(code(devstack::port::allocation_failed))]
    PortAllocation(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps an error raised inside a named pipeline step.
    pub fn in_step(step: &'static str, source: Error) -> Self {
        Error::PipelineStep {
            step,
            source: Box::new(source),
        }
    }

    /// The innermost error, unwrapping pipeline step context.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::PipelineStep { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::PipelineStep { source, .. } => source.suggestion(),
            Error::Config(_) => Some("Validate your config with: devstack validate".to_string()),
            Error::UnsupportedInExecutionMode { service, .. } => Some(format!(
                "Give '{}' a local runner, or start with --remote-env <environment>",
                service
            )),
            Error::MissingEnvironmentMapping {
                service,
                environment,
            } => Some(format!(
                "Add an entry for '{}' under the remote runner of '{}'",
                environment, service
            )),
            Error::ToolAcquisition { .. } => Some(
                "Downloads are not retried automatically. Run the command again once the network is available.".to_string(),
            ),
            Error::ReadinessTimeout { .. } => Some(
                "Inspect the tool output above; increase the timeout with --timeout if the services are slow to boot".to_string(),
            ),
            Error::RouteConflict { host, path, .. } => Some(format!(
                "Give one of the services a different ingress host or path than {}{}",
                host, path
            )),
            Error::PortAllocation(_) => Some(
                "Remove the fixed hostPort/port so an ephemeral port is allocated, or stop the process holding it".to_string(),
            ),
            Error::ServiceNotFound(name) => Some(format!(
                "'{}' is not declared in devstack.yaml nor produced by a dependency",
                name
            )),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
