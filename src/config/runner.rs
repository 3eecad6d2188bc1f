//! Runner declarations: how a single service is executed.

use super::EnvironmentOverlay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upstream protocol spoken by a locally running backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// One execution strategy for a service, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Runner {
    Docker(ContainerRunner),
    Dotnet(DotnetRunner),
    Executable(ExecutableRunner),
    Remote(RemoteRunner),
    #[serde(rename = "openapi")]
    OpenApi(MockServerRunner),
}

impl Runner {
    pub fn type_name(&self) -> &'static str {
        match self {
            Runner::Docker(_) => "docker",
            Runner::Dotnet(_) => "dotnet",
            Runner::Executable(_) => "executable",
            Runner::Remote(_) => "remote",
            Runner::OpenApi(_) => "openapi",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Runner::Remote(_))
    }

    pub fn environment(&self) -> Option<&EnvironmentOverlay> {
        match self {
            Runner::Docker(r) => Some(&r.environment),
            Runner::Dotnet(r) => Some(&r.environment),
            Runner::Executable(r) => Some(&r.environment),
            Runner::OpenApi(r) => Some(&r.environment),
            Runner::Remote(_) => None,
        }
    }

    /// Host port fixed in configuration, if any.
    pub fn declared_port(&self) -> Option<u16> {
        match self {
            Runner::Docker(r) => r.host_port,
            Runner::Dotnet(r) => r.port,
            Runner::Executable(r) => r.port,
            Runner::OpenApi(r) => r.port,
            Runner::Remote(_) => None,
        }
    }

    /// Whether `other` re-declares this runner rather than adding a new one.
    ///
    /// Identity is the runner type plus what it runs: the image, project,
    /// command or specification. A service has at most one remote runner.
    pub fn same_target(&self, other: &Runner) -> bool {
        match (self, other) {
            (Runner::Docker(a), Runner::Docker(b)) => a.image == b.image,
            (Runner::Dotnet(a), Runner::Dotnet(b)) => a.project == b.project,
            (Runner::Executable(a), Runner::Executable(b)) => a.command == b.command,
            (Runner::Remote(_), Runner::Remote(_)) => true,
            (Runner::OpenApi(a), Runner::OpenApi(b)) => a.specification == b.specification,
            _ => false,
        }
    }

    /// Merge a re-declaration of this runner on top of it.
    ///
    /// Fields set in `incoming` win, environments are overlaid and lists
    /// are replaced only when `incoming` declares them. An omitted
    /// `protocol` reads as `http`, so only `https` overrides.
    pub fn absorb(&mut self, incoming: Runner) {
        match (self, incoming) {
            (Runner::Docker(local), Runner::Docker(incoming)) => {
                local.container_port = incoming.container_port;
                if incoming.host_port.is_some() {
                    local.host_port = incoming.host_port;
                }
                absorb_protocol(&mut local.protocol, incoming.protocol);
                local.environment.overlay(&incoming.environment);
                if !incoming.volumes.is_empty() {
                    local.volumes = incoming.volumes;
                }
                if !incoming.command.is_empty() {
                    local.command = incoming.command;
                }
            }
            (Runner::Dotnet(local), Runner::Dotnet(incoming)) => {
                if incoming.port.is_some() {
                    local.port = incoming.port;
                }
                absorb_protocol(&mut local.protocol, incoming.protocol);
                if incoming.working_directory.is_some() {
                    local.working_directory = incoming.working_directory;
                }
                local.environment.overlay(&incoming.environment);
            }
            (Runner::Executable(local), Runner::Executable(incoming)) => {
                if !incoming.arguments.is_empty() {
                    local.arguments = incoming.arguments;
                }
                if incoming.port.is_some() {
                    local.port = incoming.port;
                }
                absorb_protocol(&mut local.protocol, incoming.protocol);
                if incoming.working_directory.is_some() {
                    local.working_directory = incoming.working_directory;
                }
                local.environment.overlay(&incoming.environment);
            }
            (Runner::Remote(local), Runner::Remote(incoming)) => {
                local.environments.extend(incoming.environments);
            }
            (Runner::OpenApi(local), Runner::OpenApi(incoming)) => {
                if incoming.port.is_some() {
                    local.port = incoming.port;
                }
                local.environment.overlay(&incoming.environment);
            }
            (local, incoming) => {
                tracing::debug!(
                    "Ignoring {} runner merged into {} runner",
                    incoming.type_name(),
                    local.type_name()
                );
            }
        }
    }
}

fn absorb_protocol(local: &mut Protocol, incoming: Protocol) {
    if incoming != Protocol::default() {
        *local = incoming;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRunner {
    pub image: String,
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "EnvironmentOverlay::is_empty")]
    pub environment: EnvironmentOverlay,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

/// A .NET project started with `dotnet run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DotnetRunner {
    /// Path to a project file or a directory containing one.
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "EnvironmentOverlay::is_empty")]
    pub environment: EnvironmentOverlay,
}

/// A plain executable invoked directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableRunner {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "EnvironmentOverlay::is_empty")]
    pub environment: EnvironmentOverlay,
}

/// Passthrough to an already deployed instance, one URL per named environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRunner {
    #[serde(default)]
    pub environments: BTreeMap<String, String>,
}

/// An OpenAPI mock server generated from a specification file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockServerRunner {
    pub specification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "EnvironmentOverlay::is_empty")]
    pub environment: EnvironmentOverlay,
}
