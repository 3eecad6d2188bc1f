//! Service configuration types.
//!
//! A [`ServiceFragment`] is what a single file declares; fragments are merged
//! into a [`Service`] by [`ConfigMerger`](super::ConfigMerger).

use super::{Dependency, Runner};
use serde::{Deserialize, Serialize};

/// Default ingress path prefix.
pub const DEFAULT_INGRESS_PATH: &str = "/";

/// Host and path prefix by which a service is reachable through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    pub host: String,
    #[serde(default = "default_ingress_path")]
    pub path: String,
}

fn default_ingress_path() -> String {
    DEFAULT_INGRESS_PATH.to_string()
}

/// Where a service in the graph came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceOrigin {
    #[default]
    Declared,
    /// Synthesised from a built-in dependency.
    Dependency(Dependency),
}

/// One addressable unit of the merged graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,

    /// Runners in declaration order.
    pub runners: Vec<Runner>,

    /// Optional HTTP path polled by the readiness gate (e.g. `/health`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<String>,

    #[serde(skip)]
    pub origin: ServiceOrigin,
}

impl Service {
    pub fn new(runners: Vec<Runner>) -> Self {
        Self {
            ingress: None,
            runners,
            healthcheck: None,
            origin: ServiceOrigin::Declared,
        }
    }

    pub fn with_ingress(mut self, host: impl Into<String>, path: impl Into<String>) -> Self {
        self.ingress = Some(Ingress {
            host: host.into(),
            path: path.into(),
        });
        self
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.origin, ServiceOrigin::Dependency(_))
    }
}

/// Partial ingress declaration; either field may come from a later file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A service as declared by one configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressFragment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runners: Vec<Runner>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<String>,
}
