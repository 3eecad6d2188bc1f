//! Core configuration types.
//!
//! This module contains the per-file [`ConfigFragment`] and the merged
//! [`ServiceGraph`] the pipeline compiles.

use super::{Dependency, Service, ServiceFragment};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Root structure of one `devstack.yaml` file.
///
/// Every field is optional so that several files can each contribute a part
/// of the graph. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub services: IndexMap<String, ServiceFragment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

/// The merged, validated graph for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGraph {
    pub name: String,

    /// Services in first-declared order.
    #[serde(default)]
    pub services: IndexMap<String, Service>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl ServiceGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: IndexMap::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_service(mut self, name: impl Into<String>, service: Service) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }
}
