//! Container-compose manifest (`docker-compose.yml`).

use crate::config::EnvironmentOverlay;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Compose project name shared by every run.
pub const COMPOSE_PROJECT: &str = "devstack";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeManifest {
    pub name: String,
    #[serde(default)]
    pub services: IndexMap<String, ComposeService>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub volumes: IndexMap<String, ComposeVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthcheck>,
}

/// Container-level health check run by the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeHealthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

impl ComposeHealthcheck {
    pub fn new(test: &[&str]) -> Self {
        Self {
            test: test.iter().map(|s| s.to_string()).collect(),
            interval: "5s".to_string(),
            timeout: "10s".to_string(),
            retries: 30,
            start_period: "10s".to_string(),
        }
    }
}

impl ComposeService {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ports: Vec::new(),
            environment: IndexMap::new(),
            volumes: Vec::new(),
            command: Vec::new(),
            // Lets containers reach services running on the workstation.
            extra_hosts: vec!["host.docker.internal:host-gateway".to_string()],
            healthcheck: None,
        }
    }

    /// Publish `container_port` on the loopback interface only.
    pub fn publish(mut self, host_port: u16, container_port: u16) -> Self {
        self.ports
            .push(format!("127.0.0.1:{}:{}", host_port, container_port));
        self
    }

    pub fn environment(mut self, overlay: &EnvironmentOverlay) -> Self {
        for (key, value) in overlay.iter() {
            self.environment.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Named volume declaration. Serialised as an empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeVolume {}

/// Accumulates compose services during compilation.
#[derive(Debug, Clone, Default)]
pub struct ComposeManifestBuilder {
    services: IndexMap<String, ComposeService>,
    volumes: IndexMap<String, ComposeVolume>,
}

impl ComposeManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `name`.
    pub fn add_service(&mut self, name: impl Into<String>, service: ComposeService) {
        self.services.insert(name.into(), service);
    }

    pub fn add_volume(&mut self, name: impl Into<String>) {
        self.volumes.entry(name.into()).or_default();
    }

    pub fn service(&self, name: &str) -> Option<&ComposeService> {
        self.services.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn build(&self) -> ComposeManifest {
        ComposeManifest {
            name: COMPOSE_PROJECT.to_string(),
            services: self.services.clone(),
            volumes: self.volumes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_compose_layout() {
        let mut builder = ComposeManifestBuilder::new();
        let env: EnvironmentOverlay = [("MODE", "dev")].into_iter().collect();
        builder.add_service("web", ComposeService::new("nginx").publish(8080, 80).environment(&env));
        builder.add_volume("data");
        builder.add_volume("data");

        let yaml = serde_yaml::to_string(&builder.build()).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["name"], "devstack");
        assert_eq!(value["services"]["web"]["image"], "nginx");
        assert_eq!(value["services"]["web"]["ports"][0], "127.0.0.1:8080:80");
        assert_eq!(value["services"]["web"]["environment"]["MODE"], "dev");
        assert!(value["volumes"]["data"].is_mapping());
        assert!(value["services"]["web"].get("healthcheck").is_none());
    }

    #[test]
    fn serializes_healthcheck() {
        let mut service = ComposeService::new("redis");
        service.healthcheck = Some(ComposeHealthcheck::new(&["CMD", "redis-cli", "ping"]));
        let value = serde_yaml::to_value(&service).unwrap();

        assert_eq!(value["healthcheck"]["test"][0], "CMD");
        assert_eq!(value["healthcheck"]["test"][2], "ping");
        assert_eq!(value["healthcheck"]["interval"], "5s");
        assert_eq!(value["healthcheck"]["start_period"], "10s");
    }

    #[test]
    fn add_service_replaces_existing_entry() {
        let mut builder = ComposeManifestBuilder::new();
        builder.add_service("db", ComposeService::new("mongo:6"));
        builder.add_service("db", ComposeService::new("mongo:7"));
        assert_eq!(builder.len(), 1);
        assert_eq!(builder.service("db").unwrap().image, "mongo:7");
    }
}
