use super::hostname::validate_ingress_host;
use super::{
    ConfigFragment, Dependency, Ingress, IngressFragment, Runner, Service, ServiceFragment,
    ServiceGraph, ServiceOrigin, DEFAULT_INGRESS_PATH,
};
use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Merges configuration fragments into a single [`ServiceGraph`].
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge fragments in order. Later fragments win per scalar field;
    /// collections are unioned.
    pub fn merge(fragments: impl IntoIterator<Item = ConfigFragment>) -> Result<ServiceGraph> {
        let mut name: Option<String> = None;
        let mut services: IndexMap<String, ServiceFragment> = IndexMap::new();
        let mut dependencies: Vec<Dependency> = Vec::new();

        for fragment in fragments {
            if let Some(fragment_name) = fragment.name {
                if !fragment_name.trim().is_empty() {
                    name = Some(fragment_name);
                }
            }

            for (service_name, incoming) in fragment.services {
                match services.get_mut(&service_name) {
                    Some(existing) => Self::merge_service(existing, incoming),
                    None => {
                        let mut fresh = ServiceFragment::default();
                        Self::merge_service(&mut fresh, incoming);
                        services.insert(service_name, fresh);
                    }
                }
            }

            Self::merge_dependencies(&mut dependencies, fragment.dependencies);
        }

        let name = name.ok_or_else(|| {
            Error::Config("No configuration file defines a non-empty 'name'".to_string())
        })?;

        let mut graph = ServiceGraph::new(name);
        graph.dependencies = dependencies;
        for (service_name, fragment) in services {
            let service = Self::finish_service(&service_name, fragment)?;
            graph.services.insert(service_name, service);
        }

        Ok(graph)
    }

    /// Merge `incoming` on top of `local`.
    fn merge_service(local: &mut ServiceFragment, incoming: ServiceFragment) {
        if let Some(ingress) = incoming.ingress {
            Self::merge_ingress(local.ingress.get_or_insert_with(Default::default), ingress);
        }
        if incoming.healthcheck.is_some() {
            local.healthcheck = incoming.healthcheck;
        }
        Self::merge_runners(&mut local.runners, incoming.runners);
    }

    fn merge_ingress(local: &mut IngressFragment, incoming: IngressFragment) {
        if incoming.host.is_some() {
            local.host = incoming.host;
        }
        if incoming.path.is_some() {
            local.path = incoming.path;
        }
    }

    /// Union runners in declaration order. A re-declared runner is merged
    /// into the existing one instead of being appended.
    fn merge_runners(local: &mut Vec<Runner>, incoming: Vec<Runner>) {
        for runner in incoming {
            match local.iter_mut().find(|existing| existing.same_target(&runner)) {
                Some(existing) => existing.absorb(runner),
                None => local.push(runner),
            }
        }
    }

    fn merge_dependencies(local: &mut Vec<Dependency>, incoming: Vec<Dependency>) {
        for dependency in incoming {
            if !local.contains(&dependency) {
                local.push(dependency);
            }
        }
    }

    fn finish_service(name: &str, fragment: ServiceFragment) -> Result<Service> {
        if fragment.runners.is_empty() {
            return Err(Error::Config(format!(
                "Service '{}' declares no runners. Add at least one of: docker, dotnet, executable, remote, openapi",
                name
            )));
        }

        let ingress = match fragment.ingress {
            None => None,
            Some(IngressFragment { host: None, .. }) => {
                return Err(Error::Config(format!(
                    "Service '{}' declares an ingress without a host",
                    name
                )))
            }
            Some(IngressFragment {
                host: Some(host),
                path,
            }) => {
                validate_ingress_host(name, &host)?;
                let path = path.unwrap_or_else(|| DEFAULT_INGRESS_PATH.to_string());
                if !path.starts_with('/') {
                    return Err(Error::Config(format!(
                        "Service '{}' ingress path '{}' must start with '/'",
                        name, path
                    )));
                }
                Some(Ingress { host, path })
            }
        };

        if let Some(ref check) = fragment.healthcheck {
            if !check.starts_with('/') {
                return Err(Error::Config(format!(
                    "Service '{}' healthcheck '{}' must be a path starting with '/'",
                    name, check
                )));
            }
        }

        Ok(Service {
            ingress,
            runners: fragment.runners,
            healthcheck: fragment.healthcheck,
            origin: ServiceOrigin::Declared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerRunner, Protocol, RemoteRunner};
    use std::collections::BTreeMap;

    fn fragment(yaml: &str) -> ConfigFragment {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn docker(image: &str) -> Runner {
        Runner::Docker(ContainerRunner {
            image: image.to_string(),
            container_port: 80,
            host_port: None,
            protocol: Protocol::Http,
            environment: Default::default(),
            volumes: vec![],
            command: vec![],
        })
    }

    #[test]
    fn test_merge_requires_name() {
        let result = ConfigMerger::merge([fragment("services: {}\n")]);
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ConfigMerger::merge([fragment("name: '  '\n")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_last_name_wins() {
        let graph =
            ConfigMerger::merge([fragment("name: first\n"), fragment("name: second\n")]).unwrap();
        assert_eq!(graph.name, "second");

        let graph = ConfigMerger::merge([fragment("name: first\n"), fragment("services: {}\n")])
            .unwrap();
        assert_eq!(graph.name, "first");
    }

    #[test]
    fn test_merge_runners_unions_without_duplicates() {
        let mut local = vec![docker("a"), docker("b")];
        ConfigMerger::merge_runners(&mut local, vec![docker("b"), docker("c")]);
        assert_eq!(local, vec![docker("a"), docker("b"), docker("c")]);
    }

    #[test]
    fn test_merge_ingress_per_field() {
        let mut local = IngressFragment {
            host: Some("app.workleap.localhost".to_string()),
            path: Some("/api".to_string()),
        };
        ConfigMerger::merge_ingress(
            &mut local,
            IngressFragment {
                host: None,
                path: Some("/v2".to_string()),
            },
        );
        assert_eq!(local.host.as_deref(), Some("app.workleap.localhost"));
        assert_eq!(local.path.as_deref(), Some("/v2"));
    }

    #[test]
    fn test_rejects_service_without_runners() {
        let result = ConfigMerger::merge([fragment("name: x\nservices:\n  api: {}\n")]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("'api'"));
    }

    #[test]
    fn test_rejects_bad_ingress_host() {
        let yaml = r#"
name: x
services:
  api:
    ingress: { host: api.example.com }
    runners:
      - type: remote
"#;
        let err = ConfigMerger::merge([fragment(yaml)]).unwrap_err();
        assert!(err.to_string().contains("api.example.com"));
    }

    #[test]
    fn test_ingress_path_defaults_to_root() {
        let yaml = r#"
name: x
services:
  api:
    ingress: { host: api.workleap.localhost }
    runners:
      - type: remote
        environments: { dev: "https://api.dev" }
"#;
        let graph = ConfigMerger::merge([fragment(yaml)]).unwrap();
        let ingress = graph.services["api"].ingress.as_ref().unwrap();
        assert_eq!(ingress.path, "/");
        assert_eq!(
            graph.services["api"].runners,
            vec![Runner::Remote(RemoteRunner {
                environments: BTreeMap::from([("dev".to_string(), "https://api.dev".to_string())])
            })]
        );
    }

    #[test]
    fn test_dependencies_union_by_type() {
        let graph = ConfigMerger::merge([
            fragment("name: x\ndependencies:\n  - type: mongo\n"),
            fragment("dependencies:\n  - type: mongo\n  - type: redis\n"),
        ])
        .unwrap();
        assert_eq!(graph.dependencies, vec![Dependency::Mongo, Dependency::Redis]);
    }
}
