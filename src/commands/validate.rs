use super::load_graph;
use crate::output::UserOutput;
use devstack::{Orchestrator, ServiceGraph};
use std::path::PathBuf;

/// Merge and compile the configuration without writing or starting
/// anything.
pub fn run_validate(files: Vec<PathBuf>, out: &dyn UserOutput) -> anyhow::Result<()> {
    let (graph, work_dir, files) = match load_graph(&files) {
        Ok(loaded) => loaded,
        Err(e) => {
            out.error("Configuration failed to load");
            return Err(e);
        }
    };
    for file in &files {
        out.status(&format!("Validating {}...", file.display()));
    }

    let orchestrator = Orchestrator::builder()
        .graph(graph)
        .work_dir(work_dir)
        .build()?;
    let topology = orchestrator.compile()?;

    out.success("Configuration is valid");
    out.blank();
    summarize(orchestrator.graph(), out);
    for (service, failure) in topology.addresses.failures() {
        out.warning(&format!("  ! {}: {}", service, failure));
    }
    Ok(())
}

fn summarize(graph: &ServiceGraph, out: &dyn UserOutput) {
    out.status(&format!("Topology: {}", graph.name));
    out.status(&format!("Services: {}", graph.services.len()));
    for (name, service) in &graph.services {
        let runners: Vec<&str> = service.runners.iter().map(|r| r.type_name()).collect();
        let ingress = service
            .ingress
            .as_ref()
            .map(|i| format!(" @ {}{}", i.host, i.path))
            .unwrap_or_default();
        out.status(&format!("  - {} ({}){}", name, runners.join(", "), ingress));
    }
    if !graph.dependencies.is_empty() {
        let dependencies: Vec<&str> = graph.dependencies.iter().map(|d| d.type_name()).collect();
        out.status(&format!("Dependencies: {}", dependencies.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingOutput;

    #[test]
    fn validates_and_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devstack.yaml");
        std::fs::write(
            &path,
            r#"
name: shop
services:
  web:
    ingress: { host: web.workleap.localhost }
    runners:
      - type: docker
        image: nginx
        containerPort: 80
dependencies:
  - type: redis
"#,
        )
        .unwrap();

        let out = RecordingOutput::default();
        run_validate(vec![path], &out).unwrap();
        let text = out.text();
        assert!(text.contains("Configuration is valid"));
        assert!(text.contains("web (docker) @ web.workleap.localhost/"));
        assert!(text.contains("Dependencies: redis"));
    }

    #[test]
    fn rejects_bad_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devstack.yaml");
        std::fs::write(
            &path,
            r#"
name: shop
services:
  web:
    ingress: { host: web.example.com }
    runners:
      - type: docker
        image: nginx
        containerPort: 80
"#,
        )
        .unwrap();

        assert!(run_validate(vec![path], &RecordingOutput::default()).is_err());
    }
}
