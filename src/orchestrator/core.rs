use super::{OrchestratorBuilder, RunningTopology};
use crate::config::ServiceGraph;
use crate::error::{Error, Result};
use crate::healthcheck::{
    declared_checks, implicit_checks, HealthCheck, ReadinessGate, UnprobedServicePolicy,
};
use crate::ingress::IngressProxy;
use crate::pipeline::{Capability, CompiledTopology, ExecutionContext, Pipeline};
use crate::runner::ExecutionMode;
use crate::tools::{ManagedTool, WrittenManifests};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives one topology from compilation to a running, healthy state.
///
/// # Lifecycle
///
/// 1. **Compile**: run the pipeline and write both manifests
/// 2. **Acquire**: install any missing tool binaries, concurrently
/// 3. **Launch**: bind the proxy, release reserved ports, start the tools
/// 4. **Gate**: wait for every health check, or tear everything down
///
/// Configuration and compilation errors surface before any subprocess
/// exists.
pub struct Orchestrator {
    pub(super) graph: ServiceGraph,
    pub(super) context: ExecutionContext,
    pub(super) pipeline: Pipeline,
    pub(super) readiness_timeout: Duration,
    pub(super) unprobed_policy: UnprobedServicePolicy,
    pub(super) health_checks: Vec<HealthCheck>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.context.mode
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn health_checks(&self) -> &[HealthCheck] {
        &self.health_checks
    }

    /// Register a check that must pass before `start` returns.
    pub fn add_health_check(&mut self, check: HealthCheck) {
        self.health_checks.push(check);
    }

    /// Compile without writing anything to disk.
    pub fn compile(&self) -> Result<CompiledTopology> {
        let context = self
            .context
            .clone()
            .without_capability(Capability::PersistManifests);
        self.compile_with(&context)
    }

    fn compile_with(&self, context: &ExecutionContext) -> Result<CompiledTopology> {
        let state = self.pipeline.run(&self.graph, context)?;
        CompiledTopology::from_state(state, &self.graph, context)
    }

    /// Compile, launch and wait until the topology is healthy.
    ///
    /// Cancelling `cancel` during startup aborts it; after `start` returns,
    /// cancelling it stops the running topology.
    ///
    /// # Errors
    ///
    /// Any failure after the first subprocess was launched shuts the
    /// started parts down before the error is returned.
    #[tracing::instrument(skip_all, fields(topology = %self.graph.name, mode = %self.context.mode))]
    pub async fn start(&self, cancel: CancellationToken) -> Result<RunningTopology> {
        let context = self
            .context
            .clone()
            .with_capability(Capability::PersistManifests);
        let mut topology = self.compile_with(&context)?;
        for (service, failure) in topology.addresses.failures() {
            tracing::warn!("Service '{}' will not start: {}", service, failure);
        }

        let written = topology.written.clone().unwrap_or_default();
        let acquire = self.ensure_tools(&written, topology.requires_mock_server);
        until_cancelled(&cancel, "acquiring tools", acquire).await?;

        let proxy = if topology.routes.is_empty() {
            tracing::info!("No ingress routes; proxy not started");
            None
        } else {
            let proxy = IngressProxy::new(Arc::clone(&topology.routes))
                .bind(self.context.proxy_port)
                .await?;
            let addr = proxy.local_addr()?;
            topology.addresses.set_proxy_port(addr.port());
            Some((proxy, addr))
        };

        topology.release_ports();
        let addresses = topology.addresses.clone();
        let mut running = RunningTopology::new(topology, cancel.child_token());
        let session = running.session_token();
        let toolchain = &self.context.toolchain;

        if let Some((proxy, addr)) = proxy {
            running.set_proxy_addr(addr);
            running.spawn("ingress proxy", proxy.serve(session.clone()));
        }
        if let Some(manifest) = written.compose {
            let compose = toolchain.compose.clone();
            let token = session.clone();
            running.spawn(compose.name(), async move { compose.start(&manifest, token).await });
        }
        if let Some(manifest) = written.supervisor {
            let supervisor = toolchain.supervisor.clone();
            let token = session.clone();
            running.spawn(supervisor.name(), async move {
                supervisor.start(&manifest, token).await
            });
        }

        let mut checks = declared_checks(&addresses);
        checks.extend(self.health_checks.iter().cloned());
        let implicit = implicit_checks(self.unprobed_policy, &addresses, &checks);
        checks.extend(implicit);

        let gate = ReadinessGate::new(checks).timeout(self.readiness_timeout);
        tracing::info!("Waiting for {} health check(s)", gate.len());
        if let Err(e) = gate.wait(&addresses, &cancel).await {
            tracing::error!("Startup failed: {}", e);
            if let Err(stop) = running.shutdown().await {
                tracing::debug!("Shutdown after failed startup reported: {}", stop);
            }
            return Err(e);
        }

        for service in addresses.services() {
            if let Ok(url) = addresses.resolve_url(service) {
                tracing::info!("{} → {}", service, url);
            }
        }
        Ok(running)
    }

    /// Install the binaries this run needs.
    async fn ensure_tools(&self, written: &WrittenManifests, mock_server: bool) -> Result<()> {
        let toolchain = &self.context.toolchain;
        tokio::try_join!(
            ensure_if(written.compose.is_some(), &toolchain.compose),
            ensure_if(written.supervisor.is_some(), &toolchain.supervisor),
            ensure_if(mock_server, &toolchain.mock_server),
        )?;
        Ok(())
    }
}

async fn ensure_if(needed: bool, tool: &dyn ManagedTool) -> Result<()> {
    if needed {
        tool.ensure_executable_exists().await?;
    }
    Ok(())
}

async fn until_cancelled<F>(cancel: &CancellationToken, operation: &str, future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
        result = future => result,
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("graph", &self.graph.name)
            .field("mode", &self.context.mode)
            .field("work_dir", &self.context.work_dir)
            .field("proxy_port", &self.context.proxy_port)
            .field("readiness_timeout", &self.readiness_timeout)
            .field("unprobed_policy", &self.unprobed_policy)
            .field("health_checks", &self.health_checks.len())
            .field("pipeline", &self.pipeline.step_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parser;
    use crate::paths::DevstackPaths;

    fn orchestrator(yaml: &str, root: &std::path::Path) -> Orchestrator {
        let graph = Parser::new().parse_graph(&[yaml]).unwrap();
        Orchestrator::builder()
            .graph(graph)
            .work_dir(root)
            .paths(DevstackPaths::new(root.join("home")))
            .proxy_port(0)
            .build()
            .unwrap()
    }

    #[test]
    fn compile_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            r#"
name: app
services:
  web:
    ingress: { host: web.workleap.localhost }
    runners:
      - type: docker
        image: nginx
        containerPort: 80
"#,
            dir.path(),
        );

        let topology = orchestrator.compile().unwrap();
        assert!(topology.written.is_none());
        assert!(!dir.path().join("home/generated").exists());
        assert_eq!(topology.routes.len(), 1);
    }

    #[tokio::test]
    async fn start_with_remote_only_topology_needs_no_tools() {
        let dir = tempfile::tempdir().unwrap();
        let graph = Parser::new()
            .parse_graph(&[r#"
name: app
services:
  api:
    runners:
      - type: remote
        environments: { dev: "https://api.dev.example.com/" }
"#])
            .unwrap();
        let orchestrator = Orchestrator::builder()
            .graph(graph)
            .work_dir(dir.path())
            .paths(DevstackPaths::new(dir.path().join("home")))
            .mode(ExecutionMode::remote("dev"))
            .proxy_port(0)
            .build()
            .unwrap();

        let running = orchestrator.start(CancellationToken::new()).await.unwrap();
        assert_eq!(
            running.addresses().resolve_url("api").unwrap(),
            "https://api.dev.example.com"
        );
        assert!(running.proxy_addr().is_none());
        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_start_stops_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            r#"
name: app
services:
  web:
    runners:
      - type: docker
        image: nginx
        containerPort: 80
"#,
            dir.path(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator.start(cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
