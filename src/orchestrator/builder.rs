use super::Orchestrator;
use crate::config::ServiceGraph;
use crate::error::{Error, Result};
use crate::healthcheck::{HealthCheck, UnprobedServicePolicy, DEFAULT_READINESS_TIMEOUT};
use crate::ingress::DEFAULT_PROXY_PORT;
use crate::paths::DevstackPaths;
use crate::pipeline::{ExecutionContext, Pipeline};
use crate::runner::ExecutionMode;
use crate::tools::{Installer, OutputSink, ToolSettings, Toolchain, DEFAULT_GRACE_PERIOD};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing an `Orchestrator` with a fluent API.
///
/// Only the service graph is required. Everything else has a default:
/// local execution, the current directory, `$DEVSTACK_HOME`, proxy port
/// 1347, a five minute readiness timeout and a 30 second grace period.
///
/// # Example
///
/// ```no_run
/// use devstack::{ExecutionMode, Orchestrator, Parser};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), devstack::Error> {
/// let graph = Parser::new().load_graph(&["devstack.yaml"])?;
/// let orchestrator = Orchestrator::builder()
///     .graph(graph)
///     .mode(ExecutionMode::remote("dev"))
///     .readiness_timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    graph: Option<ServiceGraph>,
    work_dir: Option<PathBuf>,
    mode: ExecutionMode,
    paths: Option<DevstackPaths>,
    proxy_port: u16,
    readiness_timeout: Duration,
    grace_period: Duration,
    unprobed_policy: UnprobedServicePolicy,
    health_checks: Vec<HealthCheck>,
    sink: Option<Arc<dyn OutputSink>>,
    installer: Option<Installer>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            graph: None,
            work_dir: None,
            mode: ExecutionMode::Local,
            paths: None,
            proxy_port: DEFAULT_PROXY_PORT,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            unprobed_policy: UnprobedServicePolicy::default(),
            health_checks: Vec::new(),
            sink: None,
            installer: None,
        }
    }

    /// Set the merged service graph. Required.
    pub fn graph(mut self, graph: ServiceGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Base directory for relative paths in runner declarations.
    ///
    /// If not set, defaults to the current directory.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Root for generated manifests and downloaded tools.
    ///
    /// If not set, resolved from `$DEVSTACK_HOME` or `~/.devstack`.
    pub fn paths(mut self, paths: DevstackPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Port the ingress proxy listens on. `0` picks a free port.
    pub fn proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Time a tool gets between SIGTERM and SIGKILL.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn unprobed_services(mut self, policy: UnprobedServicePolicy) -> Self {
        self.unprobed_policy = policy;
        self
    }

    /// Register a check that must pass before `start` returns.
    pub fn health_check(mut self, check: HealthCheck) -> Self {
        self.health_checks.push(check);
        self
    }

    /// Destination for external tool output. Defaults to `tracing`.
    pub fn output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn installer(mut self, installer: Installer) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if no graph was set or the root directory cannot be
    /// determined.
    pub fn build(self) -> Result<Orchestrator> {
        let graph = self
            .graph
            .ok_or_else(|| Error::Config("service graph is required".to_string()))?;
        let paths = match self.paths {
            Some(paths) => paths,
            None => DevstackPaths::from_env()?,
        };
        let work_dir = match self.work_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let mut settings = ToolSettings::new(paths).grace_period(self.grace_period);
        if let Some(sink) = self.sink {
            settings = settings.sink(sink);
        }
        if let Some(installer) = self.installer {
            settings.installer = installer;
        }

        let context = ExecutionContext {
            mode: self.mode,
            work_dir,
            capabilities: BTreeSet::new(),
            toolchain: Arc::new(Toolchain::with_settings(settings)),
            proxy_port: self.proxy_port,
        };

        Ok(Orchestrator {
            graph,
            context,
            pipeline: Pipeline::standard(),
            readiness_timeout: self.readiness_timeout,
            unprobed_policy: self.unprobed_policy,
            health_checks: self.health_checks,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
