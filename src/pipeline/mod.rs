//! Topology compilation.
//!
//! A [`Pipeline`] is an ordered list of named [`PipelineStep`]s. Each step
//! takes the [`BuildState`] by value and returns it, so steps are plain
//! functions of their inputs and can be exercised one at a time. Execution
//! stops at the first failure, which is reported with the step's name.
//!
//! The standard pipeline:
//!
//! 1. `expand-dependencies` adds a synthetic service per built-in dependency
//! 2. `validate-ingress` re-checks every ingress host against the policy
//! 3. `compile-runners` compiles each service's active runner
//! 4. `write-manifests` persists both manifests (needs
//!    [`Capability::PersistManifests`])

mod state;
mod steps;
mod topology;

pub use state::BuildState;
pub use steps::{CompileRunners, ExpandDependencies, ValidateIngress, WriteManifests};
pub use topology::{AddressBook, CompiledTopology};
pub(crate) use topology::join_url;

use crate::config::ServiceGraph;
use crate::error::{Error, Result};
use crate::runner::ExecutionMode;
use crate::tools::Toolchain;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Optional behaviour a step may require from its execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Write generated manifests to disk. Absent during a dry run.
    PersistManifests,
}

/// Everything a step may consult besides the graph and the build state.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub mode: ExecutionMode,
    /// Base for relative paths in runner declarations.
    pub work_dir: PathBuf,
    pub capabilities: BTreeSet<Capability>,
    pub toolchain: Arc<Toolchain>,
    pub proxy_port: u16,
}

impl ExecutionContext {
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn without_capability(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    /// Absolute form of `path`, relative paths taken from `work_dir`.
    pub fn resolve_path(&self, path: &str) -> String {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        };
        joined
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect::<PathBuf>()
            .display()
            .to_string()
    }
}

/// One named transformation of the build state.
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// The step is skipped when this capability is missing from the context.
    fn required_capability(&self) -> Option<Capability> {
        None
    }

    fn run(
        &self,
        state: BuildState,
        graph: &ServiceGraph,
        context: &ExecutionContext,
    ) -> Result<BuildState>;
}

pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// The four canonical steps in their required order.
    pub fn standard() -> Self {
        Self::new()
            .with_step(ExpandDependencies)
            .with_step(ValidateIngress)
            .with_step(CompileRunners)
            .with_step(WriteManifests)
    }

    pub fn with_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order against a fresh build state.
    #[tracing::instrument(skip_all, fields(graph = %graph.name, mode = %context.mode))]
    pub fn run(&self, graph: &ServiceGraph, context: &ExecutionContext) -> Result<BuildState> {
        let mut state = BuildState::new(graph);

        for step in &self.steps {
            if let Some(capability) = step.required_capability() {
                if !context.has(capability) {
                    tracing::info!(
                        "Skipping step '{}': capability {:?} not enabled",
                        step.name(),
                        capability
                    );
                    continue;
                }
            }

            tracing::debug!("Running step '{}'", step.name());
            state = step
                .run(state, graph, context)
                .map_err(|e| Error::in_step(step.name(), e))?;
        }

        Ok(state)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::DevstackPaths;
    use parking_lot::Mutex;

    fn context() -> ExecutionContext {
        ExecutionContext {
            mode: ExecutionMode::Local,
            work_dir: PathBuf::from("/work"),
            capabilities: BTreeSet::new(),
            toolchain: Arc::new(Toolchain::new(DevstackPaths::new("/tmp/devstack-test"))),
            proxy_port: 1347,
        }
    }

    struct Recording {
        name: &'static str,
        capability: Option<Capability>,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl PipelineStep for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn required_capability(&self) -> Option<Capability> {
            self.capability
        }

        fn run(&self, state: BuildState, _: &ServiceGraph, _: &ExecutionContext) -> Result<BuildState> {
            self.log.lock().push(self.name);
            if self.fail {
                return Err(Error::Config("boom".to_string()));
            }
            Ok(state)
        }
    }

    fn step(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        capability: Option<Capability>,
        fail: bool,
    ) -> Recording {
        Recording {
            name,
            capability,
            log: Arc::clone(log),
            fail,
        }
    }

    #[test]
    fn runs_steps_in_order_and_skips_gated_ones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with_step(step("one", &log, None, false))
            .with_step(step("gated", &log, Some(Capability::PersistManifests), false))
            .with_step(step("two", &log, None, false));

        pipeline.run(&ServiceGraph::new("app"), &context()).unwrap();
        assert_eq!(*log.lock(), vec!["one", "two"]);

        log.lock().clear();
        let ctx = context().with_capability(Capability::PersistManifests);
        pipeline.run(&ServiceGraph::new("app"), &ctx).unwrap();
        assert_eq!(*log.lock(), vec!["one", "gated", "two"]);
    }

    #[test]
    fn stops_at_first_failure_and_names_the_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with_step(step("one", &log, None, true))
            .with_step(step("two", &log, None, false));

        let err = pipeline.run(&ServiceGraph::new("app"), &context()).unwrap_err();
        assert!(matches!(err, Error::PipelineStep { step: "one", .. }));
        assert!(matches!(err.root_cause(), Error::Config(_)));
        assert_eq!(*log.lock(), vec!["one"]);
    }

    #[test]
    fn standard_pipeline_order() {
        assert_eq!(
            Pipeline::standard().step_names(),
            vec![
                "expand-dependencies",
                "validate-ingress",
                "compile-runners",
                "write-manifests"
            ]
        );
    }

    #[test]
    fn resolves_relative_paths_against_work_dir() {
        let ctx = context();
        assert_eq!(ctx.resolve_path("./src/Api"), "/work/src/Api");
        assert_eq!(ctx.resolve_path("/opt/bin/tool"), "/opt/bin/tool");
    }
}
