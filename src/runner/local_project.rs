//! Processes started on the workstation under the process supervisor.

use super::{resolve_port, CompileTarget, CompiledEndpoint};
use crate::config::{DotnetRunner, EnvironmentOverlay, ExecutableRunner, Protocol};
use crate::error::Result;
use crate::ingress::Backend;
use crate::manifest::SupervisedProcess;
use crate::pipeline::{BuildState, ExecutionContext};

/// What the supervisor launches for one local service.
struct LocalLaunch<'a> {
    program: String,
    arguments: Vec<String>,
    port: Option<u16>,
    protocol: Protocol,
    working_directory: Option<&'a str>,
    environment: &'a EnvironmentOverlay,
}

impl DotnetRunner {
    pub fn compile(
        &self,
        target: CompileTarget<'_>,
        state: &mut BuildState,
        context: &ExecutionContext,
    ) -> Result<CompiledEndpoint> {
        let project = context.resolve_path(&self.project);
        compile_local(
            target,
            state,
            context,
            LocalLaunch {
                program: "dotnet".to_string(),
                arguments: vec![
                    "run".to_string(),
                    "--project".to_string(),
                    project,
                    "--no-launch-profile".to_string(),
                ],
                port: self.port,
                protocol: self.protocol,
                working_directory: self.working_directory.as_deref(),
                environment: &self.environment,
            },
        )
    }
}

impl ExecutableRunner {
    pub fn compile(
        &self,
        target: CompileTarget<'_>,
        state: &mut BuildState,
        context: &ExecutionContext,
    ) -> Result<CompiledEndpoint> {
        // Bare names are looked up on PATH; anything with a separator is a path.
        let program = if self.command.contains('/') {
            context.resolve_path(&self.command)
        } else {
            self.command.clone()
        };
        compile_local(
            target,
            state,
            context,
            LocalLaunch {
                program,
                arguments: self.arguments.clone(),
                port: self.port,
                protocol: self.protocol,
                working_directory: self.working_directory.as_deref(),
                environment: &self.environment,
            },
        )
    }
}

fn compile_local(
    target: CompileTarget<'_>,
    state: &mut BuildState,
    context: &ExecutionContext,
    launch: LocalLaunch<'_>,
) -> Result<CompiledEndpoint> {
    let port = resolve_port(state, target.name, launch.port)?;
    let backend = Backend::local(launch.protocol, port);

    let mut environment = launch.environment.clone();
    environment.insert_default("PORT", port.to_string());
    environment.insert_default("ASPNETCORE_URLS", backend.base_url());

    let working_dir = match launch.working_directory {
        Some(dir) => context.resolve_path(dir),
        None => context.work_dir.display().to_string(),
    };

    let process = SupervisedProcess::from_argv(&launch.program, launch.arguments.as_slice())
        .working_dir(working_dir)
        .environment(&environment);
    state.supervisor.add_process(target.name, process);

    Ok(CompiledEndpoint::local(backend))
}
