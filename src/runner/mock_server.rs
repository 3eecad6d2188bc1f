use super::{resolve_port, CompileTarget, CompiledEndpoint};
use crate::config::{MockServerRunner, Protocol};
use crate::error::Result;
use crate::ingress::Backend;
use crate::manifest::SupervisedProcess;
use crate::pipeline::{BuildState, ExecutionContext};
use crate::tools::ManagedTool;

impl MockServerRunner {
    /// Supervise the mock-server tool serving `specification`.
    pub fn compile(
        &self,
        target: CompileTarget<'_>,
        state: &mut BuildState,
        context: &ExecutionContext,
    ) -> Result<CompiledEndpoint> {
        let port = resolve_port(state, target.name, self.port)?;
        let binary = context.toolchain.mock_server.binary_path();

        let arguments = [
            "mock".to_string(),
            context.resolve_path(&self.specification),
            "--port".to_string(),
            port.to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
        ];
        let process = SupervisedProcess::from_argv(&binary.display().to_string(), &arguments[..])
            .working_dir(context.work_dir.display().to_string())
            .environment(&self.environment);

        state.supervisor.add_process(target.name, process);
        state.requires_mock_server = true;

        Ok(CompiledEndpoint::local(Backend::local(Protocol::Http, port)))
    }
}
