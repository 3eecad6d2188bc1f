use super::{resolve_port, CompileTarget, CompiledEndpoint};
use crate::config::{ContainerRunner, ServiceOrigin};
use crate::error::Result;
use crate::ingress::Backend;
use crate::manifest::{ComposeHealthcheck, ComposeService};
use crate::pipeline::BuildState;

impl ContainerRunner {
    /// Append a compose service publishing `containerPort` on the resolved
    /// host port.
    pub fn compile(&self, target: CompileTarget<'_>, state: &mut BuildState) -> Result<CompiledEndpoint> {
        let host_port = resolve_port(state, target.name, self.host_port)?;

        let mut entry = ComposeService::new(&self.image)
            .publish(host_port, self.container_port)
            .environment(&self.environment);
        entry.command = self.command.clone();
        entry.volumes = self.volumes.clone();
        if let ServiceOrigin::Dependency(dependency) = target.service.origin {
            let test = dependency.blueprint().healthcheck;
            if !test.is_empty() {
                entry.healthcheck = Some(ComposeHealthcheck::new(test));
            }
        }

        for volume in &self.volumes {
            if let Some(name) = named_volume(volume) {
                state.compose.add_volume(name);
            }
        }
        state.compose.add_service(target.name, entry);

        let backend = Backend::local(self.protocol, host_port);
        Ok(match target.service.origin {
            ServiceOrigin::Dependency(dependency) => CompiledEndpoint::Local {
                backend,
                scheme: dependency.blueprint().scheme,
            },
            ServiceOrigin::Declared => CompiledEndpoint::local(backend),
        })
    }
}

/// `data:/var/lib/x` declares the named volume `data`; bind mounts
/// (`./dir:/x`, `/abs:/x`, `~/x:/x`) do not.
fn named_volume(spec: &str) -> Option<&str> {
    let (source, _) = spec.split_once(':')?;
    let is_path = source.is_empty()
        || source.starts_with('.')
        || source.starts_with('/')
        || source.starts_with('~')
        || source.contains('/');
    (!is_path).then_some(source)
}
