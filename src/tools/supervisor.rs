use super::{
    ArtifactKind, Arch, ManagedTool, Os, Platform, ToolProcess, ToolRelease, ToolSettings,
    StagedManifest, WrittenManifest,
};
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const SUPERVISOR_VERSION: &str = "1.34.0";

const TOOL_NAME: &str = "process-compose";

/// Drives process-compose, which supervises every locally started process.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    settings: ToolSettings,
}

impl ProcessSupervisor {
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }

    pub fn write_manifest(&self, yaml: &str) -> Result<WrittenManifest> {
        WrittenManifest::write(TOOL_NAME, self.settings.paths.supervisor_manifest(), yaml)
    }

    pub fn stage_manifest(&self, yaml: &str) -> Result<StagedManifest> {
        StagedManifest::stage(TOOL_NAME, self.settings.paths.supervisor_manifest(), yaml)
    }

    /// Run headless until cancelled. Stopping the supervisor stops its
    /// processes.
    pub async fn start(&self, manifest: &WrittenManifest, cancel: CancellationToken) -> Result<()> {
        let path = manifest.ensure_present()?;
        ToolProcess::new(TOOL_NAME, self.binary_path(), self.settings.sink.clone())
            .args(["up", "--config"])
            .arg(path.display().to_string())
            .args(["--tui=false", "--no-server"])
            .grace_period(self.settings.grace_period)
            .run(cancel)
            .await
    }
}

#[async_trait]
impl ManagedTool for ProcessSupervisor {
    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn version(&self) -> &'static str {
        SUPERVISOR_VERSION
    }

    fn binary_name(&self) -> &'static str {
        "process-compose"
    }

    fn release(&self, platform: Platform) -> ToolRelease {
        let os = match platform.os {
            Os::Linux => "linux",
            Os::MacOs => "darwin",
        };
        let arch = match platform.arch {
            Arch::X86_64 => "amd64",
            Arch::Aarch64 => "arm64",
        };
        ToolRelease {
            tool: TOOL_NAME,
            version: SUPERVISOR_VERSION,
            url: format!(
                "https://github.com/F1bonacc1/process-compose/releases/download/v{}/process-compose_{}_{}.tar.gz",
                SUPERVISOR_VERSION, os, arch
            ),
            artifact: ArtifactKind::TarGz {
                member: "process-compose".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::paths::DevstackPaths;

    #[test]
    fn release_is_a_tarball() {
        let supervisor = ProcessSupervisor::new(ToolSettings::new(DevstackPaths::new("/r")));
        let release = supervisor.release(Platform {
            os: Os::Linux,
            arch: Arch::X86_64,
        });
        assert!(release.url.ends_with("/v1.34.0/process-compose_linux_amd64.tar.gz"));
        assert!(matches!(release.artifact, ArtifactKind::TarGz { .. }));
    }

    #[tokio::test]
    async fn refuses_to_start_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(ToolSettings::new(DevstackPaths::new(dir.path())));
        let manifest = supervisor.write_manifest("processes: {}\n").unwrap();
        std::fs::remove_file(manifest.path()).unwrap();

        let err = supervisor
            .start(&manifest, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ManifestMissing { .. }));
    }
}
