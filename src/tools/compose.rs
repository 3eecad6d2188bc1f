use super::{
    ArtifactKind, Arch, ManagedTool, Os, Platform, ToolProcess, ToolRelease, ToolSettings,
    StagedManifest, WrittenManifest,
};
use crate::error::Result;
use crate::manifest::COMPOSE_PROJECT;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const COMPOSE_VERSION: &str = "2.29.7";

const TOOL_NAME: &str = "docker-compose";

/// Upper bound for the best-effort `down` after a stop.
const DOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives the standalone docker-compose binary.
#[derive(Debug, Clone)]
pub struct ComposeDriver {
    settings: ToolSettings,
}

impl ComposeDriver {
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }

    pub fn write_manifest(&self, yaml: &str) -> Result<WrittenManifest> {
        WrittenManifest::write(TOOL_NAME, self.settings.paths.compose_manifest(), yaml)
    }

    pub fn stage_manifest(&self, yaml: &str) -> Result<StagedManifest> {
        StagedManifest::stage(TOOL_NAME, self.settings.paths.compose_manifest(), yaml)
    }

    /// Run `up` in the foreground until cancelled, then tear the project
    /// down.
    pub async fn start(&self, manifest: &WrittenManifest, cancel: CancellationToken) -> Result<()> {
        let path = manifest.ensure_present()?.to_path_buf();
        let binary = self.binary_path();

        let result = self
            .process(&binary, &path, &["up", "--remove-orphans"])
            .run(cancel.clone())
            .await;

        if cancel.is_cancelled() {
            self.down(&binary, &path).await;
        }
        result
    }

    async fn down(&self, binary: &Path, manifest: &Path) {
        let down = self.process(binary, manifest, &["down"]).run(CancellationToken::new());
        match tokio::time::timeout(DOWN_TIMEOUT, down).await {
            Ok(Ok(())) => tracing::debug!("Compose project '{}' removed", COMPOSE_PROJECT),
            Ok(Err(e)) => tracing::warn!("Failed to remove compose project: {}", e),
            Err(_) => tracing::warn!("Timed out removing compose project '{}'", COMPOSE_PROJECT),
        }
    }

    fn process(&self, binary: &Path, manifest: &Path, command: &[&str]) -> ToolProcess {
        ToolProcess::new(TOOL_NAME, binary, self.settings.sink.clone())
            .args(["-p", COMPOSE_PROJECT, "-f"])
            .arg(manifest.display().to_string())
            .args(command.iter().copied())
            .grace_period(self.settings.grace_period)
    }
}

#[async_trait]
impl ManagedTool for ComposeDriver {
    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn version(&self) -> &'static str {
        COMPOSE_VERSION
    }

    fn binary_name(&self) -> &'static str {
        "docker-compose"
    }

    fn release(&self, platform: Platform) -> ToolRelease {
        let os = match platform.os {
            Os::Linux => "linux",
            Os::MacOs => "darwin",
        };
        let arch = match platform.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        };
        ToolRelease {
            tool: TOOL_NAME,
            version: COMPOSE_VERSION,
            url: format!(
                "https://github.com/docker/compose/releases/download/v{}/docker-compose-{}-{}",
                COMPOSE_VERSION, os, arch
            ),
            artifact: ArtifactKind::Binary,
        }
    }
}
