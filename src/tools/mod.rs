//! Managers for the third-party binaries a run drives.
//!
//! Each tool is pinned to one version and installed under
//! `<root>/tools/<tool>/<version>/`. The container-compose driver and the
//! process supervisor consume a manifest written by the pipeline; the
//! mock server is launched by the supervisor.

mod compose;
mod installer;
mod mock_server;
mod process;
mod supervisor;

pub use compose::{ComposeDriver, COMPOSE_VERSION};
pub use installer::Installer;
pub use mock_server::{MockServerTool, MOCK_SERVER_VERSION};
pub use process::{OutputSink, OutputStream, RecordingSink, ToolProcess, TracingSink};
pub use supervisor::{ProcessSupervisor, SUPERVISOR_VERSION};

use crate::error::{Error, Result};
use crate::manifest::Manifests;
use crate::paths::DevstackPaths;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default time a tool gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// The OS/architecture pair a release artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn current() -> Result<Self> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_parts(os_name: &str, arch_name: &str) -> Result<Self> {
        let os = match os_name {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            _ => return Err(unsupported(os_name, arch_name)),
        };
        let arch = match arch_name {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => return Err(unsupported(os_name, arch_name)),
        };
        Ok(Self { os, arch })
    }
}

fn unsupported(os: &str, arch: &str) -> Error {
    Error::ToolAcquisition {
        tool: "toolchain".to_string(),
        reason: format!("no prebuilt tools for {}/{}", os, arch),
    }
}

/// How a release is packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The download is the executable itself.
    Binary,
    /// A gzipped tarball containing the executable as `member`.
    TarGz { member: String },
}

/// A downloadable, version-pinned build of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRelease {
    pub tool: &'static str,
    pub version: &'static str,
    pub url: String,
    pub artifact: ArtifactKind,
}

/// Settings shared by every tool manager.
#[derive(Clone)]
pub struct ToolSettings {
    pub paths: DevstackPaths,
    pub grace_period: Duration,
    pub sink: Arc<dyn OutputSink>,
    pub installer: Installer,
}

impl ToolSettings {
    pub fn new(paths: DevstackPaths) -> Self {
        Self {
            paths,
            grace_period: DEFAULT_GRACE_PERIOD,
            sink: Arc::new(TracingSink),
            installer: Installer::new(),
        }
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl fmt::Debug for ToolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSettings")
            .field("paths", &self.paths)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

/// A pinned third-party binary installed on demand.
#[async_trait]
pub trait ManagedTool: Send + Sync {
    fn settings(&self) -> &ToolSettings;

    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// File name of the installed executable.
    fn binary_name(&self) -> &'static str;

    fn release(&self, platform: Platform) -> ToolRelease;

    fn binary_path(&self) -> PathBuf {
        self.settings()
            .paths
            .tool_dir(self.name(), self.version())
            .join(self.binary_name())
    }

    /// Download and install the binary unless it is already present.
    async fn ensure_executable_exists(&self) -> Result<PathBuf> {
        let destination = self.binary_path();
        if Installer::is_installed(&destination) {
            tracing::debug!("{} {} already installed", self.name(), self.version());
            return Ok(destination);
        }
        let release = self.release(Platform::current()?);
        self.settings()
            .installer
            .install(&release, &destination)
            .await?;
        Ok(destination)
    }
}

/// Proof that a manifest was written during this run.
///
/// Only a committed write creates one, so a manager can never be
/// started against a file left over from an earlier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    tool: &'static str,
    path: PathBuf,
}

impl WrittenManifest {
    /// Fully overwrite `path` with `contents`.
    pub fn write(tool: &'static str, path: PathBuf, contents: &str) -> Result<Self> {
        StagedManifest::stage(tool, path, contents)?.commit()
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails if the file vanished since it was written.
    pub fn ensure_present(&self) -> Result<&Path> {
        if self.path.is_file() {
            Ok(&self.path)
        } else {
            Err(Error::ManifestMissing {
                tool: self.tool.to_string(),
                path: self.path.display().to_string(),
            })
        }
    }
}

/// A manifest written next to its destination but not yet published.
#[derive(Debug)]
pub struct StagedManifest {
    tool: &'static str,
    path: PathBuf,
    staging: PathBuf,
}

impl StagedManifest {
    pub fn stage(tool: &'static str, path: PathBuf, contents: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("yml.tmp");
        if let Err(e) = std::fs::write(&staging, contents) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(Self {
            tool,
            path,
            staging,
        })
    }

    /// Replace the destination with the staged file.
    pub fn commit(self) -> Result<WrittenManifest> {
        std::fs::rename(&self.staging, &self.path)?;
        tracing::debug!("Wrote {} manifest to {}", self.tool, self.path.display());
        Ok(WrittenManifest {
            tool: self.tool,
            path: self.path,
        })
    }

    pub fn discard(self) {
        if let Err(e) = std::fs::remove_file(&self.staging) {
            tracing::debug!("Could not remove {}: {}", self.staging.display(), e);
        }
    }
}

/// Manifests persisted for one run. A manager whose manifest has no entries
/// gets no token and is not started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenManifests {
    pub compose: Option<WrittenManifest>,
    pub supervisor: Option<WrittenManifest>,
}

/// Every tool manager for one run.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compose: ComposeDriver,
    pub supervisor: ProcessSupervisor,
    pub mock_server: MockServerTool,
}

impl Toolchain {
    pub fn new(paths: DevstackPaths) -> Self {
        Self::with_settings(ToolSettings::new(paths))
    }

    pub fn with_settings(settings: ToolSettings) -> Self {
        Self {
            compose: ComposeDriver::new(settings.clone()),
            supervisor: ProcessSupervisor::new(settings.clone()),
            mock_server: MockServerTool::new(settings),
        }
    }

    /// Overwrite both manifest files.
    ///
    /// Both files are staged before either destination is replaced, so a
    /// failed write leaves both previous manifests untouched.
    pub fn write_manifests(&self, manifests: &Manifests) -> Result<WrittenManifests> {
        let compose = self.compose.stage_manifest(&manifests.compose_yaml)?;
        let supervisor = match self.supervisor.stage_manifest(&manifests.supervisor_yaml) {
            Ok(staged) => staged,
            Err(e) => {
                compose.discard();
                return Err(e);
            }
        };
        let compose = compose.commit()?;
        let supervisor = supervisor.commit()?;
        Ok(WrittenManifests {
            compose: manifests.has_containers().then_some(compose),
            supervisor: manifests.has_processes().then_some(supervisor),
        })
    }
}
