//! On-disk layout under the per-user root directory.
//!
//! ```text
//! <root>/generated/docker-compose.yml
//! <root>/generated/process-compose.yml
//! <root>/tools/<tool>/<version>/<binary>
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Overrides the root directory when set.
pub const HOME_ENV_VAR: &str = "DEVSTACK_HOME";

const ROOT_DIR_NAME: &str = ".devstack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevstackPaths {
    root: PathBuf,
}

impl DevstackPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$DEVSTACK_HOME`, falling back to `~/.devstack`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            Error::Config(format!(
                "Could not determine the home directory; set {}",
                HOME_ENV_VAR
            ))
        })?;
        Ok(Self::new(home.join(ROOT_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generated")
    }

    pub fn compose_manifest(&self) -> PathBuf {
        self.generated_dir().join("docker-compose.yml")
    }

    pub fn supervisor_manifest(&self) -> PathBuf {
        self.generated_dir().join("process-compose.yml")
    }

    pub fn tool_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.root.join("tools").join(tool).join(version)
    }
}
