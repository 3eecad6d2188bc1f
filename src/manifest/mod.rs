//! Manifests handed to the external tools.
//!
//! Builders accumulate entries during compilation; [`Manifests::render`]
//! serialises both documents before anything is written, so a serialisation
//! failure never leaves one manifest updated and the other stale.

mod compose;
mod supervisor;

pub use compose::*;
pub use supervisor::*;

use crate::error::Result;

/// Both manifests, finalised and serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifests {
    pub compose: ComposeManifest,
    pub supervisor: SupervisorManifest,
    pub compose_yaml: String,
    pub supervisor_yaml: String,
}

impl Manifests {
    pub fn render(
        compose: &ComposeManifestBuilder,
        supervisor: &SupervisorManifestBuilder,
    ) -> Result<Self> {
        let compose = compose.build();
        let supervisor = supervisor.build();
        let compose_yaml = serde_yaml::to_string(&compose)?;
        let supervisor_yaml = serde_yaml::to_string(&supervisor)?;
        Ok(Self {
            compose,
            supervisor,
            compose_yaml,
            supervisor_yaml,
        })
    }

    pub fn has_containers(&self) -> bool {
        !self.compose.services.is_empty()
    }

    pub fn has_processes(&self) -> bool {
        !self.supervisor.processes.is_empty()
    }
}
