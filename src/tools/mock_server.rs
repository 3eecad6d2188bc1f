use super::{ArtifactKind, ManagedTool, Os, Platform, ToolRelease, ToolSettings};
use async_trait::async_trait;

pub const MOCK_SERVER_VERSION: &str = "5.12.0";

const TOOL_NAME: &str = "prism";

/// The OpenAPI mock server. It has no manifest of its own; the process
/// supervisor launches it once per mock service.
#[derive(Debug, Clone)]
pub struct MockServerTool {
    settings: ToolSettings,
}

impl MockServerTool {
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ManagedTool for MockServerTool {
    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn version(&self) -> &'static str {
        MOCK_SERVER_VERSION
    }

    fn binary_name(&self) -> &'static str {
        "prism"
    }

    fn release(&self, platform: Platform) -> ToolRelease {
        let os = match platform.os {
            Os::Linux => "linux",
            Os::MacOs => "macos",
        };
        ToolRelease {
            tool: TOOL_NAME,
            version: MOCK_SERVER_VERSION,
            url: format!(
                "https://github.com/stoplightio/prism/releases/download/v{}/prism-cli-{}",
                MOCK_SERVER_VERSION, os
            ),
            artifact: ArtifactKind::Binary,
        }
    }
}
