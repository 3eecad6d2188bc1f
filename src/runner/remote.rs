use super::ExecutionMode;
use crate::config::RemoteRunner;
use crate::error::{Error, Result};

impl RemoteRunner {
    /// URL of the deployed instance for the active environment.
    ///
    /// Remote runners never resolve locally; in a named environment the
    /// mapping must exist.
    pub fn resolve_address(&self, service: &str, mode: &ExecutionMode) -> Result<String> {
        match mode {
            ExecutionMode::Local => Err(Error::UnsupportedInExecutionMode {
                service: service.to_string(),
                mode: mode.to_string(),
            }),
            ExecutionMode::Remote(environment) => self
                .environments
                .get(environment)
                .map(|url| url.trim_end_matches('/').to_string())
                .ok_or_else(|| Error::MissingEnvironmentMapping {
                    service: service.to_string(),
                    environment: environment.clone(),
                }),
        }
    }
}
