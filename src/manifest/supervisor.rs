//! Process-supervisor manifest (process-compose format).

use crate::config::EnvironmentOverlay;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorManifest {
    pub version: String,
    pub is_strict: bool,
    pub log_level: String,
    pub log_configuration: LogConfiguration,
    #[serde(default)]
    pub processes: IndexMap<String, SupervisedProcess>,
}

/// Output settings: no ANSI colours, JSON lines, flushed per line, so the
/// captured output can be re-emitted through our own logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    pub no_color: bool,
    pub flush_each_line: bool,
    pub disable_json: bool,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            no_color: true,
            flush_each_line: true,
            disable_json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisedProcess {
    /// Shell command line.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// `KEY=value` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub restart: String,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            restart: "on_failure".to_string(),
        }
    }
}

impl SupervisedProcess {
    /// Build an entry from a program and its arguments, quoting each part.
    pub fn from_argv<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        let mut command = shell_quote(program).into_owned();
        for arg in args {
            command.push(' ');
            command.push_str(&shell_quote(arg.as_ref()));
        }
        Self {
            command,
            working_dir: None,
            environment: Vec::new(),
            availability: Availability::default(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn environment(mut self, overlay: &EnvironmentOverlay) -> Self {
        self.environment = overlay
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        self
    }
}

fn shell_quote(s: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(s))
}

/// Accumulates supervised processes during compilation.
#[derive(Debug, Clone, Default)]
pub struct SupervisorManifestBuilder {
    processes: IndexMap<String, SupervisedProcess>,
}

impl SupervisorManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `name`.
    pub fn add_process(&mut self, name: impl Into<String>, process: SupervisedProcess) {
        self.processes.insert(name.into(), process);
    }

    pub fn process(&self, name: &str) -> Option<&SupervisedProcess> {
        self.processes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn build(&self) -> SupervisorManifest {
        SupervisorManifest {
            version: "0.5".to_string(),
            is_strict: true,
            log_level: "info".to_string(),
            log_configuration: LogConfiguration::default(),
            processes: self.processes.clone(),
        }
    }
}
