use super::{ConfigFragment, ConfigMerger, ServiceGraph};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "devstack.yaml";
/// Accepted alias for [`CONFIG_FILE_NAME`].
pub const CONFIG_FILE_ALIAS: &str = "devstack.yml";

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(config_path);
        }

        let alt_path = dir.join(CONFIG_FILE_ALIAS);
        if alt_path.exists() {
            return Ok(alt_path);
        }

        if let Some(parent) = dir.parent() {
            return Self::find_config_in_dir(parent);
        }

        Err(Error::Config(format!(
            "Could not find {} in current directory or any parent",
            CONFIG_FILE_NAME
        )))
    }

    /// Decode one fragment from YAML bytes.
    pub fn parse_fragment(&self, content: &[u8]) -> Result<ConfigFragment> {
        serde_yaml::from_slice(content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))
    }

    /// Load one fragment from a file path.
    pub fn load_fragment<P: AsRef<Path>>(&self, path: P) -> Result<ConfigFragment> {
        let content = fs::read(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_fragment(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.as_ref().display(), msg)),
            other => other,
        })
    }

    /// Load and merge several files, in order.
    pub fn load_graph<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ServiceGraph> {
        let fragments = paths
            .iter()
            .map(|path| self.load_fragment(path))
            .collect::<Result<Vec<_>>>()?;
        ConfigMerger::merge(fragments)
    }

    /// Decode and merge in-memory documents, in order.
    pub fn parse_graph<B: AsRef<[u8]>>(&self, documents: &[B]) -> Result<ServiceGraph> {
        let fragments = documents
            .iter()
            .map(|doc| self.parse_fragment(doc.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        ConfigMerger::merge(fragments)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_config() {
        let yaml = r#"
name: sample
services:
  app:
    ingress:
      host: app.workleap.localhost
    runners:
      - type: docker
        image: nginx:latest
        containerPort: 80
dependencies:
  - type: mongo
"#;

        let parser = Parser::new();
        let graph = parser.parse_graph(&[yaml]).unwrap();

        assert_eq!(graph.name, "sample");
        assert_eq!(graph.services.len(), 1);
        assert_eq!(graph.dependencies.len(), 1);
    }

    #[test]
    fn test_unknown_runner_type_is_config_error() {
        let yaml = "name: x\nservices:\n  a:\n    runners:\n      - type: helm\n";
        let err = Parser::new().parse_graph(&[yaml]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_finds_alias_in_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE_ALIAS), "name: x\n").unwrap();

        let found = Parser::find_config_in_dir(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_ALIAS));
    }

    #[test]
    fn test_prefers_primary_name_over_alias() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "name: x\n").unwrap();
        fs::write(dir.path().join(CONFIG_FILE_ALIAS), "name: y\n").unwrap();

        let found = Parser::find_config_in_dir(dir.path()).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_error_mentions_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "name: [unterminated\n").unwrap();

        let err = Parser::new().load_fragment(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
