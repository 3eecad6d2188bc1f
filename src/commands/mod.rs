mod run;
mod validate;

pub use run::{run_topology, RunOptions};
pub use validate::run_validate;

use devstack::{Parser as ConfigParser, ServiceGraph};
use std::path::{Path, PathBuf};

/// Merge the given files, or the discovered `devstack.yaml` when none are
/// given. Relative runner paths resolve against the first file's directory.
pub(crate) fn load_graph(files: &[PathBuf]) -> anyhow::Result<(ServiceGraph, PathBuf, Vec<PathBuf>)> {
    let parser = ConfigParser::new();
    let files = if files.is_empty() {
        vec![parser.find_config_file()?]
    } else {
        files.to_vec()
    };
    let graph = parser.load_graph(&files)?;
    let work_dir = config_dir(&files[0])?;
    Ok((graph, work_dir, files))
}

fn config_dir(config_path: &Path) -> anyhow::Result<PathBuf> {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Ok(std::env::current_dir()?),
    }
}
