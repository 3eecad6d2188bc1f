use super::{ArtifactKind, ToolRelease};
use crate::error::{Error, Result};
use futures::StreamExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Downloads pinned tool releases into their install directories.
///
/// The artifact is written to `<binary>.download` next to the destination
/// and renamed into place only once it is complete and executable; on any
/// failure the partial file is removed before the error surfaces. Failures
/// are not retried.
#[derive(Debug, Clone, Default)]
pub struct Installer {
    client: reqwest::Client,
}

impl Installer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn is_installed(destination: &Path) -> bool {
        destination.is_file()
    }

    #[tracing::instrument(skip_all, fields(tool = release.tool, version = release.version))]
    pub async fn install(&self, release: &ToolRelease, destination: &Path) -> Result<()> {
        let dir = destination.parent().ok_or_else(|| acquisition(release, "invalid install path"))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| acquisition(release, format!("cannot create {}: {}", dir.display(), e)))?;

        let partial = partial_path(destination);
        tracing::info!("Downloading {} {} from {}", release.tool, release.version, release.url);

        if let Err(e) = self.fetch(release, &partial).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", partial.display(), cleanup);
                }
            }
            return Err(match e {
                Error::ToolAcquisition { .. } => e,
                other => acquisition(release, other.to_string()),
            });
        }

        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|e| acquisition(release, format!("cannot move binary into place: {}", e)))?;
        tracing::info!("Installed {} to {}", release.tool, destination.display());
        Ok(())
    }

    async fn fetch(&self, release: &ToolRelease, partial: &Path) -> Result<()> {
        let response = self
            .client
            .get(&release.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| acquisition(release, e.to_string()))?;

        match &release.artifact {
            ArtifactKind::Binary => {
                let mut file = tokio::fs::File::create(partial).await?;
                let mut body = response.bytes_stream();
                while let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(|e| acquisition(release, e.to_string()))?;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                file.sync_all().await?;
            }
            ArtifactKind::TarGz { member } => {
                let archive = response
                    .bytes()
                    .await
                    .map_err(|e| acquisition(release, e.to_string()))?;
                let member = member.clone();
                let target = partial.to_path_buf();
                tokio::task::spawn_blocking(move || extract_member(&archive, &member, &target))
                    .await
                    .map_err(|e| acquisition(release, format!("extraction task failed: {}", e)))?
                    .map_err(|e| acquisition(release, e.to_string()))?;
            }
        }

        make_executable(partial)?;
        Ok(())
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".download");
    destination.with_file_name(name)
}

/// Write the archive entry whose file name is `member` to `target`.
pub(crate) fn extract_member(archive: &[u8], member: &str, target: &Path) -> Result<()> {
    let decoder = flate2::read::GzDecoder::new(archive);
    let mut tarball = tar::Archive::new(decoder);

    for entry in tarball.entries()? {
        let mut entry = entry?;
        let matches = entry
            .path()?
            .file_name()
            .map(|name| name == member)
            .unwrap_or(false);
        if !matches || !entry.header().entry_type().is_file() {
            continue;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        std::fs::write(target, contents)?;
        return Ok(());
    }

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("archive does not contain '{}'", member),
    )))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn acquisition(release: &ToolRelease, reason: impl Into<String>) -> Error {
    Error::ToolAcquisition {
        tool: format!("{} {}", release.tool, release.version),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_named_member() {
        let archive = tarball(&[("LICENSE", &b"mit"[..]), ("process-compose", &b"#!/bin/sh\n"[..])]);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");

        extract_member(&archive, "process-compose", &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn missing_member_is_an_error() {
        let archive = tarball(&[("README.md", &b"hi"[..])]);
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_member(&archive, "process-compose", &dir.path().join("out")).is_err());
    }

    #[test]
    fn partial_path_sits_beside_destination() {
        assert_eq!(
            partial_path(Path::new("/t/tools/prism/5.12.0/prism")),
            PathBuf::from("/t/tools/prism/5.12.0/prism.download")
        );
    }
}
