//! Tool installation against a local artifact server.

mod common;

use devstack::tools::{ArtifactKind, Installer, ToolRelease};
use devstack::Error;

fn release(url: String) -> ToolRelease {
    ToolRelease {
        tool: "docker-compose",
        version: "2.29.7",
        url,
        artifact: ArtifactKind::Binary,
    }
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let port = common::serve_fixed("404 Not Found", "missing").await;
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("tools/docker-compose/2.29.7/docker-compose");

    let err = Installer::new()
        .install(&release(format!("http://127.0.0.1:{}/dc", port)), &destination)
        .await
        .unwrap_err();

    match err {
        Error::ToolAcquisition { tool, .. } => assert_eq!(tool, "docker-compose 2.29.7"),
        other => panic!("expected ToolAcquisition, got {other:?}"),
    }
    assert!(!destination.exists());
    let leftovers: Vec<_> = std::fs::read_dir(destination.parent().unwrap())
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "partial download left behind");
}

#[tokio::test]
async fn test_unreachable_server_is_acquisition_error() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bin/tool");
    let err = Installer::new()
        .install(
            &release(format!("http://127.0.0.1:{}/dc", common::unused_port())),
            &destination,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolAcquisition { .. }));
    assert!(!destination.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_downloaded_binary_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let port = common::serve_fixed("200 OK", "#!/bin/sh\necho compose\n").await;
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("tools/docker-compose/2.29.7/docker-compose");

    Installer::new()
        .install(&release(format!("http://127.0.0.1:{}/dc", port)), &destination)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&destination).unwrap(),
        "#!/bin/sh\necho compose\n"
    );
    let mode = std::fs::metadata(&destination).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[cfg(unix)]
#[tokio::test]
async fn test_installed_tool_skips_download() {
    use devstack::tools::{ComposeDriver, ManagedTool, ToolSettings};
    use devstack::DevstackPaths;

    let dir = tempfile::tempdir().unwrap();
    let paths = DevstackPaths::new(dir.path());
    let existing = paths
        .tool_dir("docker-compose", devstack::tools::COMPOSE_VERSION)
        .join("docker-compose");
    common::write_script(&existing, "exit 0");

    // An installer that could only fail proves nothing is downloaded.
    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::all("http://127.0.0.1:1").unwrap())
        .build()
        .unwrap();
    let mut settings = ToolSettings::new(paths);
    settings.installer = Installer::with_client(client);

    let path = ComposeDriver::new(settings)
        .ensure_executable_exists()
        .await
        .unwrap();
    assert_eq!(path, existing);
}
