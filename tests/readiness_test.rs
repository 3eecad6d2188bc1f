//! Readiness gate against real listeners.

mod common;

use devstack::healthcheck::{Backoff, ReadinessGate};
use devstack::{AddressBook, Error, HealthCheck};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn fast() -> Backoff {
    Backoff {
        initial: Duration::from_millis(20),
        max: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_gate_waits_for_late_listener() {
    let port = common::unused_port();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        common::serve_fixed_on(listener, "200 OK", "ok");
    });

    let started = std::time::Instant::now();
    ReadinessGate::new(vec![HealthCheck::url(
        "late",
        format!("http://127.0.0.1:{}/health", port),
    )])
    .timeout(Duration::from_secs(10))
    .backoff(fast())
    .wait(&AddressBook::empty(1347), &CancellationToken::new())
    .await
    .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_error_status_keeps_polling_until_timeout() {
    let port = common::serve_fixed("503 Service Unavailable", "starting").await;
    let healthy = common::serve_fixed("200 OK", "ok").await;

    let err = ReadinessGate::new(vec![
        HealthCheck::url("healthy", format!("http://127.0.0.1:{}/", healthy)),
        HealthCheck::url("starting", format!("http://127.0.0.1:{}/", port)),
    ])
    .timeout(Duration::from_millis(400))
    .backoff(fast())
    .wait(&AddressBook::empty(1347), &CancellationToken::new())
    .await
    .unwrap_err();

    match err {
        Error::ReadinessTimeout { checks, timeout } => {
            assert_eq!(checks, vec!["starting".to_string()]);
            assert_eq!(timeout, Duration::from_millis(400));
        }
        other => panic!("expected ReadinessTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_backend_check_uses_compiled_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    common::serve_fixed_on(listener, "200 OK", "ok");

    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
name: shop
services:
  api:
    ingress: {{ host: api.workleap.localhost }}
    runners:
      - type: executable
        command: ./api
        port: {port}
"#
    );
    let orchestrator = common::builder(&yaml, dir.path()).build().unwrap();
    let topology = orchestrator.compile().unwrap();

    let check = HealthCheck::backend("api", "/health");
    assert_eq!(
        check.resolve(&topology.addresses).unwrap(),
        format!("http://127.0.0.1:{}/health", port)
    );

    ReadinessGate::new(vec![check])
        .timeout(Duration::from_secs(5))
        .backoff(fast())
        .wait(&topology.addresses, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_https_backend_with_self_signed_certificate() {
    let port = common::serve_tls_fixed("200 OK", "ok").await;

    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
name: shop
services:
  api:
    healthcheck: /health
    runners:
      - type: dotnet
        project: src/Api
        protocol: https
        port: {port}
"#
    );
    let orchestrator = common::builder(&yaml, dir.path()).build().unwrap();
    let topology = orchestrator.compile().unwrap();

    let check = HealthCheck::backend("api", "/health");
    assert_eq!(
        check.resolve(&topology.addresses).unwrap(),
        format!("https://localhost:{}/health", port)
    );

    ReadinessGate::new(vec![check])
        .timeout(Duration::from_secs(5))
        .backoff(fast())
        .wait(&topology.addresses, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_while_polling() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = ReadinessGate::new(vec![HealthCheck::url(
        "never",
        format!("http://127.0.0.1:{}/", common::unused_port()),
    )])
    .timeout(Duration::from_secs(30))
    .backoff(fast())
    .wait(&AddressBook::empty(1347), &cancel)
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}
