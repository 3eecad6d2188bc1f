use super::load_graph;
use crate::output::UserOutput;
use devstack::{
    CompiledTopology, ExecutionMode, Orchestrator, RunningTopology, UnprobedServicePolicy,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub remote_env: Option<String>,
    pub timeout: Duration,
    pub proxy_port: u16,
    pub probe_all: bool,
    pub dry_run: bool,
}

pub async fn run_topology(options: RunOptions, out: &dyn UserOutput) -> anyhow::Result<()> {
    let (graph, work_dir, _) = load_graph(&options.files)?;
    let mode = match options.remote_env {
        Some(env) => ExecutionMode::remote(env),
        None => ExecutionMode::Local,
    };
    let policy = if options.probe_all {
        UnprobedServicePolicy::ProbeBackend
    } else {
        UnprobedServicePolicy::AssumeReady
    };

    let orchestrator = Orchestrator::builder()
        .graph(graph)
        .work_dir(work_dir)
        .mode(mode)
        .proxy_port(options.proxy_port)
        .readiness_timeout(options.timeout)
        .unprobed_services(policy)
        .build()?;

    if options.dry_run {
        let topology = orchestrator.compile()?;
        describe(&topology, out);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    out.status(&format!(
        "Starting '{}' ({})...",
        orchestrator.graph().name,
        orchestrator.mode()
    ));
    let running = orchestrator.start(cancel).await?;
    report_ready(&running, out);

    running.wait().await?;
    out.status("Stopped");
    Ok(())
}

/// First Ctrl+C stops gracefully, the second exits immediately.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut signal_count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            signal_count += 1;
            if signal_count == 1 {
                println!("\n\nStopping... (Press Ctrl+C again to force quit)");
                cancel.cancel();
            } else {
                println!("\n\nForce quitting...");
                std::process::exit(130);
            }
        }
        tracing::warn!("Failed to listen for Ctrl+C; stop the process externally");
    });
}

fn report_ready(running: &RunningTopology, out: &dyn UserOutput) {
    out.blank();
    out.success("Topology is ready");
    let addresses = running.addresses();
    for service in addresses.services() {
        match addresses.resolve_url(service) {
            Ok(url) => out.status(&format!("  {:<20} {}", service, url)),
            Err(e) => out.warning(&format!("  {:<20} unavailable: {}", service, e)),
        }
    }
    out.blank();
    out.status("Press Ctrl+C to stop");
}

/// Print what a run would start.
pub(crate) fn describe(topology: &CompiledTopology, out: &dyn UserOutput) {
    out.status(&format!("Topology '{}' ({})", topology.name, topology.mode));
    out.blank();

    out.status("Addresses:");
    let addresses = &topology.addresses;
    for service in addresses.services() {
        match addresses.resolve_url(service) {
            Ok(url) => out.status(&format!("  {:<20} {}", service, url)),
            Err(e) => out.warning(&format!("  {:<20} unavailable: {}", service, e)),
        }
    }

    if !topology.routes.is_empty() {
        out.blank();
        out.status("Routes:");
        for route in topology.routes.routes() {
            out.status(&format!(
                "  {}{} -> {} ({})",
                route.host, route.path, route.backend, route.service
            ));
        }
    }

    if topology.manifests.has_containers() {
        out.blank();
        out.status("docker-compose.yml:");
        out.status(topology.manifests.compose_yaml.trim_end());
    }
    if topology.manifests.has_processes() {
        out.blank();
        out.status("process-compose.yml:");
        out.status(topology.manifests.supervisor_yaml.trim_end());
    }
}
