use crate::error::{Error, Result};
use crate::pipeline::{AddressBook, CompiledTopology};
use std::future::Future;
use std::net::SocketAddr;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A started topology: the tool subprocesses and the ingress proxy, each
/// supervised by its own task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) aborts
/// the tasks; the subprocesses are then killed without a grace period.
pub struct RunningTopology {
    topology: CompiledTopology,
    proxy_addr: Option<SocketAddr>,
    session: CancellationToken,
    tasks: JoinSet<(&'static str, Result<()>)>,
    failures: Vec<Error>,
}

impl RunningTopology {
    pub(super) fn new(topology: CompiledTopology, session: CancellationToken) -> Self {
        Self {
            topology,
            proxy_addr: None,
            session,
            tasks: JoinSet::new(),
            failures: Vec::new(),
        }
    }

    pub(super) fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        tracing::debug!("Starting {}", name);
        self.tasks.spawn(async move { (name, task.await) });
    }

    pub(super) fn set_proxy_addr(&mut self, addr: SocketAddr) {
        self.proxy_addr = Some(addr);
    }

    pub fn addresses(&self) -> &AddressBook {
        &self.topology.addresses
    }

    pub fn topology(&self) -> &CompiledTopology {
        &self.topology
    }

    /// Where the ingress proxy accepts connections, if it was started.
    pub fn proxy_addr(&self) -> Option<SocketAddr> {
        self.proxy_addr
    }

    /// Token that stops every task of this session when cancelled.
    pub fn session_token(&self) -> CancellationToken {
        self.session.clone()
    }

    /// Run until the session is cancelled or every task has ended, then
    /// shut down.
    ///
    /// A tool exiting on its own is logged and does not end the session
    /// while other tasks are still running.
    pub async fn wait(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.session.cancelled() => break,
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => self.record(joined),
                    None => break,
                },
            }
        }
        self.shutdown().await
    }

    /// Stop every task: graceful first, forceful after the grace period.
    ///
    /// Returns the first failure any task reported during the session.
    #[tracing::instrument(skip_all)]
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("Stopping topology '{}'", self.topology.name);
        self.session.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
        tracing::info!("Topology '{}' stopped", self.topology.name);
        match self.failures.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(
        &mut self,
        joined: std::result::Result<(&'static str, Result<()>), tokio::task::JoinError>,
    ) {
        match joined {
            Ok((name, Ok(()))) => tracing::debug!("{} finished", name),
            Ok((name, Err(e))) => {
                tracing::warn!("{} failed: {}", name, e);
                self.failures.push(e);
            }
            Err(e) => tracing::error!("Supervision task panicked: {}", e),
        }
    }
}

impl std::fmt::Debug for RunningTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningTopology")
            .field("name", &self.topology.name)
            .field("proxy_addr", &self.proxy_addr)
            .field("tasks", &self.tasks.len())
            .field("is_cancelled", &self.session.is_cancelled())
            .finish()
    }
}
