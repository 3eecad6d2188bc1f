use super::{poll_until_healthy, Backoff, HttpChecker};
use crate::error::{Error, Result};
use crate::pipeline::{join_url, AddressBook};
use crate::runner::CompiledEndpoint;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type UrlThunk = Arc<dyn Fn(&AddressBook) -> Result<String> + Send + Sync>;

/// What to do with local HTTP services nobody registered a check for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnprobedServicePolicy {
    /// Ready as soon as its process has been handed to the supervisor.
    #[default]
    AssumeReady,
    /// Wait until its backend answers any HTTP request on `/`.
    ProbeBackend,
}

/// A named URL producer, resolved only when polling starts.
#[derive(Clone)]
pub struct HealthCheck {
    name: String,
    service: Option<String>,
    any_response: bool,
    url: UrlThunk,
}

impl HealthCheck {
    pub fn new<F>(name: impl Into<String>, url: F) -> Self
    where
        F: Fn(&AddressBook) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            service: None,
            any_response: false,
            url: Arc::new(url),
        }
    }

    /// A fixed URL.
    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(name, move |_| Ok(url.clone()))
    }

    /// `path` under the service's preferred URL (proxy when routed).
    pub fn service(service: impl Into<String>, path: impl Into<String>) -> Self {
        let service = service.into();
        let path = path.into();
        let target = service.clone();
        let mut check = Self::new(format!("{}{}", service, path), move |addresses| {
            addresses
                .resolve_url(&target)
                .map(|base| join_url(&base, &path))
        });
        check.service = Some(service);
        check
    }

    /// `path` on the service's backend, bypassing the proxy.
    pub fn backend(service: impl Into<String>, path: impl Into<String>) -> Self {
        let service = service.into();
        let path = path.into();
        let target = service.clone();
        let mut check = Self::new(format!("{}{}", service, path), move |addresses| {
            addresses
                .direct_url(&target)
                .map(|base| join_url(&base, &path))
        });
        check.service = Some(service);
        check
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service this check covers, when it was built for one.
    pub fn target_service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn resolve(&self, addresses: &AddressBook) -> Result<String> {
        (self.url)(addresses)
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Checks for every service that declares `healthcheck:` in config.
pub fn declared_checks(addresses: &AddressBook) -> Vec<HealthCheck> {
    addresses
        .local_endpoints()
        .filter_map(|(name, _)| {
            addresses
                .healthcheck_path(name)
                .map(|path| HealthCheck::backend(name, path))
        })
        .collect()
}

/// Implicit root probes for local HTTP services not covered by `existing`.
pub fn implicit_checks(
    policy: UnprobedServicePolicy,
    addresses: &AddressBook,
    existing: &[HealthCheck],
) -> Vec<HealthCheck> {
    if policy == UnprobedServicePolicy::AssumeReady {
        return Vec::new();
    }
    let covered: HashSet<&str> = existing
        .iter()
        .filter_map(HealthCheck::target_service)
        .collect();
    addresses
        .local_endpoints()
        .filter(|(name, endpoint)| {
            !covered.contains(name)
                && matches!(
                    endpoint,
                    CompiledEndpoint::Local {
                        scheme: "http" | "https",
                        ..
                    }
                )
        })
        .map(|(name, _)| {
            let mut check = HealthCheck::backend(name, "/");
            check.any_response = true;
            check
        })
        .collect()
}

/// Blocks until every registered check has succeeded once.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    checks: Vec<HealthCheck>,
    timeout: Duration,
    request_timeout: Duration,
    backoff: Backoff,
}

impl ReadinessGate {
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        Self {
            checks,
            timeout: DEFAULT_READINESS_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff: Backoff::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Resolve every URL, then poll them concurrently.
    ///
    /// A URL that cannot be resolved fails immediately. On timeout the
    /// error lists the checks that never passed, in registration order.
    #[tracing::instrument(skip_all, fields(checks = self.checks.len()))]
    pub async fn wait(self, addresses: &AddressBook, cancel: &CancellationToken) -> Result<()> {
        if self.checks.is_empty() {
            return Ok(());
        }

        let mut targets = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let url = check.resolve(addresses)?;
            let checker = HttpChecker::with_shared_client(url, self.request_timeout)?
                .any_response(check.any_response);
            targets.push((check.name.clone(), checker));
        }

        let polling = cancel.child_token();
        let mut pending: Vec<String> = targets.iter().map(|(name, _)| name.clone()).collect();
        let mut tasks = JoinSet::new();
        for (index, (name, checker)) in targets.into_iter().enumerate() {
            let token = polling.clone();
            let backoff = self.backoff;
            tracing::debug!("Waiting for {} at {}", name, checker.url());
            tasks.spawn(async move { (index, poll_until_healthy(&checker, backoff, &token).await) });
        }

        let mut passed = vec![false; pending.len()];
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Outcome::Cancelled,
                _ = &mut deadline => break Outcome::TimedOut,
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, true))) => {
                        passed[index] = true;
                        tracing::info!("{} is healthy", pending[index]);
                    }
                    Some(Ok((_, false))) => {}
                    Some(Err(e)) => tracing::warn!("Health check task failed: {}", e),
                    None => break Outcome::Finished,
                },
            }
        };

        polling.cancel();
        tasks.abort_all();

        if outcome == Outcome::Cancelled {
            return Err(Error::Cancelled("waiting for health checks".to_string()));
        }
        let failing: Vec<String> = pending
            .drain(..)
            .zip(passed)
            .filter_map(|(name, ok)| (!ok).then_some(name))
            .collect();
        if failing.is_empty() {
            tracing::info!("All health checks passed");
            return Ok(());
        }
        Err(Error::ReadinessTimeout {
            checks: failing,
            timeout: self.timeout,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    TimedOut,
    Cancelled,
}
