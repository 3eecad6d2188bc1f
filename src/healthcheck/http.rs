use super::HealthChecker;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

/// Global shared HTTP client for health checks.
///
/// Requests set their own timeout; the client-level one is only a fallback.
static SHARED_HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn get_shared_client() -> &'static Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default()
    })
}

/// HTTP-based health checker
#[derive(Debug, Clone)]
pub struct HttpChecker {
    url: String,
    client: Client,
    timeout: Duration,
    any_response: bool,
}

impl HttpChecker {
    /// Checker backed by the shared client.
    ///
    /// Loopback targets get a dedicated client: `*.localhost` hosts resolve
    /// to `127.0.0.1`, since not every system resolver handles that TLD,
    /// and the certificate is not verified, since local dev certificates
    /// are usually self-signed.
    ///
    /// # Errors
    ///
    /// Returns error if URL is malformed or uses unsupported scheme.
    pub fn with_shared_client(url: String, timeout: Duration) -> Result<Self> {
        let parsed = Self::validate_url(&url)?;

        let client = match parsed.host() {
            Some(host) if is_loopback(&host) => loopback_client(&host)?,
            _ => get_shared_client().clone(),
        };

        Ok(Self {
            url,
            client,
            timeout,
            any_response: false,
        })
    }

    /// Treat any HTTP response as healthy, not just 2xx. Used for implicit
    /// probes where only the listener matters.
    pub fn any_response(mut self, any_response: bool) -> Self {
        self.any_response = any_response;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validate that a URL is well-formed and uses HTTP/HTTPS scheme.
    fn validate_url(url: &str) -> Result<url::Url> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Config(format!("Invalid healthcheck URL '{}': {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(Error::Config(format!(
                "Invalid healthcheck URL '{}': scheme must be http or https, got '{}'",
                url, scheme
            ))),
        }
    }
}

fn is_loopback(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
        url::Host::Ipv4(ip) => ip.is_loopback(),
        url::Host::Ipv6(ip) => ip.is_loopback(),
    }
}

fn loopback_client(host: &url::Host<&str>) -> Result<Client> {
    let mut builder = Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy();
    if let url::Host::Domain(name) = host {
        builder = builder.resolve(name, SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> Result<bool> {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => Ok(self.any_response || response.status().is_success()),
            Err(e) => {
                tracing::trace!("Health check {} failed: {}", self.url, e);
                Ok(false)
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_status(status: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_http_checker_unreachable_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker = HttpChecker::with_shared_client(
            format!("http://127.0.0.1:{}/health", port),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!checker.check().await.unwrap());
    }

    #[tokio::test]
    async fn localhost_subdomains_resolve_to_loopback() {
        let port = serve_status("200 OK").await;
        let checker = HttpChecker::with_shared_client(
            format!("http://app.workleap.localhost:{}/", port),
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(checker.check().await.unwrap());
    }

    #[tokio::test]
    async fn non_success_status_is_unhealthy_unless_any_response() {
        let port = serve_status("404 Not Found").await;
        let url = format!("http://127.0.0.1:{}/", port);

        let strict = HttpChecker::with_shared_client(url.clone(), Duration::from_secs(2)).unwrap();
        assert!(!strict.check().await.unwrap());

        let lenient = HttpChecker::with_shared_client(url, Duration::from_secs(2))
            .unwrap()
            .any_response(true);
        assert!(lenient.check().await.unwrap());
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(HttpChecker::with_shared_client("not-a-url".into(), Duration::from_secs(1)).is_err());
        assert!(
            HttpChecker::with_shared_client("ftp://localhost/health".into(), Duration::from_secs(1))
                .is_err()
        );
        assert!(
            HttpChecker::with_shared_client("https://localhost/health".into(), Duration::from_secs(1))
                .is_ok()
        );
    }
}
