use super::DispatchTable;
use crate::error::{Error, Result};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Fixed local port the proxy listens on.
pub const DEFAULT_PROXY_PORT: u16 = 1347;

type ProxyBody = BoxBody<Bytes, hyper::Error>;
type UpstreamClient = Client<HttpsConnector<HttpConnector>, Incoming>;

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Pause before accepting again after a failed `accept`, e.g. when the
/// process is out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Returns `false` if `cancel` fired during the pause.
async fn pause_after_accept_error(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// Host-routing reverse proxy in front of every compiled backend.
pub struct IngressProxy {
    table: Arc<DispatchTable>,
    client: UpstreamClient,
}

impl IngressProxy {
    pub fn new(table: Arc<DispatchTable>) -> Self {
        let roots = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                tracing::debug!("No native TLS roots ({}); using bundled roots", e);
                hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let connector = roots.https_or_http().enable_http1().build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { table, client }
    }

    /// Bind the listener now so a port clash surfaces before anything starts.
    pub async fn bind(self, port: u16) -> Result<BoundProxy> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            Error::PortAllocation(format!(
                "Ingress proxy could not listen on {}: {}",
                addr, e
            ))
        })?;
        Ok(BoundProxy {
            listener,
            proxy: Arc::new(self),
        })
    }

    async fn handle(
        &self,
        mut req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> std::result::Result<Response<ProxyBody>, Infallible> {
        let Some(host) = request_host(&req) else {
            return Ok(text_response(StatusCode::BAD_REQUEST, "Missing Host header"));
        };
        let path = req.uri().path().to_string();

        let Some(route) = self.table.resolve(&host, &path) else {
            tracing::debug!("No route for {}{}", host, path);
            return Ok(text_response(
                StatusCode::NOT_FOUND,
                format!("No service is routed at {}{}", host, path),
            ));
        };
        let backend = route.backend.clone();
        let service = route.service.clone();

        let upgrade = upgrade_protocol(req.headers());
        let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));

        let (mut parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = match format!("{}{}", backend.base_url(), path_and_query).parse() {
            Ok(uri) => uri,
            Err(e) => {
                return Ok(text_response(
                    StatusCode::BAD_GATEWAY,
                    format!("Invalid upstream URI for '{}': {}", service, e),
                ))
            }
        };
        parts.uri = uri;

        strip_hop_by_hop(&mut parts.headers);
        if let Some(ref protocol) = upgrade {
            parts
                .headers
                .insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            parts.headers.insert(header::UPGRADE, protocol.clone());
        }
        add_forwarded_headers(&mut parts.headers, &host, client_addr);

        let response = match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Upstream {} for '{}' failed: {}", backend, service, e);
                return Ok(text_response(
                    StatusCode::BAD_GATEWAY,
                    format!("Service '{}' at {} is unreachable", service, backend),
                ));
            }
        };

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            let mut response = response;
            if let Some(client_upgrade) = client_upgrade {
                let upstream_upgrade = hyper::upgrade::on(&mut response);
                tokio::spawn(tunnel(service, client_upgrade, upstream_upgrade));
            }
            let (parts, _) = response.into_parts();
            return Ok(Response::from_parts(parts, empty()));
        }

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

/// A proxy whose listener is bound but not yet accepting.
pub struct BoundProxy {
    listener: TcpListener,
    proxy: Arc<IngressProxy>,
}

impl BoundProxy {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires. Open connections are asked to
    /// finish their in-flight request and close.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("Ingress proxy listening on http://{}", addr);
        }

        loop {
            let (stream, client_addr) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Ingress proxy accept failed: {}", e);
                        if pause_after_accept_error(&cancel).await {
                            continue;
                        }
                        break;
                    }
                },
            };

            let proxy = Arc::clone(&self.proxy);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let proxy = Arc::clone(&proxy);
                    async move { proxy.handle(req, client_addr).await }
                });
                let conn = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades();
                tokio::pin!(conn);

                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!("Connection from {} ended: {}", client_addr, e);
                        }
                    }
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        let _ = conn.await;
                    }
                }
            });
        }

        tracing::debug!("Ingress proxy stopped");
        Ok(())
    }
}

async fn tunnel(service: String, client: OnUpgrade, upstream: OnUpgrade) {
    match tokio::try_join!(client, upstream) {
        Ok((client, upstream)) => {
            let mut client = TokioIo::new(client);
            let mut upstream = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                Ok((sent, received)) => tracing::debug!(
                    "Upgraded connection to '{}' closed ({} bytes up, {} bytes down)",
                    service,
                    sent,
                    received
                ),
                Err(e) => tracing::debug!("Upgraded connection to '{}' failed: {}", service, e),
            }
        }
        Err(e) => tracing::warn!("Connection upgrade for '{}' failed: {}", service, e),
    }
}

fn request_host(req: &Request<Incoming>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if wants_upgrade {
        headers.get(header::UPGRADE).cloned()
    } else {
        None
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

fn add_forwarded_headers(headers: &mut HeaderMap, host: &str, client_addr: SocketAddr) {
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert("x-forwarded-host", value);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));

    let client_ip = client_addr.ip().to_string();
    let forwarded_for = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", value);
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ProxyBody> {
    let mut response = Response::new(
        Full::new(body.into())
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}
