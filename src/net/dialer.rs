//! Secure dialer: validate, connect, handshake.
//!
//! # Responsibilities
//! - Reject unsupported network types before touching the network
//! - Resolve and connect (directly or through a CONNECT proxy)
//! - Run the TLS handshake and hand back a [`SecureConnection`]
//! - Hold shared, hot-swappable configuration
//!
//! # Design Decisions
//! - Configuration lives behind `ArcSwap`; each dial works on one snapshot
//! - The proxy hook is injected, never read from ambient state at dial time
//! - Every failure path drops whatever socket it opened before returning

use arc_swap::ArcSwap;
use hyper::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, DialerConfig};
use crate::net::address::split_host_port;
use crate::net::connection::{ConnectionTracker, SecureConnection};
use crate::net::error::{DialError, EstablishError, TlsSetupError};
use crate::net::network::NetworkType;
use crate::net::proxy::{self, DialRequest, ProxyResolver};
use crate::net::tls;
use crate::observability::metrics;

/// Configuration snapshot plus the TLS connector derived from it.
struct Settings {
    config: DialerConfig,
    tls: TlsConnector,
}

impl Settings {
    fn build(config: DialerConfig) -> Result<Self, TlsSetupError> {
        let tls = tls::build_connector(&config.tls)?;
        Ok(Self { config, tls })
    }
}

/// Produces [`SecureConnection`]s.
///
/// Cheap to clone; clones share configuration and connection tracking.
#[derive(Clone)]
pub struct SecureDialer {
    settings: Arc<ArcSwap<Settings>>,
    proxy: Option<ProxyResolver>,
    tracker: ConnectionTracker,
}

impl SecureDialer {
    /// Create a dialer that connects directly.
    pub fn new(config: DialerConfig) -> Result<Self, TlsSetupError> {
        Ok(Self {
            settings: Arc::new(ArcSwap::from_pointee(Settings::build(config)?)),
            proxy: None,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Route dials through the proxies chosen by `resolver`.
    pub fn with_proxy(mut self, resolver: ProxyResolver) -> Self {
        self.proxy = Some(resolver);
        self
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> DialerConfig {
        self.settings.load().config.clone()
    }

    /// Validate and install a new configuration for subsequent dials.
    pub fn reconfigure(&self, config: DialerConfig) -> Result<(), ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let settings = Settings::build(config)?;
        self.settings.store(Arc::new(settings));
        tracing::info!("Dialer configuration updated");
        Ok(())
    }

    /// Number of connections from this dialer that are still open.
    pub fn open_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Open a TLS connection to `address` (`host:port`) over `network`.
    pub async fn dial(&self, network: &str, address: &str) -> Result<SecureConnection, DialError> {
        let start = Instant::now();
        let result = self.dial_inner(network, address).await;

        match &result {
            Ok(conn) => {
                metrics::record_dial("success", start);
                tracing::debug!(
                    connection_id = %conn.id(),
                    network = %network,
                    address = %address,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Connection established"
                );
            }
            Err(e) => {
                metrics::record_dial(e.kind(), start);
                tracing::warn!(
                    network = %network,
                    address = %address,
                    error = %e,
                    "Dial failed"
                );
            }
        }

        result
    }

    async fn dial_inner(&self, network: &str, address: &str) -> Result<SecureConnection, DialError> {
        let network: NetworkType = network.parse()?;
        let (host, port) = split_host_port(address)?;
        let settings = self.settings.load_full();

        let request = DialRequest {
            network,
            host: host.to_string(),
            port,
        };
        let timeout = settings.config.connect_timeout();

        let stream = tokio::time::timeout(timeout, self.establish(&settings, &request))
            .await
            .unwrap_or(Err(EstablishError::TimedOut(timeout)))
            .map_err(|source| DialError::Establish {
                address: address.to_string(),
                source,
            })?;

        Ok(SecureConnection::new(
            stream,
            request.authority(),
            settings.config.deadline_policy(),
            self.tracker.track(),
        ))
    }

    async fn establish(
        &self,
        settings: &Settings,
        request: &DialRequest,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, EstablishError> {
        let server_name = tls::server_name(&request.host)?;

        let proxy_url = match &self.proxy {
            Some(resolve) => resolve(request).map_err(EstablishError::ProxyResolve)?,
            None => None,
        };

        let tcp = match proxy_url {
            Some(url) => connect_via_proxy(&url, request).await?,
            None => connect_direct(request).await?,
        };

        if settings.config.nodelay {
            tcp.set_nodelay(true).map_err(EstablishError::Connect)?;
        }

        settings
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(EstablishError::Handshake)
    }

    /// Dial the `https` URI's authority (default port 443).
    fn dial_uri(&self, uri: Uri) -> impl Future<Output = Result<SecureConnection, DialError>> + Send + 'static {
        let dialer = self.clone();
        async move {
            let address = uri_address(&uri)?;
            dialer.dial("tcp", &address).await
        }
    }
}

impl fmt::Debug for SecureDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureDialer")
            .field("config", &self.settings.load().config)
            .field("proxy", &self.proxy.is_some())
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

async fn connect_direct(request: &DialRequest) -> Result<TcpStream, EstablishError> {
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((request.host.as_str(), request.port))
        .await
        .map_err(EstablishError::Resolve)?
        .filter(|addr| request.network.admits(addr))
        .collect();

    connect_first(&candidates)
        .await?
        .ok_or(EstablishError::NoAddresses(request.network.family()))
}

/// Try each address in order; the first successful connect wins.
async fn connect_first(candidates: &[SocketAddr]) -> Result<Option<TcpStream>, EstablishError> {
    let mut last_err = None;

    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(Some(stream)),
            Err(e) => {
                tracing::debug!(address = %addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(EstablishError::Connect(e)),
        None => Ok(None),
    }
}

async fn connect_via_proxy(proxy_url: &Url, request: &DialRequest) -> Result<TcpStream, EstablishError> {
    let proxy_addr = proxy::proxy_authority(proxy_url)?;
    tracing::debug!(proxy = %proxy_addr, destination = %request.authority(), "Dialing through proxy");

    let mut stream = TcpStream::connect(&proxy_addr)
        .await
        .map_err(EstablishError::Connect)?;
    proxy::establish_tunnel(&mut stream, &request.authority()).await?;
    Ok(stream)
}

fn uri_address(uri: &Uri) -> Result<String, DialError> {
    let raw = uri.to_string();
    if uri.scheme_str() != Some("https") {
        return Err(DialError::invalid_address(&raw, "only https URIs can be dialed"));
    }
    let host = uri
        .host()
        .ok_or_else(|| DialError::invalid_address(&raw, "missing host"))?;
    Ok(format!("{}:{}", host, uri.port_u16().unwrap_or(443)))
}

impl tower::Service<Uri> for SecureDialer {
    type Response = TokioIo<SecureConnection>;
    type Error = DialError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dial = self.dial_uri(uri);
        Box::pin(async move { dial.await.map(TokioIo::new) })
    }
}

/// An HTTPS client whose connections come from `dialer`.
///
/// Idle connections are not kept for reuse.
pub fn https_client<B>(dialer: SecureDialer) -> Client<SecureDialer, B>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
{
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build(dialer)
}
