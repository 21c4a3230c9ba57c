//! Error types for dialing and connection operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::net::connection::ConnectionId;
use crate::net::deadline::DeadlineError;

/// Boxed error returned by injected proxy resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`SecureDialer::dial`](crate::net::SecureDialer::dial).
///
/// No socket is held by the dialer when any of these is returned.
#[derive(Debug, Error)]
pub enum DialError {
    /// The network type is not a TCP-family identifier.
    #[error("unsupported network type: {0:?}")]
    UnsupportedNetwork(String),

    /// The destination is not a well-formed `host:port`.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Transport, proxy or TLS handshake failure while connecting.
    #[error("failed to establish connection to {address}: {source}")]
    Establish {
        address: String,
        #[source]
        source: EstablishError,
    },
}

impl DialError {
    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        DialError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DialError::UnsupportedNetwork(_) => "unsupported_network",
            DialError::InvalidAddress { .. } => "invalid_address",
            DialError::Establish { source, .. } => source.kind(),
        }
    }
}

/// Root cause of a failed connection establishment.
#[derive(Debug, Error)]
pub enum EstablishError {
    #[error("DNS resolution failed: {0}")]
    Resolve(#[source] io::Error),

    #[error("no {0} addresses resolved")]
    NoAddresses(&'static str),

    #[error("TCP connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("proxy resolver failed: {0}")]
    ProxyResolve(#[source] BoxError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl EstablishError {
    pub fn kind(&self) -> &'static str {
        match self {
            EstablishError::Resolve(_) | EstablishError::NoAddresses(_) => "resolve",
            EstablishError::Connect(_) => "connect",
            EstablishError::InvalidServerName(_) => "server_name",
            EstablishError::Handshake(_) => "handshake",
            EstablishError::ProxyResolve(_) | EstablishError::Proxy(_) => "proxy",
            EstablishError::TimedOut(_) => "timeout",
        }
    }
}

/// Failures while tunnelling through an HTTP CONNECT proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("unsupported proxy scheme {0:?} (only http is supported)")]
    UnsupportedScheme(String),

    #[error("proxy URL {0} has no host")]
    MissingHost(String),

    #[error("proxy I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("proxy response head exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error("malformed proxy response: {0:?}")]
    MalformedResponse(String),

    #[error("proxy refused tunnel: {0}")]
    Refused(String),
}

/// Errors returned by [`SecureConnection`](crate::net::SecureConnection) operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The connection has transitioned to `Closed`.
    #[error("connection {0} is already closed")]
    Closed(ConnectionId),

    /// The peer closed its side of the stream.
    #[error("end of stream")]
    Eof,

    /// Underlying socket or TLS failure, including deadline timeouts.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested deadline lies outside the permitted window.
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
}

impl ConnError {
    /// True when an I/O call failed because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnError::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

impl From<ConnError> for io::Error {
    fn from(err: ConnError) -> Self {
        match err {
            ConnError::Io(e) => e,
            ConnError::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            ConnError::Closed(_) => io::Error::new(io::ErrorKind::NotConnected, err),
            ConnError::Deadline(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
        }
    }
}

/// Failures while building the client TLS configuration.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read CA bundle {path}: {source}")]
    ReadBundle {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid certificate in {path}: {reason}")]
    InvalidCertificate { path: String, reason: String },

    #[error("no trusted root certificates available")]
    EmptyRootStore,
}
