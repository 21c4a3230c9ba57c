//! Secure connection handle and lifecycle tracking.
//!
//! # Responsibilities
//! - Pass reads and writes through to the TLS stream
//! - Enforce the deadline window before arming read/write deadlines
//! - Close exactly once; every later operation reports `Closed`
//! - Track live connections per dialer
//!
//! # States
//! ```text
//! Open ──(read/write/deadline ok)──▶ Open
//! Open ──(close)──▶ Closed (terminal)
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper_util::client::legacy::connect::{Connected, Connection};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};

use crate::net::deadline::{DeadlineKind, DeadlinePolicy};
use crate::net::error::ConnError;
use crate::observability::metrics;

pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Upper bound on sending close_notify when no earlier write deadline is armed.
pub const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live connections produced by a dialer.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_open_connections(count);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Current number of live connections.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the live count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.active_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_open_connections(count);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

enum State {
    Open(Box<TlsStream>),
    Closed,
}

/// An armed deadline. The timer is created on first poll so deadlines can be
/// set outside a runtime context.
struct Deadline {
    at: Instant,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    fn new(at: Instant) -> Self {
        Self { at, timer: None }
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        if Instant::now() >= self.at {
            return true;
        }
        let at = self.at;
        let timer = self
            .timer
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(at)));
        timer.as_mut().poll(cx).is_ready()
    }
}

fn deadline_exceeded(kind: DeadlineKind) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} deadline exceeded", kind))
}

/// A TLS connection produced by [`SecureDialer`](crate::net::SecureDialer).
///
/// Owns its socket exclusively. Methods take `&mut self`, so callers sharing
/// a connection across tasks must wrap it in their own lock.
pub struct SecureConnection {
    id: ConnectionId,
    peer: String,
    state: State,
    policy: DeadlinePolicy,
    read_deadline: Option<Deadline>,
    write_deadline: Option<Deadline>,
    guard: Option<ConnectionGuard>,
}

impl SecureConnection {
    pub(crate) fn new(
        stream: TlsStream,
        peer: String,
        policy: DeadlinePolicy,
        guard: ConnectionGuard,
    ) -> Self {
        Self {
            id: guard.id(),
            peer,
            state: State::Open(Box::new(stream)),
            policy,
            read_deadline: None,
            write_deadline: None,
            guard: Some(guard),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The `host:port` this connection was dialed to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn policy(&self) -> DeadlinePolicy {
        self.policy
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline.as_ref().map(|d| d.at)
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline.as_ref().map(|d| d.at)
    }

    /// ALPN protocol agreed during the handshake, if any.
    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        match &self.state {
            State::Open(stream) => stream.get_ref().1.alpn_protocol(),
            State::Closed => None,
        }
    }

    fn ensure_open(&self) -> Result<(), ConnError> {
        match self.state {
            State::Open(_) => Ok(()),
            State::Closed => Err(ConnError::Closed(self.id)),
        }
    }

    /// Write bytes to the peer, returning how many were accepted.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, ConnError> {
        self.ensure_open()?;
        let n = AsyncWriteExt::write(&mut *self, buf).await?;
        AsyncWriteExt::flush(&mut *self).await?;
        Ok(n)
    }

    /// Write the whole buffer.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), ConnError> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Read into `buf`, returning the number of bytes read.
    ///
    /// End of stream is reported as [`ConnError::Eof`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnError> {
        self.ensure_open()?;
        let n = AsyncReadExt::read(&mut *self, buf).await?;
        if n == 0 && !buf.is_empty() {
            return Err(ConnError::Eof);
        }
        Ok(n)
    }

    /// Release the socket. Only the first call succeeds.
    ///
    /// Sending close_notify stops at the write deadline or after
    /// [`CLOSE_NOTIFY_TIMEOUT`], whichever comes first. The socket is
    /// released even if the peer never reads it. Dropping the returned
    /// future early still leaves the connection closed and released.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        let mut stream = match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(stream) => stream,
            State::Closed => {
                tracing::warn!(connection_id = %self.id, "Close called on closed connection");
                return Err(ConnError::Closed(self.id));
            }
        };
        let guard = self.guard.take();

        let cap = Instant::now() + CLOSE_NOTIFY_TIMEOUT;
        let limit = match self.write_deadline.take() {
            Some(deadline) => deadline.at.min(cap),
            None => cap,
        };
        self.read_deadline = None;

        match tokio::time::timeout_at(limit, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "TLS shutdown failed");
            }
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "TLS shutdown timed out, dropping socket");
            }
        }
        drop(stream);
        drop(guard);

        tracing::debug!(connection_id = %self.id, peer = %self.peer, "Connection closed");
        Ok(())
    }

    /// Set both read and write deadlines.
    pub fn set_deadline(&mut self, deadline: Instant) -> Result<(), ConnError> {
        self.apply_deadline(DeadlineKind::Both, deadline)
    }

    pub fn set_read_deadline(&mut self, deadline: Instant) -> Result<(), ConnError> {
        self.apply_deadline(DeadlineKind::Read, deadline)
    }

    pub fn set_write_deadline(&mut self, deadline: Instant) -> Result<(), ConnError> {
        self.apply_deadline(DeadlineKind::Write, deadline)
    }

    fn apply_deadline(&mut self, kind: DeadlineKind, deadline: Instant) -> Result<(), ConnError> {
        self.ensure_open()?;

        if let Err(e) = self.policy.check(deadline, Instant::now()) {
            metrics::record_deadline_rejected(kind, e.reason());
            tracing::debug!(connection_id = %self.id, kind = %kind, error = %e, "Deadline rejected");
            return Err(e.into());
        }

        match kind {
            DeadlineKind::Both => {
                self.read_deadline = Some(Deadline::new(deadline));
                self.write_deadline = Some(Deadline::new(deadline));
            }
            DeadlineKind::Read => self.read_deadline = Some(Deadline::new(deadline)),
            DeadlineKind::Write => self.write_deadline = Some(Deadline::new(deadline)),
        }

        tracing::trace!(connection_id = %self.id, kind = %kind, "Deadline set");
        Ok(())
    }
}

impl fmt::Debug for SecureConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .field("read_deadline", &self.read_deadline())
            .field("write_deadline", &self.write_deadline())
            .finish()
    }
}

impl AsyncRead for SecureConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let stream = match &mut this.state {
            State::Open(stream) => stream,
            State::Closed => return Poll::Ready(Err(ConnError::Closed(this.id).into())),
        };

        if let Some(deadline) = this.read_deadline.as_mut() {
            if deadline.poll_expired(cx) {
                return Poll::Ready(Err(deadline_exceeded(DeadlineKind::Read)));
            }
        }

        Pin::new(stream.as_mut()).poll_read(cx, buf)
    }
}

impl AsyncWrite for SecureConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let stream = match &mut this.state {
            State::Open(stream) => stream,
            State::Closed => return Poll::Ready(Err(ConnError::Closed(this.id).into())),
        };

        if let Some(deadline) = this.write_deadline.as_mut() {
            if deadline.poll_expired(cx) {
                return Poll::Ready(Err(deadline_exceeded(DeadlineKind::Write)));
            }
        }

        Pin::new(stream.as_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let stream = match &mut this.state {
            State::Open(stream) => stream,
            State::Closed => return Poll::Ready(Err(ConnError::Closed(this.id).into())),
        };

        if let Some(deadline) = this.write_deadline.as_mut() {
            if deadline.poll_expired(cx) {
                return Poll::Ready(Err(deadline_exceeded(DeadlineKind::Write)));
            }
        }

        Pin::new(stream.as_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.state {
            State::Open(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            State::Closed => Poll::Ready(Err(ConnError::Closed(this.id).into())),
        }
    }
}

impl Connection for SecureConnection {
    fn connected(&self) -> Connected {
        let connected = Connected::new();
        if self.negotiated_alpn() == Some(b"h2".as_slice()) {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}
