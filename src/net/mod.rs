//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! dial(network, "host:port")
//!     → network.rs (reject non-TCP networks)
//!     → address.rs (split host and port)
//!     → proxy.rs (optional CONNECT tunnel)
//!     → tls.rs (handshake against the host name)
//!     → connection.rs (Open → Closed, deadline window)
//!
//! Connection States:
//!     Dialing → Handshaking → Open → Closed
//! ```
//!
//! # Design Decisions
//! - Nothing is allocated for a dial that fails validation
//! - Deadlines are checked by deadline.rs before they are armed
//! - Close is not idempotent; a second close is reported as misuse

pub mod address;
pub mod connection;
pub mod deadline;
pub mod dialer;
pub mod error;
pub mod network;
pub mod proxy;
pub mod tls;

pub use connection::{ConnectionId, SecureConnection};
pub use deadline::{DeadlineError, DeadlineKind, DeadlinePolicy, DEFAULT_MAX_HORIZON};
pub use dialer::{https_client, SecureDialer};
pub use error::{ConnError, DialError, EstablishError, ProxyError, TlsSetupError};
pub use network::NetworkType;
pub use proxy::{DialRequest, ProxyResolver};
