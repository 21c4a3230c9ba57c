//! TLS dialer with a deadline-policed connection handle.

pub mod config;
pub mod net;
pub mod observability;

pub use config::DialerConfig;
pub use net::{ConnError, DialError, SecureConnection, SecureDialer};
