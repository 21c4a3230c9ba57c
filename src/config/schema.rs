//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::net::deadline::DeadlinePolicy;

/// Root configuration for the secure dialer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DialerConfig {
    /// Upper bound on resolve + connect + handshake, in seconds.
    pub connect_timeout_secs: u64,

    /// Disable Nagle's algorithm on dialed sockets.
    pub nodelay: bool,

    /// Deadline window policy.
    pub deadlines: DeadlineConfig,

    /// Client TLS settings.
    pub tls: TlsClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl DialerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn deadline_policy(&self) -> DeadlinePolicy {
        DeadlinePolicy::new(Duration::from_secs(self.deadlines.max_horizon_secs))
    }
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            nodelay: true,
            deadlines: DeadlineConfig::default(),
            tls: TlsClientConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Deadline policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Furthest a deadline may be set into the future, in seconds.
    pub max_horizon_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            max_horizon_secs: 600,
        }
    }
}

/// Client-side TLS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TlsClientConfig {
    /// Trust the platform's root certificates.
    pub use_native_roots: bool,

    /// Additional PEM bundles to trust.
    pub extra_root_certs: Vec<String>,

    /// ALPN protocols offered during the handshake, in preference order.
    pub alpn_protocols: Vec<String>,
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self {
            use_native_roots: true,
            extra_root_certs: Vec::new(),
            alpn_protocols: vec!["http/1.1".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
