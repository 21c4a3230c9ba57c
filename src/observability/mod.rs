//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dialer / connection events:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Connection IDs appear on every per-connection event
//! - Metrics are cheap (atomic increments) and recorder-agnostic

pub mod logging;
pub mod metrics;
