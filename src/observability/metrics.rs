//! Metrics collection.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.
//!
//! # Metrics
//! - `dialer_dials_total` (counter): dial attempts by outcome
//! - `dialer_dial_duration_seconds` (histogram): time to a usable connection or failure
//! - `dialer_open_connections` (gauge): live connections
//! - `connection_deadline_rejections_total` (counter): rejected deadlines by kind, reason

use std::time::Instant;

use crate::net::deadline::DeadlineKind;

pub fn record_dial(outcome: &'static str, start: Instant) {
    metrics::counter!("dialer_dials_total", "outcome" => outcome).increment(1);
    metrics::histogram!("dialer_dial_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_open_connections(count: u64) {
    metrics::gauge!("dialer_open_connections").set(count as f64);
}

pub fn record_deadline_rejected(kind: DeadlineKind, reason: &'static str) {
    metrics::counter!(
        "connection_deadline_rejections_total",
        "kind" => kind.as_str(),
        "reason" => reason
    )
    .increment(1);
}
