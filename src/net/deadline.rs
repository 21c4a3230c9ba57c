//! Deadline window policy.
//!
//! A deadline is accepted only when it lies in `(now, now + max_horizon]`.
//! The check is a pure function of the candidate and the current instant so a
//! rejected call never touches connection state.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default upper bound on how far in the future a deadline may be set.
pub const DEFAULT_MAX_HORIZON: Duration = Duration::from_secs(10 * 60);

/// Which deadline setter was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    /// Read and write together.
    Both,
    Read,
    Write,
}

impl DeadlineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineKind::Both => "both",
            DeadlineKind::Read => "read",
            DeadlineKind::Write => "write",
        }
    }
}

impl fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a deadline was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeadlineError {
    /// The deadline is at or before the moment of validation.
    #[error("deadline is not in the future ({behind:?} at or before now)")]
    NotInFuture { behind: Duration },

    /// The deadline is further out than the permitted horizon.
    #[error("deadline is {ahead:?} in the future, beyond the {max_horizon:?} horizon")]
    BeyondHorizon { ahead: Duration, max_horizon: Duration },
}

impl DeadlineError {
    pub fn reason(&self) -> &'static str {
        match self {
            DeadlineError::NotInFuture { .. } => "not_in_future",
            DeadlineError::BeyondHorizon { .. } => "beyond_horizon",
        }
    }
}

/// Bounds applied to every deadline before it reaches the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlinePolicy {
    max_horizon: Duration,
}

impl DeadlinePolicy {
    pub fn new(max_horizon: Duration) -> Self {
        Self { max_horizon }
    }

    pub fn max_horizon(&self) -> Duration {
        self.max_horizon
    }

    /// Validate `deadline` against `now`.
    ///
    /// `deadline == now` is rejected; `deadline == now + max_horizon` is accepted.
    pub fn check(&self, deadline: Instant, now: Instant) -> Result<(), DeadlineError> {
        if deadline <= now {
            return Err(DeadlineError::NotInFuture {
                behind: now.saturating_duration_since(deadline),
            });
        }

        let ahead = deadline.duration_since(now);
        if ahead > self.max_horizon {
            return Err(DeadlineError::BeyondHorizon {
                ahead,
                max_horizon: self.max_horizon,
            });
        }

        Ok(())
    }
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HORIZON)
    }
}
