//! Time utilities and constants for the Trellis ledger.

use chrono::{DateTime, Duration, Utc};

/// Ledger timing constants.
pub mod constants {
    use super::Duration;

    /// Default reservation timeout for two-phase transfers (10 seconds).
    pub fn default_transfer_timeout() -> Duration {
        Duration::seconds(10)
    }

    /// Minimum accepted reservation timeout (10 milliseconds).
    pub fn min_transfer_timeout() -> Duration {
        Duration::milliseconds(10)
    }

    /// Maximum accepted reservation timeout (15 minutes).
    pub fn max_transfer_timeout() -> Duration {
        Duration::minutes(15)
    }

    /// Interval between background expiry sweeps (500 milliseconds).
    pub fn expiry_sweep_interval() -> Duration {
        Duration::milliseconds(500)
    }
}

/// A timestamp with timezone (always UTC for the ledger).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a deadline has passed.
pub fn is_expired(deadline: Timestamp) -> bool {
    now() > deadline
}

/// Calculate a deadline the given duration from now.
pub fn expires_in(duration: Duration) -> Timestamp {
    now() + duration
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
