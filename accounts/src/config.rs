//! Accounting configuration.

use chrono::Duration;
use trellis_common::constants;

/// Configuration for the account manager.
#[derive(Debug, Clone)]
pub struct AccountingConfig {
    /// Reservation deadline for two-phase transfers.
    pub transfer_timeout: Duration,
    /// Reservation deadline for withdrawals. `None` leaves withdrawals
    /// pending until explicitly finalized or rolled back.
    pub withdrawal_timeout: Option<Duration>,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: constants::default_transfer_timeout(),
            withdrawal_timeout: None,
        }
    }
}

impl AccountingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("TRELLIS_TRANSFER_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.transfer_timeout = Duration::milliseconds(ms);
            }
        }

        if let Ok(ms) = std::env::var("TRELLIS_WITHDRAWAL_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.withdrawal_timeout = Some(Duration::milliseconds(ms));
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.transfer_timeout < constants::min_transfer_timeout() {
            return Err(format!(
                "Transfer timeout below minimum of {}ms",
                constants::min_transfer_timeout().num_milliseconds()
            ));
        }

        if self.transfer_timeout > constants::max_transfer_timeout() {
            return Err(format!(
                "Transfer timeout above maximum of {}s",
                constants::max_transfer_timeout().num_seconds()
            ));
        }

        if let Some(timeout) = self.withdrawal_timeout {
            if timeout <= Duration::zero() {
                return Err("Withdrawal timeout must be positive".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AccountingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.withdrawal_timeout.is_none());
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let mut config = AccountingConfig::default();
        config.transfer_timeout = Duration::milliseconds(1);
        assert!(config.validate().is_err());

        config.transfer_timeout = Duration::hours(2);
        assert!(config.validate().is_err());
    }
}
