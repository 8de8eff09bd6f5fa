//! Configuration validation rules
//!
//! Startup validation of the loaded configuration. Errors here are fatal:
//! the process refuses to start rather than run a custodial trading loop
//! against a half-configured environment.

use crate::config::models::AppConfig;
use crate::core::error::{AppError, AppResult};
use crate::utils::validation::validate_url;

/// Minimum scan interval the scheduler will accept, in seconds
pub const MIN_SCAN_INTERVAL_SECS: u64 = 5;

/// Result of validating a configuration
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AppConfig {
    /// Validate the configuration, collecting all problems at once.
    ///
    /// Returns `AppError::Config` (fatal) when any error is present; the
    /// caller is expected to log warnings and proceed.
    pub fn validate(&self) -> AppResult<ValidationResult> {
        let mut result = ValidationResult::default();

        // Environment
        match self.environment.name.as_str() {
            "development" | "production" | "simulation" => {}
            other => result
                .errors
                .push(format!("unknown environment '{}'", other)),
        }

        // Chain access is mandatory outside simulation
        if !self.is_simulation() {
            if self.solana.rpc_url.is_empty() {
                result.errors.push("solana.rpc_url is required".to_string());
            } else if let Err(e) = validate_url(&self.solana.rpc_url) {
                result.errors.push(format!("solana.rpc_url: {}", e));
            }

            if self.database.url.is_empty() {
                result
                    .errors
                    .push("database.url is required outside simulation".to_string());
            }

            if self.wallet.master_secret.is_empty() {
                result
                    .errors
                    .push("wallet.master_secret is required outside simulation".to_string());
            } else if self.is_production() && self.wallet.master_secret.len() < 32 {
                result
                    .errors
                    .push("wallet.master_secret must be at least 32 characters in production".to_string());
            }
        }

        // Scheduler bounds
        if self.scheduler.scan_interval_secs < MIN_SCAN_INTERVAL_SECS {
            result.errors.push(format!(
                "scheduler.scan_interval_secs must be >= {}",
                MIN_SCAN_INTERVAL_SECS
            ));
        }
        if self.scheduler.rpc_batch_size == 0 {
            result
                .errors
                .push("scheduler.rpc_batch_size must be positive".to_string());
        }
        if self.scheduler.min_trading_balance == 0 {
            result
                .warnings
                .push("scheduler.min_trading_balance is 0; every funded wallet will trade".to_string());
        }
        if self.scheduler.scan_concurrency == 0 || self.scheduler.balance_batch_concurrency == 0 {
            result
                .errors
                .push("scheduler concurrency settings must be positive".to_string());
        }
        if !(0.0..=10.0).contains(&self.scheduler.rate_limit_backoff) {
            result
                .errors
                .push("scheduler.rate_limit_backoff out of range".to_string());
        }

        // Rate gate
        if self.rate_limit.sustained <= 0.0 || self.rate_limit.burst <= 0.0 {
            result
                .errors
                .push("rate_limit.sustained and rate_limit.burst must be positive".to_string());
        }
        if self.rate_limit.burst < self.rate_limit.sustained {
            result.warnings.push(
                "rate_limit.burst below sustained rate; the gate will throttle steady load".to_string(),
            );
        }

        // Trading
        if self.trading.queue_capacity == 0 {
            result
                .errors
                .push("trading.queue_capacity must be positive".to_string());
        }
        if self.trading.confirmation_timeout_secs == 0 {
            result
                .errors
                .push("trading.confirmation_timeout_secs must be positive".to_string());
        }

        // Notifier
        if let Some(url) = &self.notifier.webhook_url {
            if let Err(e) = validate_url(url) {
                result.errors.push(format!("notifier.webhook_url: {}", e));
            }
        }

        if result.is_valid() {
            Ok(result)
        } else {
            Err(AppError::config(format!(
                "configuration invalid: {}",
                result.errors.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::AppConfig;

    fn simulation_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.environment.name = "simulation".to_string();
        cfg
    }

    #[test]
    fn test_simulation_config_is_valid_without_secrets() {
        assert!(simulation_config().validate().is_ok());
    }

    #[test]
    fn test_development_requires_database_and_secret() {
        let cfg = AppConfig::default();
        let err = cfg.validate().unwrap_err();
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("database.url"));
        assert!(msg.contains("master_secret"));
    }

    #[test]
    fn test_scan_interval_floor() {
        let mut cfg = simulation_config();
        cfg.scheduler.scan_interval_secs = 1;
        assert!(cfg.validate().is_err());

        cfg.scheduler.scan_interval_secs = MIN_SCAN_INTERVAL_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_production_secret_length() {
        let mut cfg = AppConfig::default();
        cfg.environment.name = "production".to_string();
        cfg.database.url = "postgres://localhost/agent".to_string();
        cfg.solana.rpc_url = "https://api.mainnet-beta.solana.com".to_string();
        cfg.wallet.master_secret = "short".to_string();
        assert!(cfg.validate().is_err());

        cfg.wallet.master_secret = "a".repeat(48);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_bad_webhook_url_rejected() {
        let mut cfg = simulation_config();
        cfg.notifier.webhook_url = Some("ftp://sink.example.com".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut cfg = simulation_config();
        cfg.trading.queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
