//! Configuration loader with multi-source support
//!
//! Layers a TOML file, `YIELD_AGENT__*` environment variables, flat secret
//! aliases, and command-line arguments, in rising precedence order.

use ::config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::models::AppConfig;
use crate::core::error::{AppError, AppResult};
use crate::utils::CliArgs;

/// Configuration loader with support for multiple sources
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Base configuration path
    config_path: Option<PathBuf>,

    /// CLI arguments
    cli_args: Option<CliArgs>,

    /// Disable environment variable loading (used by tests)
    skip_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base configuration path
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set CLI arguments
    pub fn with_cli_args(mut self, args: CliArgs) -> Self {
        self.cli_args = Some(args);
        self
    }

    /// Disable environment variable loading
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Build a default configuration with no external sources applied
    pub fn create_default_config(&self) -> AppConfig {
        AppConfig::default()
    }

    /// Load and merge the complete application configuration
    pub async fn load(self) -> AppResult<AppConfig> {
        let config_path = self.resolve_config_path();

        let mut builder = Config::builder();

        if config_path.exists() {
            info!("loading configuration from {}", config_path.display());
            builder = builder.add_source(
                File::from(config_path.clone()).format(FileFormat::Toml),
            );
        } else {
            warn!(
                "configuration file not found at {}; using defaults",
                config_path.display()
            );
        }

        if !self.skip_env {
            // Structured overrides, e.g. YIELD_AGENT__SCHEDULER__SCAN_INTERVAL_SECS
            builder = builder.add_source(
                Environment::with_prefix("YIELD_AGENT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .ignore_empty(true),
            );
        }

        let mut config: AppConfig = builder
            .build()
            .map_err(|e| AppError::config(format!("configuration assembly failed: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                AppError::config(format!(
                    "failed to parse configuration ({}): {}",
                    config_path.display(),
                    e
                ))
            })?;

        if !self.skip_env {
            Self::apply_secret_aliases(&mut config);
        }

        if let Some(cli_args) = &self.cli_args {
            Self::apply_cli_overrides(&mut config, cli_args);
        }

        debug!(
            environment = %config.environment.name,
            scan_interval = config.scheduler.scan_interval_secs,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Resolve the configuration file path from CLI, env, or defaults
    fn resolve_config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_path {
            return path.clone();
        }

        if let Some(cli_args) = &self.cli_args {
            if let Some(path) = &cli_args.config_path {
                return PathBuf::from(path);
            }
        }

        if let Ok(path) = env::var("YIELD_AGENT_CONFIG") {
            return PathBuf::from(path);
        }

        for candidate in ["configs/agent.toml", "agent.toml", "/etc/yield-agent/agent.toml"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return pb;
            }
        }

        PathBuf::from("configs/agent.toml")
    }

    /// Flat aliases for the secrets operators conventionally export
    fn apply_secret_aliases(config: &mut AppConfig) {
        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(url) = env::var("SOLANA_RPC_URL") {
            config.solana.rpc_url = url;
        }
        if let Ok(secret) = env::var("WALLET_MASTER_SECRET") {
            config.wallet.master_secret = secret;
        }
        if let Ok(url) = env::var("NOTIFIER_WEBHOOK_URL") {
            config.notifier.webhook_url = Some(url);
        }
    }

    /// Apply CLI argument overrides (highest precedence)
    fn apply_cli_overrides(config: &mut AppConfig, cli_args: &CliArgs) {
        if let Some(environment) = &cli_args.environment {
            config.environment.name = environment.clone();
        }
        if let Some(interval) = cli_args.scan_interval {
            config.scheduler.scan_interval_secs = interval;
        }
        config.environment.log_level = cli_args.log_level.clone();
        config.environment.log_format = cli_args.log_format.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::new()
            .without_env()
            .with_config_path("/nonexistent/agent.toml")
            .load()
            .await
            .unwrap();

        assert_eq!(config.scheduler.scan_interval_secs, 300);
    }

    #[tokio::test]
    async fn test_file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [environment]
            name = "simulation"
            log_level = "debug"
            log_format = "json"

            [scheduler]
            scan_interval_secs = 42
            "#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .without_env()
            .with_config_path(file.path())
            .load()
            .await
            .unwrap();

        assert_eq!(config.scheduler.scan_interval_secs, 42);
        // Untouched sections keep their defaults
        assert_eq!(config.scheduler.rpc_batch_size, 10);
        assert!(config.is_simulation());
    }

    #[tokio::test]
    async fn test_cli_overrides_win() {
        let args = crate::utils::CliArgs::parse_from([
            "solana-yield-agent",
            "--environment",
            "simulation",
            "--scan-interval",
            "7",
        ]);

        let config = ConfigLoader::new()
            .without_env()
            .with_config_path("/nonexistent/agent.toml")
            .with_cli_args(args)
            .load()
            .await
            .unwrap();

        assert_eq!(config.scheduler.scan_interval_secs, 7);
        assert!(config.is_simulation());
    }

    #[tokio::test]
    async fn test_malformed_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        let err = ConfigLoader::new()
            .without_env()
            .with_config_path(file.path())
            .load()
            .await
            .unwrap_err();

        assert!(err.is_fatal());
    }
}
