//! Utility functions and helpers used throughout the application
//!
//! Cross-cutting concerns: cryptography for the wallet vault, input
//! validation at the trust boundary, telemetry initialization, and CLI
//! argument parsing.

pub mod crypto;
pub mod validation;

/// Telemetry and observability utilities
pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
    };

    /// Initialize global tracing with the specified log level and format
    pub fn init(log_level: &str, log_format: &str) -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let registry = Registry::default().with(env_filter);

        match log_format {
            "json" => {
                registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_file(true)
                            .with_line_number(true),
                    )
                    .try_init()?;
            }
            "compact" => {
                registry
                    .with(fmt::layer().compact().with_target(false))
                    .try_init()?;
            }
            _ => {
                // Default pretty format
                registry
                    .with(fmt::layer().pretty().with_target(true))
                    .try_init()?;
            }
        }

        Ok(())
    }
}

/// Configuration argument parsing utilities
pub mod cli {
    use clap::Parser;

    /// Command line arguments for the agent
    #[derive(Parser, Debug, Clone)]
    #[command(
        name = "solana-yield-agent",
        about = "Multi-tenant custodial yield agent for Solana",
        version = env!("CARGO_PKG_VERSION"),
    )]
    pub struct CliArgs {
        /// Path to configuration file
        #[arg(short, long, env = "YIELD_AGENT_CONFIG")]
        pub config_path: Option<String>,

        /// Logging level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info", env = "YIELD_AGENT_LOG_LEVEL")]
        pub log_level: String,

        /// Log format (json, pretty, compact)
        #[arg(long, default_value = "pretty", env = "YIELD_AGENT_LOG_FORMAT")]
        pub log_format: String,

        /// Environment (development, production, simulation)
        #[arg(short, long, env = "YIELD_AGENT_ENVIRONMENT")]
        pub environment: Option<String>,

        /// Override the base scan interval in seconds
        #[arg(long, env = "YIELD_AGENT_SCAN_INTERVAL")]
        pub scan_interval: Option<u64>,
    }
}

pub use cli::CliArgs;
