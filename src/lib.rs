//! Solana Yield Agent Library
//!
//! Multi-tenant custodial trading agent for Solana. Each registered user
//! owns an isolated keypair custodied by the agent; a continuous scan cycle
//! inspects every user's balance, runs the enabled strategies on their
//! behalf, ranks the produced opportunities through a pluggable decision
//! engine, and executes approved trades through a strictly serialized queue.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! │        composition root · lifecycle · health checks          │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Services Layer                         │
//! │  wallet │ balance │ price │ scanner │ ranker │ trading │     │
//! │  scheduler │ ratelimit │ notifier │ commands │ solana        │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Infrastructure Layer                      │
//! │        database (postgres / memory) │ security vault         │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Core Layer                           │
//! │              errors │ results │ domain types                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Tenant isolation
//!
//! - exactly zero or one wallet per user, enforced in storage
//! - every persistence query filters by user ID in SQL
//! - each trade is signed with the owning user's keypair only
//! - a failure for one user never removes another from the cycle
//!
//! # Usage
//!
//! ```rust,no_run
//! use solana_yield_agent::{
//!     application::Application,
//!     config::ConfigLoader,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load().await?;
//!     let app = Application::build(config).await?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Core layer - domain types, errors, and result helpers
pub mod core;

// Configuration management - multi-source loading and validation
pub mod config;

// Infrastructure layer - persistence and custody primitives
pub mod infrastructure;

// Services layer - the trading engine components
pub mod services;

// Application layer - composition root and lifecycle
pub mod application;

// Utilities - crypto, validation, telemetry, CLI
pub mod utils;

// Re-export commonly used types for embedders
pub use crate::application::{Application, Collaborators};
pub use crate::config::{AppConfig, ConfigLoader};
pub use crate::core::{
    error::{AppError, AppResult},
    types::*,
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
    }
}
