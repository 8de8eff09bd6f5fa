//! Application error types and error handling utilities
//!
//! This module defines the error system for the yield agent. Every fallible
//! path in the crate returns [`AppError`]; the scheduler and the trade-queue
//! consumer are the two places that catch all non-fatal kinds and translate
//! them into trade records and user notifications.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main application error type that encompasses all possible errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// No wallet (or other entity) exists for the addressed user
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        user_id: Option<String>,
    },

    /// Duplicate wallet creation or import
    #[error("Already exists: {message}")]
    AlreadyExists {
        message: String,
        user_id: Option<String>,
    },

    /// Malformed caller input (bad mnemonic, bad word count, bad address)
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// Caller user ID does not match the target user ID
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        caller_id: String,
        target_id: String,
    },

    /// Network and RPC communication errors (transient)
    #[error("Network error: {message}")]
    Network {
        message: String,
        endpoint: Option<String>,
        #[source]
        source: Option<Box<AppError>>,
    },

    /// A bounded operation did not complete in time (transient)
    #[error("Timeout: {message}")]
    Timeout {
        message: String,
        operation: String,
        duration_ms: u64,
    },

    /// The RPC provider rejected the call despite the local gate (transient)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// A strategy's scan or action failed; isolated to that strategy
    #[error("Strategy error in {strategy}: {message}")]
    Strategy {
        message: String,
        strategy: String,
        user_id: Option<String>,
    },

    /// Storage read or write failed
    #[error("Database error: {message}")]
    Database {
        message: String,
        operation: String,
        #[source]
        source: Option<Box<AppError>>,
    },

    /// Encryption, decryption, or key-derivation failure
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// Configuration missing or invalid at startup; the process refuses to run
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        component: Option<String>,
    },
}

/// Error category, mirroring the taxonomy the scheduler dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Unauthorized,
    TransientRpc,
    Strategy,
    Persistence,
    Security,
    Fatal,
    Internal,
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AppError {
    /// Create a not-found error for a user with no wallet
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
            user_id: None,
        }
    }

    /// Not-found error carrying the user context
    pub fn not_found_for_user<S: Into<String>>(message: S, user_id: S) -> Self {
        Self::NotFound {
            message: message.into(),
            user_id: Some(user_id.into()),
        }
    }

    /// Create an already-exists error
    pub fn already_exists<S: Into<String>>(message: S, user_id: S) -> Self {
        Self::AlreadyExists {
            message: message.into(),
            user_id: Some(user_id.into()),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Invalid mnemonic input (word count, checksum, derivation)
    pub fn invalid_mnemonic<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some("mnemonic".to_string()),
        }
    }

    /// Create an unauthorized error; callers must log these at security level
    pub fn unauthorized<S: Into<String>>(caller_id: S, target_id: S) -> Self {
        let caller_id = caller_id.into();
        let target_id = target_id.into();
        Self::Unauthorized {
            message: format!(
                "caller {} may not access wallet of user {}",
                caller_id, target_id
            ),
            caller_id,
            target_id,
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            endpoint: None,
            source: None,
        }
    }

    /// Network error carrying the endpoint that failed
    pub fn network_at<S: Into<String>>(message: S, endpoint: S) -> Self {
        Self::Network {
            message: message.into(),
            endpoint: Some(endpoint.into()),
            source: None,
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S, operation: S, duration_ms: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a rate-limited error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Create a strategy error with user and strategy context
    pub fn strategy<S: Into<String>>(strategy: S, user_id: S, message: S) -> Self {
        Self::Strategy {
            message: message.into(),
            strategy: strategy.into(),
            user_id: Some(user_id.into()),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S, operation: S) -> Self {
        Self::Database {
            message: message.into(),
            operation: operation.into(),
            source: None,
        }
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(message: S) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            component: None,
        }
    }

    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => {
                ErrorKind::TransientRpc
            }
            Self::Strategy { .. } => ErrorKind::Strategy,
            Self::Database { .. } => ErrorKind::Persistence,
            Self::Crypto { .. } => ErrorKind::Security,
            Self::Config { .. } => ErrorKind::Fatal,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidInput { .. } | Self::RateLimited { .. } => ErrorSeverity::Low,
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::Network { .. }
            | Self::Timeout { .. } => ErrorSeverity::Medium,
            Self::Strategy { .. } => ErrorSeverity::High,
            Self::Unauthorized { .. }
            | Self::Database { .. }
            | Self::Crypto { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Check if this error is transient and safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// Fatal errors abort startup; everything else is caught and isolated
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Whether the underlying cause was a provider rate-limit response
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network { message, .. } => {
                let m = message.to_lowercase();
                m.contains("429") || m.contains("rate limit") || m.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Human-readable guidance for actionable, user-surfaced errors.
    ///
    /// Transient and internal errors return `None`; those stay in operator
    /// logs only.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::AlreadyExists { .. } => Some(
                "You already have a wallet registered. Use the export command to retrieve its recovery phrase.".to_string(),
            ),
            Self::NotFound { .. } => Some(
                "You don't have a wallet yet. Create one first to start trading.".to_string(),
            ),
            Self::InvalidInput { message, .. } => Some(message.clone()),
            Self::Unauthorized { .. } => {
                Some("You do not have permission to access this wallet.".to_string())
            }
            _ => None,
        }
    }

    /// Add a source error, preserving the chain for operator logs
    pub fn with_source(mut self, source: AppError) -> Self {
        match &mut self {
            Self::Network { source: s, .. } | Self::Database { source: s, .. } => {
                *s = Some(Box::new(source));
            }
            _ => {}
        }
        self
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("row not found"),
            _ => Self::database(err.to_string(), "query".to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(format!("HTTP request error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timed out".to_string(), "unknown".to_string(), 0)
    }
}

impl From<solana_client::client_error::ClientError> for AppError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        let message = err.to_string();
        if message.contains("429") || message.to_lowercase().contains("too many requests") {
            Self::rate_limited(message)
        } else {
            Self::network(message)
        }
    }
}

/// Result type alias for the application
pub type AppResult<T> = std::result::Result<T, AppError>;
