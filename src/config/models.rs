//! Configuration data structures and models
//!
//! The complete configuration surface of the agent: one section per
//! subsystem, serde-backed, with defaults chosen for a small deployment
//! against a rate-limited public RPC endpoint.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Solana RPC configuration
    #[serde(default)]
    pub solana: SolanaConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Custodial wallet vault configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Scan-cycle scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Shared RPC gate (token bucket) configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Shared price cache configuration
    #[serde(default)]
    pub price_cache: PriceCacheConfig,

    /// Trade queue and execution configuration
    #[serde(default)]
    pub trading: TradingConfig,

    /// Notification sink configuration
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name (development, production, simulation)
    pub name: String,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (json, pretty, compact)
    pub log_format: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Solana RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    /// RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Commitment level (processed, confirmed, finalized)
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: default_commitment(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Enable automatic migrations at startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Slow query warning threshold in milliseconds
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_threshold_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_migrate: true,
            slow_query_threshold_ms: default_slow_query_ms(),
        }
    }
}

/// Custodial wallet vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Directory holding one encrypted blob per user
    #[serde(default = "default_vault_dir")]
    pub storage_dir: String,

    /// System-held secret the per-user encryption keys are derived from
    #[serde(default)]
    pub master_secret: String,

    /// Derivation path recorded with every wallet
    #[serde(default = "default_derivation_path")]
    pub derivation_path: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_vault_dir(),
            master_secret: String::new(),
            derivation_path: default_derivation_path(),
        }
    }
}

/// Scan-cycle scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Base cycle period in seconds; floor enforced at 5
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Balance threshold below which a user's scan is skipped, in lamports
    #[serde(default = "default_min_trading_balance")]
    pub min_trading_balance: u64,

    /// Balances fetched per batch RPC
    #[serde(default = "default_rpc_batch_size")]
    pub rpc_batch_size: usize,

    /// User count above which cycles are staggered
    #[serde(default = "default_stagger_threshold")]
    pub stagger_threshold_users: usize,

    /// Seconds over which staggered slots are spread
    #[serde(default = "default_stagger_window")]
    pub stagger_window_secs: u64,

    /// Factor added to the interval after a rate-limit signal (0.5 = +50%)
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff: f64,

    /// Consecutive empty cycles before the interval widens
    #[serde(default = "default_empty_scan_threshold")]
    pub empty_scan_threshold: u32,

    /// Extra sleep in seconds once the empty-scan threshold is reached
    #[serde(default = "default_empty_scan_extra")]
    pub empty_scan_extra_secs: u64,

    /// Workers draining the balance-batch queue
    #[serde(default = "default_batch_concurrency")]
    pub balance_batch_concurrency: usize,

    /// Concurrent per-user scans
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Upper bound on one user's scan, in seconds
    #[serde(default = "default_per_user_timeout")]
    pub per_user_scan_timeout_secs: u64,

    /// Seconds a balance reading stays fresh
    #[serde(default = "default_balance_cache_ttl")]
    pub balance_cache_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            min_trading_balance: default_min_trading_balance(),
            rpc_batch_size: default_rpc_batch_size(),
            stagger_threshold_users: default_stagger_threshold(),
            stagger_window_secs: default_stagger_window(),
            rate_limit_backoff: default_rate_limit_backoff(),
            empty_scan_threshold: default_empty_scan_threshold(),
            empty_scan_extra_secs: default_empty_scan_extra(),
            balance_batch_concurrency: default_batch_concurrency(),
            scan_concurrency: default_scan_concurrency(),
            per_user_scan_timeout_secs: default_per_user_timeout(),
            balance_cache_ttl_secs: default_balance_cache_ttl(),
        }
    }
}

/// Token-bucket parameters for the shared RPC gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained tokens per second
    #[serde(default = "default_sustained_rate")]
    pub sustained: f64,

    /// Burst size (bucket capacity)
    #[serde(default = "default_burst")]
    pub burst: f64,

    /// Seconds the gate stays penalized after a provider rate-limit response
    #[serde(default = "default_penalty_secs")]
    pub penalty_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sustained: default_sustained_rate(),
            burst: default_burst(),
            penalty_secs: default_penalty_secs(),
        }
    }
}

/// Shared price cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceCacheConfig {
    /// Seconds a price entry remains fresh
    #[serde(default = "default_price_ttl")]
    pub ttl_secs: u64,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_price_ttl(),
        }
    }
}

/// Trade queue and execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Bounded queue capacity; producers block when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to await chain confirmation per trade
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Minimum expected profit for the rule-based decision engine, lamports
    #[serde(default = "default_profit_floor")]
    pub profit_floor_lamports: u64,

    /// Lamports kept back from sizing to cover fees
    #[serde(default = "default_fee_reserve")]
    pub fee_reserve_lamports: u64,

    /// Fraction of balance a low-risk trade may use
    #[serde(default = "default_fraction_low")]
    pub position_fraction_low: Decimal,

    /// Fraction of balance a medium-risk trade may use
    #[serde(default = "default_fraction_medium")]
    pub position_fraction_medium: Decimal,

    /// Fraction of balance a high-risk trade may use
    #[serde(default = "default_fraction_high")]
    pub position_fraction_high: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            profit_floor_lamports: default_profit_floor(),
            fee_reserve_lamports: default_fee_reserve(),
            position_fraction_low: default_fraction_low(),
            position_fraction_medium: default_fraction_medium(),
            position_fraction_high: default_fraction_high(),
        }
    }
}

/// Notification sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook endpoint; absent means the tracing sink is used
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

impl AppConfig {
    /// Whether the agent runs against real chain state
    pub fn is_production(&self) -> bool {
        self.environment.name == "production"
    }

    /// Whether the agent runs fully in-process (memory stores, no submission)
    pub fn is_simulation(&self) -> bool {
        self.environment.name == "simulation"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            solana: SolanaConfig::default(),
            database: DatabaseConfig::default(),
            wallet: WalletConfig::default(),
            scheduler: SchedulerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            price_cache: PriceCacheConfig::default(),
            trading: TradingConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_slow_query_ms() -> u64 {
    500
}

fn default_vault_dir() -> String {
    "data/secure_wallets".to_string()
}

fn default_derivation_path() -> String {
    "m/44'/501'/0'/0'/0'".to_string()
}

fn default_scan_interval() -> u64 {
    300
}

fn default_min_trading_balance() -> u64 {
    10_000_000
}

fn default_rpc_batch_size() -> usize {
    10
}

fn default_stagger_threshold() -> usize {
    100
}

fn default_stagger_window() -> u64 {
    60
}

fn default_rate_limit_backoff() -> f64 {
    0.5
}

fn default_empty_scan_threshold() -> u32 {
    10
}

fn default_empty_scan_extra() -> u64 {
    30
}

fn default_batch_concurrency() -> usize {
    3
}

fn default_scan_concurrency() -> usize {
    3
}

fn default_per_user_timeout() -> u64 {
    30
}

fn default_balance_cache_ttl() -> u64 {
    30
}

fn default_sustained_rate() -> f64 {
    10.0
}

fn default_burst() -> f64 {
    20.0
}

fn default_penalty_secs() -> u64 {
    60
}

fn default_price_ttl() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    64
}

fn default_confirmation_timeout() -> u64 {
    60
}

fn default_profit_floor() -> u64 {
    10_000
}

fn default_fee_reserve() -> u64 {
    10_000
}

fn default_fraction_low() -> Decimal {
    rust_decimal_macros::dec!(0.25)
}

fn default_fraction_medium() -> Decimal {
    rust_decimal_macros::dec!(0.10)
}

fn default_fraction_high() -> Decimal {
    rust_decimal_macros::dec!(0.05)
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}
