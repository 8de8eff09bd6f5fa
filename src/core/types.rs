//! Core type definitions and value objects for the domain model
//!
//! Strongly-typed wrappers around primitive values plus the domain entities
//! (opportunities, trade records, metrics) shared by the scheduler, the trade
//! queue, and the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Opaque tenant identifier (a chat-platform ID in practice)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID with shape validation
    pub fn new(id: impl Into<String>) -> Result<Self, crate::core::error::AppError> {
        let id = id.into();
        crate::utils::validation::validate_user_id(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (trusted internal paths only)
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = crate::core::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Solana wallet address (base58 public key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Create a new wallet address with validation
    pub fn new(address: impl Into<String>) -> Result<Self, crate::core::error::AppError> {
        let address = address.into();
        crate::utils::validation::validate_solana_address(&address)?;
        Ok(Self(address))
    }

    /// Create without validation (use with caution)
    pub fn new_unchecked(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Solana transaction signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl TxSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount in the chain's base units (lamports; 10^9 per SOL)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Lamports(pub u64);

impl Lamports {
    pub const ZERO: Self = Self(0);

    pub fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Convert a SOL amount to lamports, truncating below one lamport
    pub fn from_sol(sol: Decimal) -> Self {
        let lamports = (sol * Decimal::from(LAMPORTS_PER_SOL))
            .to_u64()
            .unwrap_or(0);
        Self(lamports)
    }

    /// Convert to SOL for display
    pub fn to_sol(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(LAMPORTS_PER_SOL)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(&self, other: Lamports) -> Lamports {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(&self, other: Lamports) -> Lamports {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SOL", self.to_sol())
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Age relative to now
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Risk classification assigned by the decision engine, used for sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = crate::core::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(crate::core::error::AppError::invalid_input(format!(
                "invalid risk tier: {}",
                s
            ))),
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Submitted and confirmed on chain
    Confirmed,
    /// Submission or execution failed
    Failed,
    /// Submission sent but confirmation did not arrive within the bound
    TimedOut,
    /// Rejected before submission (sizing, missing wallet)
    Rejected,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeOutcome {
    type Err = crate::core::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            "rejected" => Ok(Self::Rejected),
            _ => Err(crate::core::error::AppError::invalid_input(format!(
                "invalid trade outcome: {}",
                s
            ))),
        }
    }
}

/// A candidate action produced by a strategy; transient, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Owning user
    pub user_id: UserId,
    /// Strategy that produced this opportunity
    pub strategy_name: String,
    /// Action descriptor, opaque to the core ("stake", "claim", "swap", ...)
    pub action: String,
    /// Amount involved, base units
    pub amount: Lamports,
    /// Expected profit estimate, base units
    pub expected_profit: Lamports,
    /// Strategy's own risk assessment
    pub risk_tier: RiskTier,
    /// Strategy-specific payload, forwarded into the trade record details
    pub details: serde_json::Value,
    /// When the opportunity was found
    pub discovered_at: Timestamp,
}

/// Durable artifact of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Monotonic trade ID assigned by the store on append
    pub trade_id: i64,
    pub user_id: UserId,
    pub strategy_name: String,
    pub action: String,
    /// Amount in base units
    pub amount: Lamports,
    /// Realized profit in base units; negative on loss
    pub profit: i64,
    /// Chain signature; `None` when submission failed
    pub tx_signature: Option<TxSignature>,
    pub outcome: TradeOutcome,
    pub executed_at: Timestamp,
    /// Free-form details map
    pub details: serde_json::Value,
}

/// Aggregated per-user performance, recomputed from trade records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total realized profit, base units (signed)
    pub total_profit: i64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Percentage of confirmed trades, 0-100
    pub win_rate: f64,
    /// Largest single-trade profit
    pub best_trade: i64,
    /// Largest single-trade loss
    pub worst_trade: i64,
    /// Realized profit per strategy
    pub profit_by_strategy: HashMap<String, i64>,
}

/// One anonymized leaderboard row; deliberately carries no user identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    /// Total realized profit, base units
    pub profit: i64,
    /// Win rate percentage, 0-100
    pub win_rate: f64,
}
