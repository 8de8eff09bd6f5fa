//! Persistence boundary: repository traits and row models
//!
//! The core never sees a query string. Services talk to these traits; the
//! Postgres implementation binds every input as a parameter and filters every
//! tenant query by user ID in SQL. The in-memory implementation backs
//! simulation mode and the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::AppResult;
use crate::core::types::{
    LeaderboardEntry, PerformanceMetrics, TradeOutcome, TradeRecord, UserId,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Wallet metadata row (`secure_wallets`)
#[derive(Debug, Clone)]
pub struct WalletMetadata {
    pub wallet_id: i64,
    pub user_id: UserId,
    pub public_key: String,
    pub derivation_path: String,
    pub mnemonic_word_count: u8,
    pub kdf_method: String,
    pub encryption_method: String,
    pub created_at: DateTime<Utc>,
    pub last_unlocked: Option<DateTime<Utc>>,
    /// Path to the encrypted blob on disk
    pub blob_path: String,
}

/// Fields for a new wallet registration; the store assigns the ID
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub user_id: UserId,
    pub public_key: String,
    pub derivation_path: String,
    pub mnemonic_word_count: u8,
    pub kdf_method: String,
    pub encryption_method: String,
    pub blob_path: String,
}

/// Per-user preferences (`users.preferences`)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserPreferences {
    /// Strategies the user opted into; `None` means all registered strategies
    #[serde(default)]
    pub enabled_strategies: Option<Vec<String>>,

    /// Whether the user receives notifications at all
    #[serde(default = "default_notifications")]
    pub notifications_enabled: bool,
}

fn default_notifications() -> bool {
    true
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            enabled_strategies: None,
            notifications_enabled: true,
        }
    }
}

impl UserPreferences {
    /// Whether the named strategy is enabled for this user
    pub fn strategy_enabled(&self, name: &str) -> bool {
        match &self.enabled_strategies {
            None => true,
            Some(list) => list.iter().any(|s| s == name),
        }
    }
}

/// Fields for a new trade record; the store assigns the monotonic ID
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub user_id: UserId,
    pub strategy_name: String,
    pub action: String,
    pub amount: u64,
    pub profit: i64,
    pub tx_signature: Option<String>,
    pub outcome: TradeOutcome,
    pub details: serde_json::Value,
}

/// Persisted balance observation, reloaded at startup so restarts do not
/// replay activation notifications
#[derive(Debug, Clone, Copy)]
pub struct StoredBalance {
    pub lamports: u64,
    pub observed_at: DateTime<Utc>,
}

/// Wallet metadata persistence (C11)
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Insert a wallet row; fails with `AlreadyExists` when the user is
    /// already provisioned
    async fn insert_wallet(&self, wallet: NewWallet) -> AppResult<WalletMetadata>;

    async fn get_wallet(&self, user_id: &UserId) -> AppResult<Option<WalletMetadata>>;

    /// Every user with a wallet; the scheduler's cycle population
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>>;

    async fn touch_last_unlocked(&self, user_id: &UserId) -> AppResult<()>;
}

/// User row and preferences persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create the user row if it does not exist
    async fn ensure_user(&self, user_id: &UserId) -> AppResult<()>;

    async fn get_preferences(&self, user_id: &UserId) -> AppResult<UserPreferences>;

    async fn set_preferences(
        &self,
        user_id: &UserId,
        preferences: &UserPreferences,
    ) -> AppResult<()>;
}

/// Append-only trade log and derived aggregates
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Durably append one execution attempt, returning the assigned record
    async fn append_trade(&self, trade: NewTrade) -> AppResult<TradeRecord>;

    /// Most recent trades for one user, newest first
    async fn trades_for_user(&self, user_id: &UserId, limit: u32) -> AppResult<Vec<TradeRecord>>;

    /// Aggregate metrics for one user, computed store-side
    async fn metrics_for_user(&self, user_id: &UserId) -> AppResult<PerformanceMetrics>;

    /// Top-N users by total profit, anonymized
    async fn leaderboard(&self, limit: u32) -> AppResult<Vec<LeaderboardEntry>>;
}

/// Balance snapshot persistence for crossing detection across restarts
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn upsert_balance(&self, user_id: &UserId, snapshot: StoredBalance) -> AppResult<()>;

    async fn load_balances(&self) -> AppResult<HashMap<UserId, StoredBalance>>;
}

/// Bundle of repository handles wired at composition time
#[derive(Clone)]
pub struct Repositories {
    pub wallets: Arc<dyn WalletRepository>,
    pub users: Arc<dyn UserRepository>,
    pub trades: Arc<dyn TradeRepository>,
    pub balances: Arc<dyn BalanceRepository>,
}

impl Repositories {
    /// All repositories served by a single in-memory store
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            wallets: store.clone(),
            users: store.clone(),
            trades: store.clone(),
            balances: store,
        }
    }

    /// All repositories served by the shared Postgres pool
    pub fn postgres(store: Arc<PostgresStore>) -> Self {
        Self {
            wallets: store.clone(),
            users: store.clone(),
            trades: store.clone(),
            balances: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default_enables_everything() {
        let prefs = UserPreferences::default();
        assert!(prefs.strategy_enabled("anything"));
        assert!(prefs.notifications_enabled);
        let parsed: UserPreferences = serde_json::from_str("{}").unwrap();
        assert!(parsed.notifications_enabled);
    }

    #[test]
    fn test_preferences_explicit_list_filters() {
        let prefs = UserPreferences {
            enabled_strategies: Some(vec!["staking".to_string()]),
            notifications_enabled: true,
        };
        assert!(prefs.strategy_enabled("staking"));
        assert!(!prefs.strategy_enabled("airdrops"));
    }
}
