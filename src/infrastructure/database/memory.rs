//! In-memory persistence implementation
//!
//! Serves every repository trait from process memory. Used in simulation
//! mode and throughout the test suite; semantics mirror the Postgres store,
//! including unique-wallet enforcement and monotonic trade IDs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    BalanceRepository, NewTrade, NewWallet, StoredBalance, TradeRepository, UserPreferences,
    UserRepository, WalletMetadata, WalletRepository,
};
use crate::core::error::{AppError, AppResult};
use crate::core::types::{
    LeaderboardEntry, Lamports, PerformanceMetrics, Timestamp, TradeRecord, TxSignature, UserId,
};

#[derive(Default)]
struct Inner {
    wallets: HashMap<UserId, WalletMetadata>,
    next_wallet_id: i64,
    preferences: HashMap<UserId, UserPreferences>,
    trades: Vec<TradeRecord>,
    next_trade_id: i64,
    last_executed_at: Option<DateTime<Utc>>,
    balances: HashMap<UserId, StoredBalance>,
}

/// Memory-backed store serving all repository traits
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded trades across all users (test helper)
    pub fn trade_count(&self) -> usize {
        self.inner.lock().expect("store lock").trades.len()
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn insert_wallet(&self, wallet: NewWallet) -> AppResult<WalletMetadata> {
        let mut inner = self.inner.lock().expect("store lock");

        if inner.wallets.contains_key(&wallet.user_id) {
            return Err(AppError::already_exists(
                "wallet already registered".to_string(),
                wallet.user_id.to_string(),
            ));
        }
        if inner
            .wallets
            .values()
            .any(|w| w.public_key == wallet.public_key)
        {
            return Err(AppError::already_exists(
                "public key already registered".to_string(),
                wallet.user_id.to_string(),
            ));
        }

        inner.next_wallet_id += 1;
        let metadata = WalletMetadata {
            wallet_id: inner.next_wallet_id,
            user_id: wallet.user_id.clone(),
            public_key: wallet.public_key,
            derivation_path: wallet.derivation_path,
            mnemonic_word_count: wallet.mnemonic_word_count,
            kdf_method: wallet.kdf_method,
            encryption_method: wallet.encryption_method,
            created_at: Utc::now(),
            last_unlocked: None,
            blob_path: wallet.blob_path,
        };
        inner.wallets.insert(wallet.user_id, metadata.clone());
        Ok(metadata)
    }

    async fn get_wallet(&self, user_id: &UserId) -> AppResult<Option<WalletMetadata>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .wallets
            .get(user_id)
            .cloned())
    }

    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        let inner = self.inner.lock().expect("store lock");
        let mut wallets: Vec<&WalletMetadata> = inner.wallets.values().collect();
        // Registration order, matching the Postgres ORDER BY wallet_id
        wallets.sort_by_key(|w| w.wallet_id);
        Ok(wallets.iter().map(|w| w.user_id.clone()).collect())
    }

    async fn touch_last_unlocked(&self, user_id: &UserId) -> AppResult<()> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(wallet) = inner.wallets.get_mut(user_id) {
            wallet.last_unlocked = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn ensure_user(&self, user_id: &UserId) -> AppResult<()> {
        self.inner
            .lock()
            .expect("store lock")
            .preferences
            .entry(user_id.clone())
            .or_default();
        Ok(())
    }

    async fn get_preferences(&self, user_id: &UserId) -> AppResult<UserPreferences> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .preferences
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_preferences(
        &self,
        user_id: &UserId,
        preferences: &UserPreferences,
    ) -> AppResult<()> {
        self.inner
            .lock()
            .expect("store lock")
            .preferences
            .insert(user_id.clone(), preferences.clone());
        Ok(())
    }
}

#[async_trait]
impl TradeRepository for MemoryStore {
    async fn append_trade(&self, trade: NewTrade) -> AppResult<TradeRecord> {
        let mut inner = self.inner.lock().expect("store lock");

        inner.next_trade_id += 1;

        // Timestamps stay strictly increasing in append order even when two
        // appends land inside one clock tick
        let now = Utc::now();
        let executed_at = match inner.last_executed_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_executed_at = Some(executed_at);

        let record = TradeRecord {
            trade_id: inner.next_trade_id,
            user_id: trade.user_id,
            strategy_name: trade.strategy_name,
            action: trade.action,
            amount: Lamports::new(trade.amount),
            profit: trade.profit,
            tx_signature: trade.tx_signature.map(TxSignature::new),
            outcome: trade.outcome,
            executed_at: Timestamp::from_datetime(executed_at),
            details: trade.details,
        };
        inner.trades.push(record.clone());
        Ok(record)
    }

    async fn trades_for_user(&self, user_id: &UserId, limit: u32) -> AppResult<Vec<TradeRecord>> {
        let inner = self.inner.lock().expect("store lock");
        let mut trades: Vec<TradeRecord> = inner
            .trades
            .iter()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| std::cmp::Reverse(t.trade_id));
        trades.truncate(limit as usize);
        Ok(trades)
    }

    async fn metrics_for_user(&self, user_id: &UserId) -> AppResult<PerformanceMetrics> {
        let inner = self.inner.lock().expect("store lock");
        let trades: Vec<&TradeRecord> = inner
            .trades
            .iter()
            .filter(|t| &t.user_id == user_id)
            .collect();

        if trades.is_empty() {
            return Ok(PerformanceMetrics::default());
        }

        let total_trades = trades.len() as u64;
        let winning_trades = trades.iter().filter(|t| t.profit > 0).count() as u64;
        let losing_trades = trades.iter().filter(|t| t.profit < 0).count() as u64;
        let mut profit_by_strategy: HashMap<String, i64> = HashMap::new();
        for trade in &trades {
            *profit_by_strategy
                .entry(trade.strategy_name.clone())
                .or_insert(0) += trade.profit;
        }

        Ok(PerformanceMetrics {
            total_profit: trades.iter().map(|t| t.profit).sum(),
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: winning_trades as f64 / total_trades as f64 * 100.0,
            best_trade: trades.iter().map(|t| t.profit).max().unwrap_or(0),
            worst_trade: trades.iter().map(|t| t.profit).min().unwrap_or(0),
            profit_by_strategy,
        })
    }

    async fn leaderboard(&self, limit: u32) -> AppResult<Vec<LeaderboardEntry>> {
        let inner = self.inner.lock().expect("store lock");

        let mut per_user: HashMap<&UserId, (i64, u64, u64)> = HashMap::new();
        for trade in &inner.trades {
            let entry = per_user.entry(&trade.user_id).or_insert((0, 0, 0));
            entry.0 += trade.profit;
            entry.1 += 1;
            if trade.profit > 0 {
                entry.2 += 1;
            }
        }

        let mut rows: Vec<(i64, f64)> = per_user
            .values()
            .map(|(profit, total, wins)| (*profit, *wins as f64 / (*total).max(1) as f64 * 100.0))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.truncate(limit as usize);

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(idx, (profit, win_rate))| LeaderboardEntry {
                rank: idx as u32 + 1,
                profit,
                win_rate,
            })
            .collect())
    }
}

#[async_trait]
impl BalanceRepository for MemoryStore {
    async fn upsert_balance(&self, user_id: &UserId, snapshot: StoredBalance) -> AppResult<()> {
        self.inner
            .lock()
            .expect("store lock")
            .balances
            .insert(user_id.clone(), snapshot);
        Ok(())
    }

    async fn load_balances(&self) -> AppResult<HashMap<UserId, StoredBalance>> {
        Ok(self.inner.lock().expect("store lock").balances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TradeOutcome;

    fn new_trade(user: &str, strategy: &str, profit: i64) -> NewTrade {
        NewTrade {
            user_id: UserId::new_unchecked(user),
            strategy_name: strategy.to_string(),
            action: "stake".to_string(),
            amount: 1_000_000,
            profit,
            tx_signature: Some(format!("sig-{}-{}", user, profit)),
            outcome: if profit >= 0 {
                TradeOutcome::Confirmed
            } else {
                TradeOutcome::Failed
            },
            details: serde_json::json!({}),
        }
    }

    fn new_wallet(user: &str, pubkey: &str) -> NewWallet {
        NewWallet {
            user_id: UserId::new_unchecked(user),
            public_key: pubkey.to_string(),
            derivation_path: "m/44'/501'/0'/0'/0'".to_string(),
            mnemonic_word_count: 12,
            kdf_method: "pbkdf2-hmac-sha256".to_string(),
            encryption_method: "aes-256-gcm".to_string(),
            blob_path: format!("/tmp/{}.enc", user),
        }
    }

    #[tokio::test]
    async fn test_one_wallet_per_user() {
        let store = MemoryStore::new();
        store.insert_wallet(new_wallet("u1", "pk1")).await.unwrap();

        let err = store
            .insert_wallet(new_wallet("u1", "pk2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists { .. }));

        // Storage unchanged
        assert_eq!(store.list_user_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_public_key_unique_across_wallets() {
        let store = MemoryStore::new();
        store.insert_wallet(new_wallet("u1", "pk1")).await.unwrap();
        let err = store
            .insert_wallet(new_wallet("u2", "pk1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_trade_ids_and_timestamps_monotonic() {
        let store = MemoryStore::new();
        let mut previous: Option<TradeRecord> = None;
        for i in 0..50 {
            let record = store
                .append_trade(new_trade(&format!("u{}", i % 5), "staking", i))
                .await
                .unwrap();
            if let Some(prev) = &previous {
                assert!(record.trade_id > prev.trade_id);
                assert!(record.executed_at > prev.executed_at);
            }
            previous = Some(record);
        }
    }

    #[tokio::test]
    async fn test_metrics_filtered_by_user() {
        let store = MemoryStore::new();
        store.append_trade(new_trade("u1", "staking", 100)).await.unwrap();
        store.append_trade(new_trade("u1", "swaps", -40)).await.unwrap();
        store.append_trade(new_trade("u2", "staking", 9_999)).await.unwrap();

        let metrics = store
            .metrics_for_user(&UserId::new_unchecked("u1"))
            .await
            .unwrap();
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.total_profit, 60);
        assert_eq!(metrics.winning_trades, 1);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.win_rate, 50.0);
        assert_eq!(metrics.best_trade, 100);
        assert_eq!(metrics.worst_trade, -40);
        assert_eq!(metrics.profit_by_strategy["staking"], 100);
    }

    #[tokio::test]
    async fn test_leaderboard_is_anonymous_and_ordered() {
        let store = MemoryStore::new();
        for (user, profit) in [("u1", 10), ("u2", 500), ("u3", 250)] {
            store.append_trade(new_trade(user, "staking", profit)).await.unwrap();
        }

        let board = store.leaderboard(2).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].profit, 500);
        assert_eq!(board[1].profit, 250);

        // Nothing in the serialized output resembles a user ID
        let json = serde_json::to_string(&board).unwrap();
        for user in ["u1", "u2", "u3"] {
            assert!(!json.contains(user));
        }
    }

    #[tokio::test]
    async fn test_recent_trades_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.append_trade(new_trade("u1", "staking", i)).await.unwrap();
        }
        let trades = store
            .trades_for_user(&UserId::new_unchecked("u1"), 3)
            .await
            .unwrap();
        assert_eq!(trades.len(), 3);
        assert!(trades[0].trade_id > trades[1].trade_id);
    }
}
