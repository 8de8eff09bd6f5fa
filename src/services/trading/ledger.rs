//! Performance ledger: durable trade log and per-user aggregates
//!
//! Records are append-only; aggregates are computed store-side (filtered by
//! user ID in SQL) and cached per user until the next record invalidates
//! them. The leaderboard carries no user identifiers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::core::error::AppResult;
use crate::core::types::{LeaderboardEntry, PerformanceMetrics, TradeRecord, UserId};
use crate::infrastructure::database::{NewTrade, TradeRepository};

/// Append-only trade ledger with cached per-user metrics
pub struct PerformanceLedger {
    trades: Arc<dyn TradeRepository>,
    metrics_cache: RwLock<HashMap<UserId, PerformanceMetrics>>,
}

impl PerformanceLedger {
    pub fn new(trades: Arc<dyn TradeRepository>) -> Self {
        Self {
            trades,
            metrics_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Durably append one execution attempt and invalidate that user's
    /// cached metrics
    #[instrument(skip(self, trade), fields(user = %trade.user_id, strategy = %trade.strategy_name))]
    pub async fn record_trade(&self, trade: NewTrade) -> AppResult<TradeRecord> {
        let user_id = trade.user_id.clone();
        let record = self.trades.append_trade(trade).await?;

        self.metrics_cache.write().await.remove(&user_id);
        debug!(trade_id = record.trade_id, "trade recorded");

        Ok(record)
    }

    /// Aggregate metrics for one user and no other
    pub async fn get_metrics(&self, user_id: &UserId) -> AppResult<PerformanceMetrics> {
        if let Some(metrics) = self.metrics_cache.read().await.get(user_id) {
            return Ok(metrics.clone());
        }

        let metrics = self.trades.metrics_for_user(user_id).await?;
        self.metrics_cache
            .write()
            .await
            .insert(user_id.clone(), metrics.clone());
        Ok(metrics)
    }

    /// Most recent trades for one user, newest first
    pub async fn recent_trades(&self, user_id: &UserId, limit: u32) -> AppResult<Vec<TradeRecord>> {
        self.trades.trades_for_user(user_id, limit).await
    }

    /// Top-N users by total profit; rank, profit, and win rate only
    pub async fn leaderboard(&self, limit: u32) -> AppResult<Vec<LeaderboardEntry>> {
        self.trades.leaderboard(limit).await
    }
}

impl std::fmt::Debug for PerformanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceLedger").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TradeOutcome;
    use crate::infrastructure::database::MemoryStore;

    fn uid(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    fn trade(user: &str, profit: i64) -> NewTrade {
        NewTrade {
            user_id: uid(user),
            strategy_name: "staking".to_string(),
            action: "stake".to_string(),
            amount: 1_000_000,
            profit,
            tx_signature: Some("sig".to_string()),
            outcome: TradeOutcome::Confirmed,
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_metrics_cached_until_next_record() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PerformanceLedger::new(store.clone());

        ledger.record_trade(trade("u1", 100)).await.unwrap();
        let first = ledger.get_metrics(&uid("u1")).await.unwrap();
        assert_eq!(first.total_profit, 100);

        // Cached read sees the same value
        let cached = ledger.get_metrics(&uid("u1")).await.unwrap();
        assert_eq!(cached.total_trades, 1);

        // A new record invalidates and the next read reflects it
        ledger.record_trade(trade("u1", 50)).await.unwrap();
        let refreshed = ledger.get_metrics(&uid("u1")).await.unwrap();
        assert_eq!(refreshed.total_profit, 150);
        assert_eq!(refreshed.total_trades, 2);
    }

    #[tokio::test]
    async fn test_metrics_equal_aggregate_of_user_records() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PerformanceLedger::new(store);

        for profit in [10, -5, 20, -1, 7] {
            ledger.record_trade(trade("u1", profit)).await.unwrap();
        }
        ledger.record_trade(trade("u2", 1_000)).await.unwrap();

        let metrics = ledger.get_metrics(&uid("u1")).await.unwrap();
        assert_eq!(metrics.total_profit, 31);
        assert_eq!(metrics.total_trades, 5);
        assert_eq!(metrics.winning_trades, 3);
        assert_eq!(metrics.losing_trades, 2);
        assert_eq!(metrics.best_trade, 20);
        assert_eq!(metrics.worst_trade, -5);
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_metrics() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PerformanceLedger::new(store);

        let metrics = ledger.get_metrics(&uid("ghost")).await.unwrap();
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
    }
}
