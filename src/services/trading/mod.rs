//! Trade execution: serialized queue, per-trade executor, performance ledger

pub mod executor;
pub mod ledger;
pub mod queue;

pub use executor::TradeExecutor;
pub use ledger::PerformanceLedger;
pub use queue::{QueuedTrade, TradeQueue};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::models::{SchedulerConfig, TradingConfig};
    use crate::core::types::{
        Lamports, Opportunity, RiskTier, Timestamp, TradeOutcome, UserId,
    };
    use crate::infrastructure::database::{MemoryStore, TradeRepository};
    use crate::infrastructure::security::vault::vault_at;
    use crate::services::balance::BalanceOracle;
    use crate::services::notifier::testing::RecordingNotifier;
    use crate::services::notifier::UserEventKind;
    use crate::services::price::PriceCache;
    use crate::services::scanner::testing::FixedStrategy;
    use crate::services::scanner::{Strategy, StrategyScanner};
    use crate::services::solana::SimulatedChain;
    use crate::services::wallet::WalletStore;

    struct Harness {
        queue: TradeQueue,
        chain: Arc<SimulatedChain>,
        repo: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        wallets: Arc<WalletStore>,
        oracle: Arc<BalanceOracle>,
        _dir: tempfile::TempDir,
    }

    async fn harness(trading: TradingConfig, strategies: Vec<Arc<dyn Strategy>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryStore::new());
        let chain = Arc::new(SimulatedChain::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let wallets = Arc::new(WalletStore::new(
            repo.clone(),
            repo.clone(),
            vault_at(dir.path(), "test-secret"),
            "m/44'/501'/0'/0'/0'".to_string(),
        ));
        let oracle = Arc::new(BalanceOracle::new(
            chain.clone(),
            repo.clone(),
            &SchedulerConfig {
                balance_cache_ttl_secs: 600,
                ..SchedulerConfig::default()
            },
        ));
        let prices = Arc::new(PriceCache::with_ttl(Duration::from_secs(60)));
        let scanner = Arc::new(StrategyScanner::new(strategies, prices));
        let ledger = Arc::new(PerformanceLedger::new(repo.clone()));

        let executor = Arc::new(TradeExecutor::new(
            wallets.clone(),
            scanner,
            chain.clone(),
            ledger,
            notifier.clone(),
            repo.clone(),
            oracle.clone(),
            &trading,
        ));
        let queue = TradeQueue::start(executor, trading.queue_capacity);

        Harness {
            queue,
            chain,
            repo,
            notifier,
            wallets,
            oracle,
            _dir: dir,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    fn opportunity(user: &str, amount: u64, profit: u64, risk: RiskTier) -> Opportunity {
        Opportunity {
            user_id: uid(user),
            strategy_name: "staking".to_string(),
            action: "stake".to_string(),
            amount: Lamports::new(amount),
            expected_profit: Lamports::new(profit),
            risk_tier: risk,
            details: serde_json::json!({"venue": "test"}),
            discovered_at: Timestamp::now(),
        }
    }

    /// Create a wallet and give it a refreshed balance the executor can size
    /// against
    async fn fund(h: &Harness, user: &str, lamports: u64) {
        let user_id = uid(user);
        let (address, _) = h.wallets.create(&user_id, &user_id).await.unwrap();
        h.chain.set_balance(&address, Lamports::new(lamports));
        h.oracle
            .batch_refresh(&[(user_id, address)])
            .await;
    }

    async fn wait_for_executed(h: &Harness, count: u64) {
        for _ in 0..500 {
            if h.queue.stats().executed >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never executed {} trades", count);
    }

    fn default_strategies() -> Vec<Arc<dyn Strategy>> {
        vec![Arc::new(FixedStrategy::new("staking", 1_000_000, 100_000))]
    }

    #[tokio::test]
    async fn test_confirmed_trade_recorded_and_notified() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        fund(&h, "u1", 100_000_000).await;

        h.queue
            .enqueue(
                uid("u1"),
                opportunity("u1", 1_000_000, 100_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 1).await;

        let trades = h.repo.trades_for_user(&uid("u1"), 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].outcome, TradeOutcome::Confirmed);
        assert_eq!(trades[0].profit, 100_000);
        assert!(trades[0].tx_signature.is_some());

        assert_eq!(h.notifier.count_of(&uid("u1"), UserEventKind::TradeSucceeded), 1);
    }

    #[tokio::test]
    async fn test_queue_serializes_across_users() {
        let h = harness(TradingConfig::default(), default_strategies()).await;

        const USERS: usize = 20;
        for i in 0..USERS {
            fund(&h, &format!("u{}", i), 100_000_000).await;
        }
        h.chain.set_submit_delay(Duration::from_millis(5));

        for i in 0..USERS {
            let user = format!("u{}", i);
            h.queue
                .enqueue(
                    uid(&user),
                    opportunity(&user, 1_000_000, 10_000 + i as u64, RiskTier::Low),
                    RiskTier::Low,
                )
                .await
                .unwrap();
        }
        wait_for_executed(&h, USERS as u64).await;

        // At most one submission in flight at any moment
        assert_eq!(h.chain.max_in_flight(), 1);
        assert_eq!(h.chain.submissions(), USERS as u64);

        // Trade IDs and timestamps strictly increase in enqueue order
        let mut all: Vec<_> = Vec::new();
        for i in 0..USERS {
            let trades = h
                .repo
                .trades_for_user(&uid(&format!("u{}", i)), 10)
                .await
                .unwrap();
            assert_eq!(trades.len(), 1);
            all.push((i, trades[0].clone()));
        }
        for (i, record) in &all {
            assert_eq!(record.trade_id, *i as i64 + 1);
        }
        for pair in all.windows(2) {
            assert!(pair[1].1.executed_at > pair[0].1.executed_at);
        }
    }

    #[tokio::test]
    async fn test_missing_wallet_rejected_and_loop_continues() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        fund(&h, "funded", 100_000_000).await;

        // ghost has no wallet at all
        h.queue
            .enqueue(
                uid("ghost"),
                opportunity("ghost", 1_000_000, 10_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        h.queue
            .enqueue(
                uid("funded"),
                opportunity("funded", 1_000_000, 10_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 2).await;

        let ghost_trades = h.repo.trades_for_user(&uid("ghost"), 10).await.unwrap();
        assert_eq!(ghost_trades[0].outcome, TradeOutcome::Rejected);
        assert!(ghost_trades[0].tx_signature.is_none());
        assert_eq!(h.notifier.count_of(&uid("ghost"), UserEventKind::TradeFailed), 1);

        // The failure did not block the next trade
        let funded_trades = h.repo.trades_for_user(&uid("funded"), 10).await.unwrap();
        assert_eq!(funded_trades[0].outcome, TradeOutcome::Confirmed);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_recorded_as_timed_out() {
        let config = TradingConfig {
            confirmation_timeout_secs: 1,
            ..TradingConfig::default()
        };
        let h = harness(config, default_strategies()).await;
        fund(&h, "u1", 100_000_000).await;
        h.chain.set_submit_delay(Duration::from_millis(1_500));

        h.queue
            .enqueue(
                uid("u1"),
                opportunity("u1", 1_000_000, 10_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 1).await;

        let trades = h.repo.trades_for_user(&uid("u1"), 10).await.unwrap();
        assert_eq!(trades[0].outcome, TradeOutcome::TimedOut);
        assert_eq!(trades[0].profit, 0);
        assert_eq!(h.notifier.count_of(&uid("u1"), UserEventKind::TradeFailed), 1);
    }

    #[tokio::test]
    async fn test_high_risk_position_capped() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        fund(&h, "u1", 100_000_000).await;

        // Requested 50M but high risk caps at 5% of the 100M balance
        h.queue
            .enqueue(
                uid("u1"),
                opportunity("u1", 50_000_000, 10_000, RiskTier::High),
                RiskTier::High,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 1).await;

        let trades = h.repo.trades_for_user(&uid("u1"), 10).await.unwrap();
        assert_eq!(trades[0].outcome, TradeOutcome::Confirmed);
        assert_eq!(trades[0].amount, Lamports::new(5_000_000));
    }

    #[tokio::test]
    async fn test_zero_sized_position_rejected_before_submission() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        // Wallet exists but was never funded; cached balance is zero
        let user_id = uid("u1");
        h.wallets.create(&user_id, &user_id).await.unwrap();

        h.queue
            .enqueue(
                uid("u1"),
                opportunity("u1", 1_000_000, 10_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 1).await;

        let trades = h.repo.trades_for_user(&uid("u1"), 10).await.unwrap();
        assert_eq!(trades[0].outcome, TradeOutcome::Rejected);
        assert_eq!(h.chain.submissions(), 0);
    }

    #[tokio::test]
    async fn test_stop_drains_backlog() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        fund(&h, "u1", 100_000_000).await;
        h.chain.set_submit_delay(Duration::from_millis(10));

        for _ in 0..5 {
            h.queue
                .enqueue(
                    uid("u1"),
                    opportunity("u1", 1_000_000, 10_000, RiskTier::Low),
                    RiskTier::Low,
                )
                .await
                .unwrap();
        }

        let Harness { queue, repo, .. } = h;
        queue.stop(Duration::from_secs(5)).await;

        // Everything accepted before stop was executed
        assert_eq!(repo.trades_for_user(&uid("u1"), 10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_notification_opt_out_respected() {
        let h = harness(TradingConfig::default(), default_strategies()).await;
        fund(&h, "u1", 100_000_000).await;

        let prefs = crate::infrastructure::database::UserPreferences {
            enabled_strategies: None,
            notifications_enabled: false,
        };
        crate::infrastructure::database::UserRepository::set_preferences(
            h.repo.as_ref(),
            &uid("u1"),
            &prefs,
        )
        .await
        .unwrap();

        h.queue
            .enqueue(
                uid("u1"),
                opportunity("u1", 1_000_000, 10_000, RiskTier::Low),
                RiskTier::Low,
            )
            .await
            .unwrap();
        wait_for_executed(&h, 1).await;

        // Recorded but silent
        assert_eq!(h.repo.trades_for_user(&uid("u1"), 10).await.unwrap().len(), 1);
        assert!(h.notifier.sent_to(&uid("u1")).is_empty());
    }
}
