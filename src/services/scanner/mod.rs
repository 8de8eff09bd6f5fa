//! Strategy scanner: per-user fan-out over enabled strategies
//!
//! Strategy bodies live outside the core behind the [`Strategy`] trait. The
//! scanner invokes each enabled strategy for a user, tags the produced
//! opportunities with the owning user, and isolates failures: one broken
//! strategy never stops the others for that user.

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::core::error::AppResult;
use crate::core::types::{Lamports, Opportunity, UserId, WalletAddress};
use crate::infrastructure::database::UserPreferences;
use crate::services::price::PriceCache;

/// Read-only context handed to each strategy scan
pub struct ScanContext {
    pub user_id: UserId,
    pub wallet_address: WalletAddress,
    /// Balance at cycle refresh time, base units
    pub balance: Lamports,
    /// Shared across all users in the cycle; scans read through it
    pub prices: Arc<PriceCache>,
}

/// A yield-seeking strategy. Implementations are external collaborators;
/// the core only requires scanning and transaction assembly.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name recorded in opportunities and trade records
    fn name(&self) -> &str;

    /// Inspect chain/market state for this user and propose actions.
    /// Must only read shared state.
    async fn scan(&self, context: &ScanContext) -> AppResult<Vec<Opportunity>>;

    /// Assemble the unsigned instructions realizing an approved opportunity.
    /// The trade executor signs with the owning user's keypair and submits.
    async fn build_instructions(
        &self,
        opportunity: &Opportunity,
        payer: &Pubkey,
    ) -> AppResult<Vec<Instruction>>;
}

/// Fan-out scanner over the registered strategies
pub struct StrategyScanner {
    strategies: Vec<Arc<dyn Strategy>>,
    prices: Arc<PriceCache>,
}

impl StrategyScanner {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, prices: Arc<PriceCache>) -> Self {
        Self { strategies, prices }
    }

    /// Registered strategy names
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Look up a strategy for execution
    pub fn strategy_by_name(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.iter().find(|s| s.name() == name).cloned()
    }

    /// Scan every enabled strategy for one user. Failures are logged with
    /// user and strategy context and skipped; the returned list carries the
    /// surviving opportunities tagged with the owning user.
    #[instrument(skip(self, preferences), fields(user = %user_id))]
    pub async fn scan_user(
        &self,
        user_id: &UserId,
        wallet_address: &WalletAddress,
        balance: Lamports,
        preferences: &UserPreferences,
    ) -> Vec<Opportunity> {
        let context = ScanContext {
            user_id: user_id.clone(),
            wallet_address: wallet_address.clone(),
            balance,
            prices: self.prices.clone(),
        };

        let mut opportunities = Vec::new();

        for strategy in &self.strategies {
            if !preferences.strategy_enabled(strategy.name()) {
                continue;
            }

            match strategy.scan(&context).await {
                Ok(found) => {
                    debug!(
                        strategy = strategy.name(),
                        count = found.len(),
                        "strategy scan complete"
                    );
                    for mut opportunity in found {
                        // The scanner owns the user tag; strategies cannot
                        // cross tenants
                        opportunity.user_id = user_id.clone();
                        opportunities.push(opportunity);
                    }
                }
                Err(e) => {
                    error!(
                        user_id = %user_id,
                        strategy = strategy.name(),
                        "strategy scan failed, continuing with remaining strategies: {}",
                        e
                    );
                }
            }
        }

        opportunities
    }
}

impl std::fmt::Debug for StrategyScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyScanner")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    fn scanner_with(strategies: Vec<Arc<dyn Strategy>>) -> StrategyScanner {
        let prices = Arc::new(PriceCache::with_ttl(Duration::from_secs(60)));
        StrategyScanner::new(strategies, prices)
    }

    fn uid(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::new_unchecked(s)
    }

    #[tokio::test]
    async fn test_opportunities_tagged_with_owner() {
        let strategy = Arc::new(FixedStrategy::new("staking", 1_000_000, 50_000));
        let scanner = scanner_with(vec![strategy]);

        let found = scanner
            .scan_user(
                &uid("u1"),
                &addr("Addr1"),
                Lamports::new(20_000_000),
                &UserPreferences::default(),
            )
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, uid("u1"));
        assert_eq!(found[0].strategy_name, "staking");
    }

    #[tokio::test]
    async fn test_one_failing_strategy_does_not_stop_others() {
        let good_a = Arc::new(FixedStrategy::new("staking", 1_000_000, 50_000));
        let bad = Arc::new(FailingStrategy::new("broken"));
        let good_b = Arc::new(FixedStrategy::new("swaps", 2_000_000, 80_000));
        let scanner = scanner_with(vec![good_a.clone(), bad, good_b.clone()]);

        let found = scanner
            .scan_user(
                &uid("u1"),
                &addr("Addr1"),
                Lamports::new(20_000_000),
                &UserPreferences::default(),
            )
            .await;

        // Both healthy strategies produced despite the failure between them
        assert_eq!(found.len(), 2);
        assert_eq!(good_a.scan_count(), 1);
        assert_eq!(good_b.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_preferences_filter_strategies() {
        let staking = Arc::new(FixedStrategy::new("staking", 1_000_000, 50_000));
        let swaps = Arc::new(FixedStrategy::new("swaps", 1_000_000, 50_000));
        let scanner = scanner_with(vec![staking.clone(), swaps.clone()]);

        let preferences = UserPreferences {
            enabled_strategies: Some(vec!["swaps".to_string()]),
            notifications_enabled: true,
        };
        let found = scanner
            .scan_user(
                &uid("u1"),
                &addr("Addr1"),
                Lamports::new(20_000_000),
                &preferences,
            )
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strategy_name, "swaps");
        assert_eq!(staking.scan_count(), 0);
        assert_eq!(swaps.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_strategy_lookup_by_name() {
        let scanner = scanner_with(vec![Arc::new(FixedStrategy::new("staking", 1, 1))]);
        assert!(scanner.strategy_by_name("staking").is_some());
        assert!(scanner.strategy_by_name("missing").is_none());
    }
}
