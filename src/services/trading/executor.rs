//! Trade executor: one trade, end to end
//!
//! Runs inside the single queue consumer. Resolves the owner's wallet
//! handle, sizes the position by risk tier, assembles and signs the
//! transaction with that user's keypair only, submits with a bounded
//! confirmation wait, records the attempt, and notifies the owner. Every
//! failure path still produces a trade record and a notification; nothing
//! escapes to the consumer loop.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::ledger::PerformanceLedger;
use super::queue::QueuedTrade;
use crate::config::models::TradingConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::result::utils::with_timeout;
use crate::core::types::{Lamports, RiskTier, TradeOutcome, TradeRecord, TxSignature};
use crate::infrastructure::database::{NewTrade, UserRepository};
use crate::services::balance::BalanceOracle;
use crate::services::notifier::{deliver, Notifier, UserNotification};
use crate::services::scanner::StrategyScanner;
use crate::services::solana::ChainRpc;
use crate::services::wallet::WalletStore;

/// Executes approved trades serially on behalf of their owners
pub struct TradeExecutor {
    wallets: Arc<WalletStore>,
    scanner: Arc<StrategyScanner>,
    chain: Arc<dyn ChainRpc>,
    ledger: Arc<PerformanceLedger>,
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserRepository>,
    oracle: Arc<BalanceOracle>,
    confirmation_timeout: Duration,
    fee_reserve: Lamports,
    fraction_low: Decimal,
    fraction_medium: Decimal,
    fraction_high: Decimal,
}

impl TradeExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallets: Arc<WalletStore>,
        scanner: Arc<StrategyScanner>,
        chain: Arc<dyn ChainRpc>,
        ledger: Arc<PerformanceLedger>,
        notifier: Arc<dyn Notifier>,
        users: Arc<dyn UserRepository>,
        oracle: Arc<BalanceOracle>,
        config: &TradingConfig,
    ) -> Self {
        Self {
            wallets,
            scanner,
            chain,
            ledger,
            notifier,
            users,
            oracle,
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            fee_reserve: Lamports::new(config.fee_reserve_lamports),
            fraction_low: config.position_fraction_low,
            fraction_medium: config.position_fraction_medium,
            fraction_high: config.position_fraction_high,
        }
    }

    /// Execute one queued trade. Never returns an error; failures become
    /// trade records with the corresponding outcome.
    #[instrument(skip(self, trade), fields(user = %trade.user_id, strategy = %trade.opportunity.strategy_name))]
    pub async fn execute(&self, trade: QueuedTrade) {
        let outcome = self.attempt(&trade).await;
        // The record carries what was actually submitted; a failure before
        // sizing keeps the opportunity's requested amount
        let recorded_amount = match &outcome {
            Ok((_, _, amount)) => amount.value(),
            Err(_) => trade.opportunity.amount.value(),
        };

        let (outcome, signature, profit, reason) = match outcome {
            Ok((signature, profit, _)) => (TradeOutcome::Confirmed, Some(signature), profit, None),
            Err(e) => {
                let outcome = match &e {
                    AppError::Timeout { .. } => TradeOutcome::TimedOut,
                    AppError::NotFound { .. } | AppError::InvalidInput { .. } => {
                        TradeOutcome::Rejected
                    }
                    _ => TradeOutcome::Failed,
                };
                warn!(user = %trade.user_id, "trade attempt failed ({}): {}", outcome, e);
                (outcome, None, 0i64, Some(e.to_string()))
            }
        };

        let record = self
            .ledger
            .record_trade(NewTrade {
                user_id: trade.user_id.clone(),
                strategy_name: trade.opportunity.strategy_name.clone(),
                action: trade.opportunity.action.clone(),
                amount: recorded_amount,
                profit,
                tx_signature: signature.map(|s| s.as_str().to_string()),
                outcome,
                details: trade.opportunity.details.clone(),
            })
            .await;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                // Chain state is truth; an unrecordable trade is an operator
                // problem, not a user-facing failure
                error!(user = %trade.user_id, "failed to persist trade record: {}", e);
                return;
            }
        };

        self.notify_outcome(&record, reason.as_deref()).await;
    }

    /// The fallible middle of a trade: wallet resolution, sizing, signing,
    /// submission
    async fn attempt(&self, trade: &QueuedTrade) -> AppResult<(TxSignature, i64, Lamports)> {
        // Wallet handle for the owner; the only keypair this trade touches
        let handle = self
            .wallets
            .get(&trade.user_id, &trade.user_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found_for_user(
                    "wallet disappeared before execution".to_string(),
                    trade.user_id.to_string(),
                )
            })?;

        let sized_amount = self.position_size(trade).await?;

        let strategy = self
            .scanner
            .strategy_by_name(&trade.opportunity.strategy_name)
            .ok_or_else(|| {
                AppError::invalid_input(format!(
                    "strategy '{}' not registered",
                    trade.opportunity.strategy_name
                ))
            })?;

        let payer = handle.keypair().try_pubkey().map_err(|e| {
            AppError::crypto(format!("cannot derive pubkey from keypair: {}", e))
        })?;

        let mut opportunity = trade.opportunity.clone();
        opportunity.amount = sized_amount;

        let instructions = strategy.build_instructions(&opportunity, &payer).await?;
        let blockhash = self.chain.latest_blockhash().await?;

        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer),
            &[handle.keypair()],
            blockhash,
        );

        let signature = with_timeout(self.confirmation_timeout, "confirm_trade", async {
            self.chain.send_and_confirm(&transaction).await
        })
        .await?;

        info!(
            user = %trade.user_id,
            signature = %signature,
            amount = sized_amount.value(),
            "trade confirmed"
        );

        // Realized profit settles asynchronously on chain; the expected
        // estimate is recorded with the confirmation
        Ok((
            signature,
            trade.opportunity.expected_profit.value() as i64,
            sized_amount,
        ))
    }

    /// Risk-tier position sizing against the owner's current balance
    async fn position_size(&self, trade: &QueuedTrade) -> AppResult<Lamports> {
        let balance = self.oracle.cached_balance(&trade.user_id).await;
        let spendable = balance.saturating_sub(self.fee_reserve);

        let fraction = match trade.risk_tier {
            RiskTier::Low => self.fraction_low,
            RiskTier::Medium => self.fraction_medium,
            RiskTier::High => self.fraction_high,
        };
        let cap = Lamports::new(
            (Decimal::from(balance.value()) * fraction)
                .to_u64()
                .unwrap_or(0),
        );

        let sized = trade.opportunity.amount.min(cap).min(spendable);
        if sized.is_zero() {
            return Err(AppError::invalid_input(format!(
                "position sized to zero (balance {}, risk {})",
                balance, trade.risk_tier
            )));
        }
        Ok(sized)
    }

    async fn notify_outcome(&self, record: &TradeRecord, reason: Option<&str>) {
        let preferences = self
            .users
            .get_preferences(&record.user_id)
            .await
            .unwrap_or_default();
        if !preferences.notifications_enabled {
            return;
        }

        let notification = if record.outcome.is_success() {
            UserNotification::trade_succeeded(record)
        } else {
            UserNotification::trade_failed(record, reason.unwrap_or("see operator logs"))
        };
        deliver(self.notifier.as_ref(), notification).await;
    }
}

impl std::fmt::Debug for TradeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeExecutor")
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish()
    }
}
