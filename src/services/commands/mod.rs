//! Internal command surface
//!
//! The small RPC the out-of-scope chat front-end calls into. Every call
//! carries the caller's user ID, which must equal the target user ID
//! (leaderboard excepted). Actionable errors carry human-readable guidance
//! via `AppError::user_message`.

use std::sync::Arc;
use tracing::{error, instrument};

use crate::core::error::{AppError, AppResult};
use crate::core::types::{
    Lamports, LeaderboardEntry, PerformanceMetrics, TradeRecord, UserId, WalletAddress,
};
use crate::services::balance::BalanceOracle;
use crate::services::trading::PerformanceLedger;
use crate::services::wallet::WalletStore;

/// Result of a wallet creation: the mnemonic is returned exactly once
#[derive(Debug, Clone)]
pub struct WalletCreated {
    pub address: WalletAddress,
    pub mnemonic: String,
}

/// Typed command API answered by the core
pub struct CommandService {
    wallets: Arc<WalletStore>,
    oracle: Arc<BalanceOracle>,
    ledger: Arc<PerformanceLedger>,
}

impl CommandService {
    pub fn new(
        wallets: Arc<WalletStore>,
        oracle: Arc<BalanceOracle>,
        ledger: Arc<PerformanceLedger>,
    ) -> Self {
        Self {
            wallets,
            oracle,
            ledger,
        }
    }

    fn authorize(caller_id: &UserId, user_id: &UserId) -> AppResult<()> {
        if caller_id != user_id {
            error!(
                caller = %caller_id,
                target = %user_id,
                "SECURITY: command rejected for non-owner"
            );
            return Err(AppError::unauthorized(
                caller_id.to_string(),
                user_id.to_string(),
            ));
        }
        Ok(())
    }

    /// Provision a fresh wallet and hand back the recovery phrase
    #[instrument(skip(self))]
    pub async fn create_wallet(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
    ) -> AppResult<WalletCreated> {
        let (address, mnemonic) = self.wallets.create(caller_id, user_id).await?;
        Ok(WalletCreated { address, mnemonic })
    }

    /// Import an existing mnemonic (12 or 24 words)
    #[instrument(skip(self, mnemonic))]
    pub async fn import_wallet(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
        mnemonic: &str,
    ) -> AppResult<WalletAddress> {
        self.wallets.import(caller_id, user_id, mnemonic).await
    }

    /// Export the stored recovery phrase (audit-logged by the store)
    #[instrument(skip(self))]
    pub async fn export_key(&self, caller_id: &UserId, user_id: &UserId) -> AppResult<String> {
        self.wallets.export(caller_id, user_id).await
    }

    /// Current balance, served from the oracle's cache-or-refresh path
    #[instrument(skip(self))]
    pub async fn get_balance(&self, caller_id: &UserId, user_id: &UserId) -> AppResult<Lamports> {
        Self::authorize(caller_id, user_id)?;

        let address = self.require_address(user_id).await?;
        Ok(self.oracle.get_balance(user_id, &address).await)
    }

    /// The wallet's public key
    #[instrument(skip(self))]
    pub async fn get_wallet_address(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
    ) -> AppResult<WalletAddress> {
        Self::authorize(caller_id, user_id)?;
        self.require_address(user_id).await
    }

    /// Aggregated performance for the caller's own trades
    #[instrument(skip(self))]
    pub async fn get_metrics(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
    ) -> AppResult<PerformanceMetrics> {
        Self::authorize(caller_id, user_id)?;
        self.require_address(user_id).await?;
        self.ledger.get_metrics(user_id).await
    }

    /// Most recent trades for the caller
    #[instrument(skip(self))]
    pub async fn recent_trades(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
        limit: u32,
    ) -> AppResult<Vec<TradeRecord>> {
        Self::authorize(caller_id, user_id)?;
        self.require_address(user_id).await?;
        self.ledger.recent_trades(user_id, limit).await
    }

    /// Anonymized top-N; the only call without a target user
    #[instrument(skip(self))]
    pub async fn get_leaderboard(&self, limit: u32) -> AppResult<Vec<LeaderboardEntry>> {
        self.ledger.leaderboard(limit).await
    }

    async fn require_address(&self, user_id: &UserId) -> AppResult<WalletAddress> {
        self.wallets.address_of(user_id).await?.ok_or_else(|| {
            AppError::not_found_for_user(
                "no wallet registered".to_string(),
                user_id.to_string(),
            )
        })
    }
}

impl std::fmt::Debug for CommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::SchedulerConfig;
    use crate::infrastructure::database::MemoryStore;
    use crate::infrastructure::security::vault::vault_at;
    use crate::services::solana::SimulatedChain;

    struct Fixture {
        commands: CommandService,
        chain: Arc<SimulatedChain>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryStore::new());
        let chain = Arc::new(SimulatedChain::new());

        let wallets = Arc::new(WalletStore::new(
            repo.clone(),
            repo.clone(),
            vault_at(dir.path(), "test-secret"),
            "m/44'/501'/0'/0'/0'".to_string(),
        ));
        let oracle = Arc::new(BalanceOracle::new(
            chain.clone(),
            repo.clone(),
            &SchedulerConfig::default(),
        ));
        let ledger = Arc::new(PerformanceLedger::new(repo));

        Fixture {
            commands: CommandService::new(wallets, oracle, ledger),
            chain,
            _dir: dir,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    #[tokio::test]
    async fn test_full_wallet_flow() {
        let fx = fixture();

        let created = fx
            .commands
            .create_wallet(&uid("u1"), &uid("u1"))
            .await
            .unwrap();
        assert_eq!(created.mnemonic.split_whitespace().count(), 12);

        let address = fx
            .commands
            .get_wallet_address(&uid("u1"), &uid("u1"))
            .await
            .unwrap();
        assert_eq!(address, created.address);

        fx.chain.set_balance(&address, Lamports::new(50_000_000));
        let balance = fx.commands.get_balance(&uid("u1"), &uid("u1")).await.unwrap();
        assert_eq!(balance, Lamports::new(50_000_000));

        let exported = fx.commands.export_key(&uid("u1"), &uid("u1")).await.unwrap();
        assert_eq!(exported, created.mnemonic);
    }

    #[tokio::test]
    async fn test_metrics_for_unknown_user_is_not_found() {
        let fx = fixture();
        let err = fx
            .commands
            .get_metrics(&uid("u2"), &uid("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(err.user_message().is_some());
    }

    #[tokio::test]
    async fn test_cross_tenant_calls_rejected() {
        let fx = fixture();
        fx.commands
            .create_wallet(&uid("owner"), &uid("owner"))
            .await
            .unwrap();

        let err = fx
            .commands
            .get_balance(&uid("attacker"), &uid("owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        let err = fx
            .commands
            .get_metrics(&uid("attacker"), &uid("owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        let err = fx
            .commands
            .export_key(&uid("attacker"), &uid("owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_create_has_guidance() {
        let fx = fixture();
        fx.commands.create_wallet(&uid("u1"), &uid("u1")).await.unwrap();

        let err = fx
            .commands
            .create_wallet(&uid("u1"), &uid("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists { .. }));
        assert!(err.user_message().unwrap().contains("export"));
    }

    #[tokio::test]
    async fn test_leaderboard_requires_no_target() {
        let fx = fixture();
        assert!(fx.commands.get_leaderboard(5).await.unwrap().is_empty());
    }
}
