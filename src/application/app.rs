//! Main application structure and lifecycle management
//!
//! The composition root: wires repositories, the vault, the wallet store,
//! the RPC gate and chain client, the oracle and caches, the scanner,
//! ranker, trade queue, scheduler, and the command surface. Owns the
//! lifecycle from startup through graceful drain.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::types::Lamports;
use crate::infrastructure::database::{postgres::PostgresStore, Repositories};
use crate::infrastructure::security::WalletVault;
use crate::services::balance::BalanceOracle;
use crate::services::commands::CommandService;
use crate::services::notifier::{Notifier, TracingNotifier, WebhookNotifier};
use crate::services::price::PriceCache;
use crate::services::ranker::{DecisionEngine, OpportunityRanker, ThresholdEngine};
use crate::services::ratelimit::RpcGate;
use crate::services::scanner::{Strategy, StrategyScanner};
use crate::services::scheduler::{SchedulerState, UserScheduler};
use crate::services::solana::{ChainRpc, SimulatedChain, SolanaRpcService};
use crate::services::trading::{PerformanceLedger, TradeExecutor, TradeQueue};
use crate::services::wallet::WalletStore;

/// How long shutdown waits for the in-flight cycle and queue backlog
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Health check cadence
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// External collaborators injected at composition time
pub struct Collaborators {
    /// Strategy bodies; the core registers none of its own
    pub strategies: Vec<Arc<dyn Strategy>>,
    /// Decision engine; defaults to the rule-based threshold engine
    pub engine: Option<Arc<dyn DecisionEngine>>,
    /// Notification sink; defaults to webhook or tracing per config
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            engine: None,
            notifier: None,
        }
    }
}

/// Assembled agent, ready to run
pub struct Application {
    config: Arc<AppConfig>,
    scheduler: Arc<UserScheduler>,
    queue: Arc<TradeQueue>,
    commands: Arc<CommandService>,
    health: Arc<super::health::HealthService>,
    postgres: Option<Arc<PostgresStore>>,
    simulated_chain: Option<Arc<SimulatedChain>>,
}

impl Application {
    /// Build with default collaborators
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        Self::build_with(config, Collaborators::default()).await
    }

    /// Build the full object graph
    #[instrument(skip(config, collaborators))]
    pub async fn build_with(
        config: AppConfig,
        collaborators: Collaborators,
    ) -> AppResult<Self> {
        let validation = config.validate()?;
        for warning in &validation.warnings {
            warn!("configuration warning: {}", warning);
        }

        let config = Arc::new(config);
        info!(environment = %config.environment.name, "building application");

        // Persistence
        let (repositories, postgres) = if config.is_simulation() {
            (Repositories::in_memory(), None)
        } else {
            let store = Arc::new(PostgresStore::connect(&config.database).await?);
            (Repositories::postgres(store.clone()), Some(store))
        };

        // Custody
        let vault = WalletVault::new(&config.wallet);
        vault.init().await?;
        let wallets = Arc::new(WalletStore::new(
            repositories.wallets.clone(),
            repositories.users.clone(),
            vault,
            config.wallet.derivation_path.clone(),
        ));
        let loaded = wallets.load_all().await?;
        info!(wallets = loaded, "custodial wallets loaded");

        // Chain access behind the shared gate
        let gate = Arc::new(RpcGate::new(&config.rate_limit));
        let (chain, simulated_chain): (Arc<dyn ChainRpc>, Option<Arc<SimulatedChain>>) =
            if config.is_simulation() {
                let simulated = Arc::new(SimulatedChain::new());
                (simulated.clone(), Some(simulated))
            } else {
                (
                    Arc::new(SolanaRpcService::new(&config.solana, gate.clone())?),
                    None,
                )
            };

        // Shared caches
        let oracle = Arc::new(BalanceOracle::new(
            chain.clone(),
            repositories.balances.clone(),
            &config.scheduler,
        ));
        oracle.load_persisted().await;
        let prices = Arc::new(PriceCache::new(&config.price_cache));

        // Scan → rank → execute pipeline
        let scanner = Arc::new(StrategyScanner::new(collaborators.strategies, prices));
        let engine = collaborators.engine.unwrap_or_else(|| {
            Arc::new(ThresholdEngine::new(Lamports::new(
                config.trading.profit_floor_lamports,
            )))
        });
        let ranker = Arc::new(OpportunityRanker::new(engine));
        let ledger = Arc::new(PerformanceLedger::new(repositories.trades.clone()));

        let notifier: Arc<dyn Notifier> = match collaborators.notifier {
            Some(notifier) => notifier,
            None if config.notifier.webhook_url.is_some() => {
                Arc::new(WebhookNotifier::new(&config.notifier)?)
            }
            None => Arc::new(TracingNotifier),
        };

        let executor = Arc::new(TradeExecutor::new(
            wallets.clone(),
            scanner.clone(),
            chain.clone(),
            ledger.clone(),
            notifier.clone(),
            repositories.users.clone(),
            oracle.clone(),
            &config.trading,
        ));
        let queue = Arc::new(TradeQueue::start(executor, config.trading.queue_capacity));

        let scheduler = Arc::new(UserScheduler::new(
            wallets.clone(),
            repositories.users.clone(),
            oracle.clone(),
            scanner,
            ranker,
            queue.clone(),
            notifier,
            gate,
            config.scheduler.clone(),
        ));

        let commands = Arc::new(CommandService::new(wallets, oracle, ledger));

        let health = Arc::new(super::health::HealthService::new(
            postgres.clone(),
            chain,
            queue.clone(),
            scheduler.clone(),
        ));

        info!("application assembled");
        Ok(Self {
            config,
            scheduler,
            queue,
            commands,
            health,
            postgres,
            simulated_chain,
        })
    }

    /// Run until the scheduler is stopped via [`Application::shutdown`]
    #[instrument(skip(self))]
    pub async fn run(&self) -> AppResult<()> {
        self.health.start(HEALTH_INTERVAL).await?;

        info!(
            interval = self.config.scheduler.scan_interval_secs,
            "agent running"
        );

        let scheduler = self.scheduler.clone();
        tokio::spawn(scheduler.run())
            .await
            .map_err(|e| AppError::internal(format!("scheduler task failed: {}", e)))?;

        Ok(())
    }

    /// Graceful drain: no new cycles, the in-flight cycle finishes, the
    /// queue backlog executes, connections close
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("shutting down: draining scheduler and trade queue");

        self.scheduler.stop().await;

        // Wait for the in-flight cycle to finish
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.scheduler.state().await != SchedulerState::Stopped {
            if tokio::time::Instant::now() >= deadline {
                warn!("scheduler did not stop within {:?}", DRAIN_TIMEOUT);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.queue.stop(DRAIN_TIMEOUT).await;
        self.health.stop().await;

        if let Some(postgres) = &self.postgres {
            postgres.close().await;
        }

        info!("shutdown complete");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The command surface answered to the front-end
    pub fn commands(&self) -> Arc<CommandService> {
        self.commands.clone()
    }

    pub fn scheduler(&self) -> Arc<UserScheduler> {
        self.scheduler.clone()
    }

    pub fn health(&self) -> Arc<super::health::HealthService> {
        self.health.clone()
    }

    /// The in-memory chain backend; present only in simulation mode
    pub fn simulated_chain(&self) -> Option<Arc<SimulatedChain>> {
        self.simulated_chain.clone()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("environment", &self.config.environment.name)
            .finish()
    }
}
