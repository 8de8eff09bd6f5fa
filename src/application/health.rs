//! Health monitoring service
//!
//! Periodic liveness checks over the components the trading loop depends
//! on: the database, the chain RPC endpoint, the trade queue, and the
//! scheduler itself. The database and RPC are critical; a deep trade-queue
//! backlog only degrades.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument};

use crate::core::error::AppResult;
use crate::infrastructure::database::postgres::PostgresStore;
use crate::services::scheduler::{SchedulerState, UserScheduler};
use crate::services::solana::ChainRpc;
use crate::services::trading::TradeQueue;

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Some non-critical components are unhealthy
    Degraded,
    /// Critical components are unhealthy
    Unhealthy,
    Starting,
}

/// Health status of an individual component
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_check: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub is_critical: bool,
    pub response_time_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn new(name: &str, is_critical: bool) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Starting,
            message: None,
            last_success: None,
            last_check: Utc::now(),
            consecutive_failures: 0,
            is_critical,
            response_time_ms: None,
        }
    }

    pub fn mark_healthy(&mut self, message: Option<String>, response_time_ms: Option<u64>) {
        self.status = HealthStatus::Healthy;
        self.message = message;
        self.last_success = Some(Utc::now());
        self.last_check = Utc::now();
        self.consecutive_failures = 0;
        self.response_time_ms = response_time_ms;
    }

    pub fn mark_unhealthy(&mut self, message: String) {
        self.status = HealthStatus::Unhealthy;
        self.message = Some(message);
        self.last_check = Utc::now();
        self.consecutive_failures += 1;
        self.response_time_ms = None;
    }

    pub fn mark_degraded(&mut self, message: String) {
        self.status = HealthStatus::Degraded;
        self.message = Some(message);
        self.last_check = Utc::now();
    }
}

/// Deep trade-queue backlog threshold before the component degrades
const QUEUE_DEPTH_DEGRADED: u64 = 32;

/// Health monitoring over the agent's components
pub struct HealthService {
    postgres: Option<Arc<PostgresStore>>,
    chain: Arc<dyn ChainRpc>,
    queue: Arc<TradeQueue>,
    scheduler: Arc<UserScheduler>,
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    is_running: Arc<RwLock<bool>>,
}

impl HealthService {
    pub fn new(
        postgres: Option<Arc<PostgresStore>>,
        chain: Arc<dyn ChainRpc>,
        queue: Arc<TradeQueue>,
        scheduler: Arc<UserScheduler>,
    ) -> Self {
        let mut components = HashMap::new();
        if postgres.is_some() {
            components.insert("database".to_string(), ComponentHealth::new("database", true));
        }
        components.insert("solana_rpc".to_string(), ComponentHealth::new("solana_rpc", true));
        components.insert("trade_queue".to_string(), ComponentHealth::new("trade_queue", false));
        components.insert("scheduler".to_string(), ComponentHealth::new("scheduler", true));

        Self {
            postgres,
            chain,
            queue,
            scheduler,
            components: Arc::new(RwLock::new(components)),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run all component checks once
    #[instrument(skip(self))]
    pub async fn check_all(&self) {
        // Database ping
        if let Some(postgres) = &self.postgres {
            let started = std::time::Instant::now();
            let result = postgres.ping().await;
            let elapsed = started.elapsed().as_millis() as u64;
            self.update("database", |c| match &result {
                Ok(()) => c.mark_healthy(None, Some(elapsed)),
                Err(e) => c.mark_unhealthy(format!("ping failed: {}", e)),
            })
            .await;
        }

        // Chain endpoint
        let started = std::time::Instant::now();
        let result = self.chain.health().await;
        let elapsed = started.elapsed().as_millis() as u64;
        self.update("solana_rpc", |c| match &result {
            Ok(()) => c.mark_healthy(None, Some(elapsed)),
            Err(e) => c.mark_unhealthy(format!("health probe failed: {}", e)),
        })
        .await;

        // Queue depth
        let depth = self.queue.depth();
        self.update("trade_queue", |c| {
            if depth >= QUEUE_DEPTH_DEGRADED {
                c.mark_degraded(format!("backlog depth {}", depth));
            } else {
                c.mark_healthy(Some(format!("depth {}", depth)), None);
            }
        })
        .await;

        // Scheduler liveness
        let state = self.scheduler.state().await;
        self.update("scheduler", |c| match state {
            SchedulerState::Running | SchedulerState::Draining => {
                c.mark_healthy(Some(format!("{:?}", state)), None)
            }
            SchedulerState::Stopped => c.mark_unhealthy("scheduler stopped".to_string()),
        })
        .await;
    }

    async fn update<F: FnOnce(&mut ComponentHealth)>(&self, name: &str, f: F) {
        let mut components = self.components.write().await;
        if let Some(component) = components.get_mut(name) {
            f(component);
        }
    }

    /// Start periodic checks
    pub async fn start(self: &Arc<Self>, interval: std::time::Duration) -> AppResult<()> {
        {
            *self.is_running.write().await = true;
        }

        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !*service.is_running.read().await {
                    break;
                }
                service.check_all().await;

                let overall = service.overall().await;
                if overall == HealthStatus::Unhealthy {
                    error!("system unhealthy: critical component down");
                } else {
                    debug!(?overall, "health check pass complete");
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// Overall status: any critical failure is unhealthy, any non-critical
    /// failure degrades
    pub async fn overall(&self) -> HealthStatus {
        let components = self.components.read().await;

        let mut all_starting = true;
        let mut degraded = false;

        for component in components.values() {
            if component.status != HealthStatus::Starting {
                all_starting = false;
            }
            match component.status {
                HealthStatus::Unhealthy if component.is_critical => {
                    return HealthStatus::Unhealthy
                }
                HealthStatus::Unhealthy | HealthStatus::Degraded => degraded = true,
                _ => {}
            }
        }

        if all_starting {
            HealthStatus::Starting
        } else if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Snapshot of all component states
    pub async fn components(&self) -> Vec<ComponentHealth> {
        self.components.read().await.values().cloned().collect()
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService").finish()
    }
}
