//! User scheduler: the scan-cycle control core
//!
//! One cycle enumerates every user with a wallet, staggers large
//! populations across the configured window, batch-refreshes balances,
//! detects minimum-balance threshold crossings, and runs scan → rank →
//! enqueue for each funded user. Per-user failures are logged with user
//! context and never remove another user from the cycle; nothing short of a
//! fatal startup error stops the loop. The interval adapts to rate-limit
//! signals and to streaks of empty cycles.

use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::models::SchedulerConfig;
use crate::core::result::utils::with_timeout;
use crate::core::types::{Lamports, UserId, WalletAddress};
use crate::infrastructure::database::UserRepository;
use crate::services::balance::BalanceOracle;
use crate::services::notifier::{deliver, Notifier, UserNotification};
use crate::services::ranker::{OpportunityRanker, RankedOpportunity};
use crate::services::ratelimit::RpcGate;
use crate::services::scanner::StrategyScanner;
use crate::services::trading::TradeQueue;
use crate::services::wallet::WalletStore;

/// Hard floor on the cycle interval, seconds
const MIN_SCAN_INTERVAL_SECS: f64 = 5.0;

/// Users per stagger slot for large populations
const USERS_PER_SLOT: usize = 20;

/// Scheduler lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    /// No new cycles; the in-flight cycle and the queue drain finish
    Draining,
}

/// What one cycle did; used for logging and by the tests
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub users_total: usize,
    pub users_scanned: usize,
    pub opportunities_found: usize,
    pub trades_enqueued: usize,
    pub activations: usize,
    pub deactivations: usize,
}

/// Per-user result inside a cycle
struct UserOutcome {
    scanned: bool,
    activated: bool,
    deactivated: bool,
    found: usize,
    approved: Vec<RankedOpportunity>,
}

impl UserOutcome {
    fn skipped() -> Self {
        Self {
            scanned: false,
            activated: false,
            deactivated: false,
            found: 0,
            approved: Vec::new(),
        }
    }
}

/// The scan-cycle scheduler (C8)
pub struct UserScheduler {
    wallets: Arc<WalletStore>,
    users: Arc<dyn UserRepository>,
    oracle: Arc<BalanceOracle>,
    scanner: Arc<StrategyScanner>,
    ranker: Arc<OpportunityRanker>,
    queue: Arc<TradeQueue>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<RpcGate>,
    config: SchedulerConfig,
    state: RwLock<SchedulerState>,
    stop_notify: Notify,
    /// Adaptive interval in seconds; starts at the configured base
    current_interval: std::sync::Mutex<f64>,
    empty_cycles: AtomicU32,
    cycles_completed: AtomicU64,
}

impl UserScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallets: Arc<WalletStore>,
        users: Arc<dyn UserRepository>,
        oracle: Arc<BalanceOracle>,
        scanner: Arc<StrategyScanner>,
        ranker: Arc<OpportunityRanker>,
        queue: Arc<TradeQueue>,
        notifier: Arc<dyn Notifier>,
        gate: Arc<RpcGate>,
        config: SchedulerConfig,
    ) -> Self {
        let base_interval = config.scan_interval_secs as f64;
        Self {
            wallets,
            users,
            oracle,
            scanner,
            ranker,
            queue,
            notifier,
            gate,
            config,
            state: RwLock::new(SchedulerState::Stopped),
            stop_notify: Notify::new(),
            current_interval: std::sync::Mutex::new(base_interval),
            empty_cycles: AtomicU32::new(0),
            cycles_completed: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Run cycles until stopped. The in-flight cycle always completes;
    /// `stop` only prevents new ones.
    pub async fn run(self: Arc<Self>) {
        {
            let mut state = self.state.write().await;
            if *state != SchedulerState::Stopped {
                warn!("scheduler already running");
                return;
            }
            *state = SchedulerState::Running;
        }
        info!(
            interval = self.config.scan_interval_secs,
            min_trading_balance = self.config.min_trading_balance,
            "scheduler started"
        );

        loop {
            if self.state().await == SchedulerState::Draining {
                break;
            }

            let report = self.scan_cycle().await;
            self.cycles_completed.fetch_add(1, Ordering::Relaxed);

            let sleep_for = self.next_interval(report.opportunities_found > 0);
            debug!(?sleep_for, "cycle complete, sleeping");

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.stop_notify.notified() => {}
            }
        }

        *self.state.write().await = SchedulerState::Stopped;
        info!("scheduler stopped");
    }

    /// Transition to draining; the running cycle finishes, no new one starts
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == SchedulerState::Running {
            *state = SchedulerState::Draining;
            info!("scheduler draining");
        } else {
            *state = SchedulerState::Stopped;
        }
        self.stop_notify.notify_waiters();
    }

    /// One full pass over all users
    #[instrument(skip(self))]
    pub async fn scan_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let user_ids = match self.wallets.list_user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("cannot enumerate users, skipping cycle: {}", e);
                return report;
            }
        };

        if user_ids.is_empty() {
            debug!("no users registered, nothing to scan");
            return report;
        }

        // Resolve addresses; a user whose metadata cannot be read is skipped
        // this cycle, never the cycle itself
        let mut population: Vec<(UserId, WalletAddress)> = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            match self.wallets.address_of(&user_id).await {
                Ok(Some(address)) => population.push((user_id, address)),
                Ok(None) => {}
                Err(e) => warn!(user_id = %user_id, "skipping user this cycle: {}", e),
            }
        }
        report.users_total = population.len();

        let slot_plan = Self::stagger_plan(
            population.len(),
            self.config.stagger_threshold_users,
            self.config.stagger_window_secs,
        );
        if let Some((slot_size, delay)) = slot_plan {
            info!(
                users = population.len(),
                slot_size,
                ?delay,
                "large population, staggering cycle"
            );
            for (index, slot) in population.chunks(slot_size).enumerate() {
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.process_slot(slot, &mut report).await;
            }
        } else {
            self.process_slot(&population, &mut report).await;
        }

        info!(
            users = report.users_total,
            scanned = report.users_scanned,
            opportunities = report.opportunities_found,
            enqueued = report.trades_enqueued,
            "scan cycle finished"
        );
        report
    }

    /// Deterministic slot partition for large populations: roughly
    /// [`USERS_PER_SLOT`] users per slot, spread across the stagger window
    fn stagger_plan(
        population: usize,
        threshold: usize,
        window_secs: u64,
    ) -> Option<(usize, Duration)> {
        if population <= threshold {
            return None;
        }
        let slots = population.div_ceil(USERS_PER_SLOT).max(1);
        let slot_size = population.div_ceil(slots);
        let delay = if slots > 1 {
            Duration::from_secs_f64(window_secs as f64 / slots as f64)
        } else {
            Duration::ZERO
        };
        Some((slot_size, delay))
    }

    /// Refresh one slot's balances, then scan its users. Scans run under the
    /// configured concurrency but results are consumed in slot order, so the
    /// enqueue order across users is the scheduler's iteration order.
    async fn process_slot(&self, slot: &[(UserId, WalletAddress)], report: &mut CycleReport) {
        self.oracle.batch_refresh(slot).await;

        let mut outcomes = stream::iter(slot.iter())
            .map(|(user_id, address)| self.process_user(user_id, address))
            .buffered(self.config.scan_concurrency.max(1));

        let mut index = 0usize;
        while let Some(outcome) = outcomes.next().await {
            let (user_id, _) = &slot[index];
            index += 1;

            if outcome.scanned {
                report.users_scanned += 1;
            }
            report.opportunities_found += outcome.found;
            report.activations += outcome.activated as usize;
            report.deactivations += outcome.deactivated as usize;

            for ranked in outcome.approved {
                let enqueue = self
                    .queue
                    .enqueue(
                        user_id.clone(),
                        ranked.opportunity,
                        ranked.risk_tier,
                    )
                    .await;
                match enqueue {
                    Ok(()) => report.trades_enqueued += 1,
                    Err(e) => {
                        warn!(user_id = %user_id, "enqueue failed: {}", e);
                    }
                }
            }
        }
    }

    /// Everything the cycle does for one user. Infallible by construction:
    /// every inner failure is logged with the user context and degrades to a
    /// skipped scan.
    async fn process_user(&self, user_id: &UserId, address: &WalletAddress) -> UserOutcome {
        let minimum = Lamports::new(self.config.min_trading_balance);

        let Some(snapshot) = self.oracle.snapshot(user_id).await else {
            // No reading at all this cycle (fresh user during an outage)
            return UserOutcome::skipped();
        };

        let mut outcome = UserOutcome::skipped();
        let preferences = self.users.get_preferences(user_id).await.unwrap_or_default();

        // Threshold crossings: exactly one notification per direction
        // change. A user never observed before counts as previously empty
        // (custodial keypairs start unfunded); restored snapshots carry
        // their previous reading so restarts do not replay activations.
        {
            let previous = snapshot.previous.unwrap_or(Lamports::ZERO);
            let was_active = previous >= minimum;
            let is_active = snapshot.current >= minimum;

            if !was_active && is_active {
                info!(user_id = %user_id, balance = %snapshot.current, "trading activated");
                outcome.activated = true;
                if preferences.notifications_enabled {
                    deliver(
                        self.notifier.as_ref(),
                        UserNotification::activated(user_id.clone(), snapshot.current, minimum),
                    )
                    .await;
                }
                self.oracle.commit_crossing(user_id).await;
            } else if was_active && !is_active {
                info!(user_id = %user_id, balance = %snapshot.current, "trading deactivated");
                outcome.deactivated = true;
                if preferences.notifications_enabled {
                    deliver(
                        self.notifier.as_ref(),
                        UserNotification::deactivated(user_id.clone(), snapshot.current, minimum),
                    )
                    .await;
                }
                self.oracle.commit_crossing(user_id).await;
            }
        }

        // Balance gating: below the minimum there is no scan and no trade
        if !snapshot.is_active(minimum) {
            debug!(user_id = %user_id, balance = %snapshot.current, "below minimum, skipping scan");
            return outcome;
        }

        let timeout = Duration::from_secs(self.config.per_user_scan_timeout_secs);
        let scan = with_timeout(timeout, "user_scan", async {
            Ok(self
                .scanner
                .scan_user(user_id, address, snapshot.current, &preferences)
                .await)
        })
        .await;

        let opportunities = match scan {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id = %user_id, "scan aborted: {}", e);
                return outcome;
            }
        };

        outcome.scanned = true;
        outcome.found = opportunities.len();
        outcome.approved = self.ranker.rank(opportunities).await;
        outcome
    }

    /// Compute the next sleep: grow on rate-limit signals, decay toward the
    /// base otherwise, widen after a streak of empty cycles, floor at 5 s
    fn next_interval(&self, had_opportunities: bool) -> Duration {
        let rate_limited = self.gate.take_rate_limit_signal();
        let base = self.config.scan_interval_secs as f64;
        let backoff = 1.0 + self.config.rate_limit_backoff;

        let mut current = self.current_interval.lock().expect("interval lock");
        if rate_limited {
            *current *= backoff;
            warn!(
                "rate limit signal: widening scan interval to {:.1}s",
                *current
            );
        } else if *current > base {
            *current = (*current / backoff).max(base);
        }

        let empty_streak = if had_opportunities {
            self.empty_cycles.store(0, Ordering::Relaxed);
            0
        } else {
            self.empty_cycles.fetch_add(1, Ordering::Relaxed) + 1
        };

        let mut sleep_secs = *current;
        if empty_streak >= self.config.empty_scan_threshold {
            sleep_secs += self.config.empty_scan_extra_secs as f64;
        }

        Duration::from_secs_f64(sleep_secs.max(MIN_SCAN_INTERVAL_SECS))
    }
}

impl std::fmt::Debug for UserScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserScheduler")
            .field("cycles_completed", &self.cycles_completed())
            .finish()
    }
}
