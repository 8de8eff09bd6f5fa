//! Balance oracle: batched, rate-gated balance reads with cache fallback
//!
//! Keeps one in-memory snapshot per user (current, previous, refresh time)
//! so the scheduler can detect minimum-balance threshold crossings. Reads
//! prefer the batch path: the input is chunked and each chunk becomes one
//! multi-account RPC request. On RPC failure the last known reading stands;
//! a user never observed reads as zero. Errors never cross the scheduler
//! boundary.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::models::SchedulerConfig;
use crate::core::types::{Lamports, UserId, WalletAddress};
use crate::infrastructure::database::{BalanceRepository, StoredBalance};

/// Per-user balance snapshot retained across cycles
#[derive(Debug, Clone, Copy)]
pub struct BalanceSnapshot {
    /// Most recent successful reading
    pub current: Lamports,
    /// Reading from the previous successful refresh; `None` until a user has
    /// been observed twice
    pub previous: Option<Lamports>,
    /// Monotonic time of the last live refresh; `None` for restored
    /// snapshots, which are stale by definition
    refreshed: Option<Instant>,
    /// Wall-clock time of the last successful refresh, for persistence
    pub observed_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Trading-active flag: balance at or above the minimum trading balance
    pub fn is_active(&self, min_trading_balance: Lamports) -> bool {
        self.current >= min_trading_balance
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed.is_some_and(|at| at.elapsed() < ttl)
    }
}

/// Batched balance reads over the chain boundary with last-known-good fallback
pub struct BalanceOracle {
    chain: Arc<dyn crate::services::solana::ChainRpc>,
    store: Arc<dyn BalanceRepository>,
    ttl: Duration,
    batch_size: usize,
    batch_concurrency: usize,
    snapshots: RwLock<HashMap<UserId, BalanceSnapshot>>,
    refresh_failures: AtomicU64,
}

impl BalanceOracle {
    pub fn new(
        chain: Arc<dyn crate::services::solana::ChainRpc>,
        store: Arc<dyn BalanceRepository>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            chain,
            store,
            ttl: Duration::from_secs(config.balance_cache_ttl_secs),
            batch_size: config.rpc_batch_size.max(1),
            batch_concurrency: config.balance_batch_concurrency.max(1),
            snapshots: RwLock::new(HashMap::new()),
            refresh_failures: AtomicU64::new(0),
        }
    }

    /// Seed snapshots from persisted observations so a restart does not
    /// replay activation notifications. Previous is set equal to current:
    /// no crossing until a genuinely new reading arrives.
    pub async fn load_persisted(&self) {
        match self.store.load_balances().await {
            Ok(persisted) => {
                let count = persisted.len();
                let mut snapshots = self.snapshots.write().await;
                for (user_id, stored) in persisted {
                    snapshots.insert(
                        user_id,
                        BalanceSnapshot {
                            current: Lamports::new(stored.lamports),
                            previous: Some(Lamports::new(stored.lamports)),
                            refreshed: None,
                            observed_at: stored.observed_at,
                        },
                    );
                }
                debug!(count, "balance snapshots restored");
            }
            Err(e) => warn!("failed to restore balance snapshots: {}", e),
        }
    }

    /// Current snapshot for a user, if one exists
    pub async fn snapshot(&self, user_id: &UserId) -> Option<BalanceSnapshot> {
        self.snapshots.read().await.get(user_id).copied()
    }

    /// Cached balance for a user; zero when never observed
    pub async fn cached_balance(&self, user_id: &UserId) -> Lamports {
        self.snapshot(user_id)
            .await
            .map(|s| s.current)
            .unwrap_or(Lamports::ZERO)
    }

    /// Single-user read: cache when fresh, RPC otherwise, cache fallback on
    /// failure, zero when nothing is known. Never errors.
    #[instrument(skip(self, address))]
    pub async fn get_balance(&self, user_id: &UserId, address: &WalletAddress) -> Lamports {
        if let Some(snapshot) = self.snapshot(user_id).await {
            if snapshot.is_fresh(self.ttl) {
                return snapshot.current;
            }
        }

        match self.chain.get_balance(address).await {
            Ok(lamports) => {
                self.record_reading(user_id, lamports).await;
                lamports
            }
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(user_id = %user_id, "balance read failed, using cache: {}", e);
                self.cached_balance(user_id).await
            }
        }
    }

    /// Batch refresh for a cycle: chunk the population, one multi-account
    /// request per chunk, a bounded pool draining the chunks in parallel.
    /// Returns the post-refresh balance for every requested user.
    #[instrument(skip(self, users), fields(count = users.len()))]
    pub async fn batch_refresh(
        &self,
        users: &[(UserId, WalletAddress)],
    ) -> HashMap<UserId, Lamports> {
        let mut results: HashMap<UserId, Lamports> = HashMap::with_capacity(users.len());

        // Fresh cache entries skip the RPC entirely
        let mut to_fetch: Vec<(UserId, WalletAddress)> = Vec::new();
        {
            let snapshots = self.snapshots.read().await;
            for (user_id, address) in users {
                match snapshots.get(user_id) {
                    Some(snapshot) if snapshot.is_fresh(self.ttl) => {
                        results.insert(user_id.clone(), snapshot.current);
                    }
                    _ => to_fetch.push((user_id.clone(), address.clone())),
                }
            }
        }

        let chunks: Vec<Vec<(UserId, WalletAddress)>> = to_fetch
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();

        let chunk_results: Vec<HashMap<UserId, Lamports>> = stream::iter(chunks)
            .map(|chunk| self.refresh_chunk(chunk))
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        for chunk in chunk_results {
            results.extend(chunk);
        }
        results
    }

    /// One multi-account RPC request; failures fall back per user
    async fn refresh_chunk(
        &self,
        chunk: Vec<(UserId, WalletAddress)>,
    ) -> HashMap<UserId, Lamports> {
        let addresses: Vec<WalletAddress> = chunk.iter().map(|(_, a)| a.clone()).collect();

        match self.chain.get_balances(&addresses).await {
            Ok(balances) => {
                let mut out = HashMap::with_capacity(chunk.len());
                for ((user_id, _), balance) in chunk.into_iter().zip(balances) {
                    // An absent account simply has no lamports yet
                    let lamports = balance.unwrap_or(Lamports::ZERO);
                    self.record_reading(&user_id, lamports).await;
                    out.insert(user_id, lamports);
                }
                out
            }
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!("batch balance refresh failed, using cached values: {}", e);
                let mut out = HashMap::with_capacity(chunk.len());
                for (user_id, _) in chunk {
                    let cached = self.cached_balance(&user_id).await;
                    out.insert(user_id, cached);
                }
                out
            }
        }
    }

    /// Fold a successful reading into the snapshot and persist best-effort
    async fn record_reading(&self, user_id: &UserId, lamports: Lamports) {
        let observed_at = Utc::now();
        {
            let mut snapshots = self.snapshots.write().await;
            let snapshot = snapshots.entry(user_id.clone()).or_insert(BalanceSnapshot {
                current: lamports,
                previous: None,
                refreshed: None,
                observed_at,
            });
            if snapshot.previous.is_some() || snapshot.current != lamports {
                snapshot.previous = Some(snapshot.current);
            }
            snapshot.current = lamports;
            snapshot.refreshed = Some(Instant::now());
            snapshot.observed_at = observed_at;
        }

        if let Err(e) = self
            .store
            .upsert_balance(
                user_id,
                StoredBalance {
                    lamports: lamports.value(),
                    observed_at,
                },
            )
            .await
        {
            // Snapshot persistence is best-effort; the in-memory state rules
            warn!(user_id = %user_id, "balance snapshot persist failed: {}", e);
        }
    }

    /// Mark the crossing as handled: previous tracks current until the next
    /// genuinely different reading
    pub async fn commit_crossing(&self, user_id: &UserId) {
        let mut snapshots = self.snapshots.write().await;
        if let Some(snapshot) = snapshots.get_mut(user_id) {
            snapshot.previous = Some(snapshot.current);
        }
    }

    /// RPC failures observed since start
    pub fn failure_count(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BalanceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceOracle")
            .field("ttl", &self.ttl)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::MemoryStore;
    use crate::services::solana::SimulatedChain;

    fn setup(ttl_secs: u64) -> (Arc<SimulatedChain>, BalanceOracle) {
        let chain = Arc::new(SimulatedChain::new());
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            balance_cache_ttl_secs: ttl_secs,
            rpc_batch_size: 10,
            balance_batch_concurrency: 2,
            ..SchedulerConfig::default()
        };
        let oracle = BalanceOracle::new(chain.clone(), store, &config);
        (chain, oracle)
    }

    fn user(n: u32) -> (UserId, WalletAddress) {
        (
            UserId::new_unchecked(format!("u{}", n)),
            WalletAddress::new_unchecked(format!("Addr{:04}", n)),
        )
    }

    #[tokio::test]
    async fn test_single_read_caches() {
        let (chain, oracle) = setup(60);
        let (uid, addr) = user(1);
        chain.set_balance(&addr, Lamports::new(42));

        assert_eq!(oracle.get_balance(&uid, &addr).await, Lamports::new(42));

        // Chain changes but the cache is fresh
        chain.set_balance(&addr, Lamports::new(99));
        assert_eq!(oracle.get_balance(&uid, &addr).await, Lamports::new(42));
    }

    #[tokio::test]
    async fn test_failure_returns_last_known_good() {
        let (chain, oracle) = setup(0); // everything always stale
        let (uid, addr) = user(1);
        chain.set_balance(&addr, Lamports::new(42));

        assert_eq!(oracle.get_balance(&uid, &addr).await, Lamports::new(42));

        chain.set_outage(true);
        assert_eq!(oracle.get_balance(&uid, &addr).await, Lamports::new(42));
        assert_eq!(oracle.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_with_no_history_reads_zero() {
        let (chain, oracle) = setup(60);
        let (uid, addr) = user(1);
        chain.set_outage(true);

        assert_eq!(oracle.get_balance(&uid, &addr).await, Lamports::ZERO);
        assert_eq!(oracle.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_refresh_covers_all_users() {
        let (chain, oracle) = setup(0);
        let users: Vec<_> = (0..25).map(user).collect();
        for (i, (_, addr)) in users.iter().enumerate() {
            chain.set_balance(addr, Lamports::new(i as u64 * 100));
        }

        let results = oracle.batch_refresh(&users).await;
        assert_eq!(results.len(), 25);
        for (i, (uid, _)) in users.iter().enumerate() {
            assert_eq!(results[uid], Lamports::new(i as u64 * 100));
        }
    }

    #[tokio::test]
    async fn test_previous_tracks_crossings() {
        let (chain, oracle) = setup(0);
        let (uid, addr) = user(1);

        chain.set_balance(&addr, Lamports::new(5_000_000));
        oracle.batch_refresh(&[(uid.clone(), addr.clone())]).await;

        let snapshot = oracle.snapshot(&uid).await.unwrap();
        assert!(snapshot.previous.is_none());
        assert!(!snapshot.is_active(Lamports::new(10_000_000)));

        chain.set_balance(&addr, Lamports::new(50_000_000));
        oracle.batch_refresh(&[(uid.clone(), addr.clone())]).await;

        let snapshot = oracle.snapshot(&uid).await.unwrap();
        assert_eq!(snapshot.previous, Some(Lamports::new(5_000_000)));
        assert!(snapshot.is_active(Lamports::new(10_000_000)));
    }

    #[tokio::test]
    async fn test_outage_leaves_snapshots_untouched() {
        let (chain, oracle) = setup(0);
        let (uid, addr) = user(1);

        chain.set_balance(&addr, Lamports::new(20_000_000));
        oracle.batch_refresh(&[(uid.clone(), addr.clone())]).await;

        chain.set_outage(true);
        let results = oracle.batch_refresh(&[(uid.clone(), addr.clone())]).await;

        // Cached value returned, previous/current unchanged: no spurious
        // deactivation during an outage
        assert_eq!(results[&uid], Lamports::new(20_000_000));
        let snapshot = oracle.snapshot(&uid).await.unwrap();
        assert_eq!(snapshot.current, Lamports::new(20_000_000));
        assert!(snapshot.previous.is_none());
    }

    #[tokio::test]
    async fn test_persisted_snapshots_restore_without_crossing() {
        let chain = Arc::new(SimulatedChain::new());
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig::default();
        let (uid, _) = user(1);

        store
            .upsert_balance(
                &uid,
                StoredBalance {
                    lamports: 30_000_000,
                    observed_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let oracle = BalanceOracle::new(chain, store, &config);
        oracle.load_persisted().await;

        let snapshot = oracle.snapshot(&uid).await.unwrap();
        assert_eq!(snapshot.current, Lamports::new(30_000_000));
        // Previous equals current: restart emits no activation
        assert_eq!(snapshot.previous, Some(Lamports::new(30_000_000)));
    }
}
