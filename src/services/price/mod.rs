//! Shared price cache (process-wide, TTL-bounded)
//!
//! One instance is shared by every per-user scan in a cycle so a token price
//! loaded for the first user is a cache hit for the rest. Concurrent misses
//! on the same key coalesce into a single loader call. Constructed
//! explicitly and injected; there is no global.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::models::PriceCacheConfig;
use crate::core::error::AppResult;

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

/// Cache statistics for health reporting and the reuse property tests
#[derive(Debug, Clone, Default)]
pub struct PriceCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loader_calls: u64,
}

/// Process-wide TTL cache for token prices
pub struct PriceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedPrice>>,
    /// Per-key guards that serialize concurrent misses on the same token
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loader_calls: AtomicU64,
}

impl PriceCache {
    pub fn new(config: &PriceCacheConfig) -> Self {
        Self::with_ttl(Duration::from_secs(config.ttl_secs))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loader_calls: AtomicU64::new(0),
        }
    }

    /// Fresh cached price, if any
    pub async fn get_if_fresh(&self, token: &str) -> Option<Decimal> {
        let entries = self.entries.read().await;
        entries
            .get(token)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.price)
    }

    /// Get a price, calling `loader` on a miss. Concurrent misses on the
    /// same token share one loader call.
    pub async fn get_or_load<F, Fut>(&self, token: &str, loader: F) -> AppResult<Decimal>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Decimal>>,
    {
        if let Some(price) = self.get_if_fresh(token).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(price);
        }

        // Single-flight: take the per-key guard, then re-check under it
        let guard = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(token.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _held = guard.lock().await;

        if let Some(price) = self.get_if_fresh(token).await {
            // Another caller loaded it while we waited on the guard
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(price);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.loader_calls.fetch_add(1, Ordering::Relaxed);
        debug!(token, "price cache miss, loading");

        let price = loader().await?;
        self.insert(token, price).await;

        Ok(price)
    }

    /// Insert a price directly (refresh paths, tests)
    pub async fn insert(&self, token: &str, price: Decimal) {
        self.entries.write().await.insert(
            token.to_string(),
            CachedPrice {
                price,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were evicted
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.fetched_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn stats(&self) -> PriceCacheStats {
        PriceCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCache").field("ttl", &self.ttl).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_second_read_is_a_hit() {
        let cache = PriceCache::with_ttl(Duration::from_secs(60));
        let loads = AtomicU32::new(0);

        for _ in 0..5 {
            let price = cache
                .get_or_load("SOL", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(dec!(142.50))
                })
                .await
                .unwrap();
            assert_eq!(price, dec!(142.50));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.loader_calls, 1);
        assert_eq!(stats.hits, 4);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let cache = Arc::new(PriceCache::with_ttl(Duration::from_secs(60)));
        let loads = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("JUP", || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        // Hold the flight long enough for others to pile up
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(dec!(0.85))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), dec!(0.85));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reloads() {
        let cache = PriceCache::with_ttl(Duration::from_millis(10));
        cache.insert("SOL", dec!(100)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get_if_fresh("SOL").await.is_none());

        let price = cache
            .get_or_load("SOL", || async { Ok(dec!(101)) })
            .await
            .unwrap();
        assert_eq!(price, dec!(101));
    }

    #[tokio::test]
    async fn test_loader_error_propagates_and_caches_nothing() {
        let cache = PriceCache::with_ttl(Duration::from_secs(60));

        let result = cache
            .get_or_load("BONK", || async {
                Err(crate::core::error::AppError::network("price API down"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get_if_fresh("BONK").await.is_none());

        // Next call tries again
        let price = cache
            .get_or_load("BONK", || async { Ok(dec!(0.00002)) })
            .await
            .unwrap();
        assert_eq!(price, dec!(0.00002));
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let cache = PriceCache::with_ttl(Duration::from_millis(10));
        cache.insert("A", dec!(1)).await;
        cache.insert("B", dec!(2)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.insert("C", dec!(3)).await;

        assert_eq!(cache.evict_expired().await, 2);
        assert!(cache.get_if_fresh("C").await.is_some());
    }
}
