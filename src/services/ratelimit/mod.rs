//! Shared RPC gate: token-bucket rate limiting for all outbound chain calls
//!
//! One gate instance is shared by the balance oracle and the trade executor.
//! Callers take one token per outbound RPC call; an empty bucket parks the
//! caller until refill. When the provider returns a rate-limit response
//! despite the gate, the effective rate is halved for a cooldown window and
//! a signal is raised for the scheduler to widen its interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::models::RateLimitConfig;

/// Token bucket state
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    penalty_until: Option<Instant>,
}

/// Gate statistics for health reporting
#[derive(Debug, Clone, Default)]
pub struct GateStats {
    pub acquired: u64,
    pub waits: u64,
    pub provider_rejections: u64,
}

/// Token-bucket RPC gate shared across services
pub struct RpcGate {
    sustained: f64,
    burst: f64,
    penalty: Duration,
    bucket: Mutex<Bucket>,
    /// Set when the provider rejected a call; drained by the scheduler
    rate_limit_signal: AtomicBool,
    acquired: AtomicU64,
    waits: AtomicU64,
    rejections: AtomicU64,
}

impl RpcGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            sustained: config.sustained,
            burst: config.burst,
            penalty: Duration::from_secs(config.penalty_secs),
            bucket: Mutex::new(Bucket {
                tokens: config.burst,
                last_refill: Instant::now(),
                penalty_until: None,
            }),
            rate_limit_signal: AtomicBool::new(false),
            acquired: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Take one token, parking the caller until one is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("gate lock");
                let rate = self.effective_rate(&bucket);

                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.last_refill = now;
                bucket.tokens = (bucket.tokens + elapsed * rate).min(self.burst);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    self.acquired.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                // Time until one whole token has accumulated
                Duration::from_secs_f64((1.0 - bucket.tokens) / rate)
            };

            self.waits.fetch_add(1, Ordering::Relaxed);
            debug!("RPC gate empty, parking for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a provider-side rate-limit response: halve the effective rate
    /// for the penalty window and raise the scheduler signal
    pub fn report_provider_rejection(&self) {
        let mut bucket = self.bucket.lock().expect("gate lock");
        bucket.penalty_until = Some(Instant::now() + self.penalty);
        self.rate_limit_signal.store(true, Ordering::SeqCst);
        self.rejections.fetch_add(1, Ordering::Relaxed);
        warn!(
            "provider rate limit hit; gate rate halved for {:?}",
            self.penalty
        );
    }

    /// Drain the rate-limit signal; true at most once per raise
    pub fn take_rate_limit_signal(&self) -> bool {
        self.rate_limit_signal.swap(false, Ordering::SeqCst)
    }

    fn effective_rate(&self, bucket: &Bucket) -> f64 {
        match bucket.penalty_until {
            Some(until) if Instant::now() < until => (self.sustained / 2.0).max(0.1),
            _ => self.sustained,
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            provider_rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RpcGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcGate")
            .field("sustained", &self.sustained)
            .field("burst", &self.burst)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn gate(sustained: f64, burst: f64) -> RpcGate {
        RpcGate::new(&RateLimitConfig {
            sustained,
            burst,
            penalty_secs: 1,
        })
    }

    #[tokio::test]
    async fn test_burst_then_park() {
        let gate = gate(1000.0, 3.0);

        let start = Instant::now();
        for _ in 0..3 {
            gate.acquire().await;
        }
        // Burst drains instantly
        assert!(start.elapsed() < Duration::from_millis(50));

        // Fourth token requires a refill wait (~1ms at 1000/s)
        gate.acquire().await;
        assert_eq!(gate.stats().acquired, 4);
    }

    #[tokio::test]
    async fn test_rate_bounded_over_window() {
        // 50 tokens/s, burst 5: 15 acquisitions need >= ~200ms of refill
        let gate = Arc::new(gate(50.0, 5.0));
        let start = Instant::now();
        for _ in 0..15 {
            gate.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_signal_raised_once_per_rejection() {
        let gate = gate(10.0, 10.0);
        assert!(!gate.take_rate_limit_signal());

        gate.report_provider_rejection();
        assert!(gate.take_rate_limit_signal());
        assert!(!gate.take_rate_limit_signal());
    }

    #[tokio::test]
    async fn test_penalty_halves_rate() {
        let gate = gate(100.0, 1.0);
        gate.acquire().await; // drain the bucket

        gate.report_provider_rejection();

        // At the halved rate (50/s) a token takes ~20ms instead of ~10ms
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
