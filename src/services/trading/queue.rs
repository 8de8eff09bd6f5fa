//! Trade queue: bounded FIFO with exactly one consumer
//!
//! Trades from all users funnel into one bounded channel consumed by a
//! single task, so no two submissions are ever in flight concurrently and
//! enqueue order is submission order. Producers (the scheduler) block on
//! enqueue when the queue is full, which naturally throttles scanning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use super::executor::TradeExecutor;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{Opportunity, RiskTier, Timestamp, UserId};

/// One approved trade waiting for the consumer
#[derive(Debug, Clone)]
pub struct QueuedTrade {
    pub user_id: UserId,
    pub opportunity: Opportunity,
    pub risk_tier: RiskTier,
    pub queued_at: Timestamp,
}

/// Queue statistics for health reporting
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub enqueued: u64,
    pub executed: u64,
}

/// Bounded trade queue with its single consumer task
pub struct TradeQueue {
    sender: std::sync::RwLock<Option<mpsc::Sender<QueuedTrade>>>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    enqueued: Arc<AtomicU64>,
    executed: Arc<AtomicU64>,
}

impl TradeQueue {
    /// Spawn the consumer and return the queue handle
    pub fn start(executor: Arc<TradeExecutor>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<QueuedTrade>(capacity.max(1));
        let enqueued = Arc::new(AtomicU64::new(0));
        let executed = Arc::new(AtomicU64::new(0));

        let executed_in_task = executed.clone();
        let consumer = tokio::spawn(async move {
            info!("trade queue consumer started");

            // Strictly serial: the next trade is not taken until the current
            // one has been recorded and notified
            while let Some(trade) = receiver.recv().await {
                executor.execute(trade).await;
                executed_in_task.fetch_add(1, Ordering::SeqCst);
            }

            info!("trade queue consumer drained and stopped");
        });

        Self {
            sender: std::sync::RwLock::new(Some(sender)),
            consumer: tokio::sync::Mutex::new(Some(consumer)),
            enqueued,
            executed,
        }
    }

    /// Enqueue one approved trade. Awaits (backpressure) while the queue is
    /// full; fails only after shutdown.
    pub async fn enqueue(
        &self,
        user_id: UserId,
        opportunity: Opportunity,
        risk_tier: RiskTier,
    ) -> AppResult<()> {
        let trade = QueuedTrade {
            user_id,
            opportunity,
            risk_tier,
            queued_at: Timestamp::now(),
        };

        let sender = self
            .sender
            .read()
            .expect("queue lock")
            .clone()
            .ok_or_else(|| AppError::internal("trade queue is shut down"))?;

        sender
            .send(trade)
            .await
            .map_err(|_| AppError::internal("trade queue is shut down"))?;
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Trades accepted but not yet executed
    pub fn depth(&self) -> u64 {
        let stats = self.stats();
        stats.enqueued.saturating_sub(stats.executed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            executed: self.executed.load(Ordering::SeqCst),
        }
    }

    /// Drain and stop: close the channel so the consumer finishes the
    /// accepted backlog, then await it up to `drain_timeout`. Enqueues after
    /// this point fail.
    pub async fn stop(&self, drain_timeout: Duration) {
        drop(self.sender.write().expect("queue lock").take());

        let handle = self.consumer.lock().await.take();
        if let Some(handle) = handle {
            match timeout(drain_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("trade queue consumer panicked: {}", e),
                Err(_) => warn!("trade queue consumer did not drain within {:?}", drain_timeout),
            }
        }
    }
}

impl std::fmt::Debug for TradeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("TradeQueue")
            .field("enqueued", &stats.enqueued)
            .field("executed", &stats.executed)
            .finish()
    }
}
