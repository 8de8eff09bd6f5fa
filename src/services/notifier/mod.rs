//! Notification out-port
//!
//! The core emits per-user events (activation, deactivation, trade results,
//! errors) through the [`Notifier`] trait; the concrete sink is injected at
//! composition time. Delivery failure is logged and never propagates into
//! the scheduler or the queue consumer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::models::NotifierConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{Lamports, TradeRecord, UserId};

/// Kinds of per-user events the core emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserEventKind {
    Activated,
    Deactivated,
    TradeSucceeded,
    TradeFailed,
    Error,
}

impl UserEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::TradeSucceeded => "trade-succeeded",
            Self::TradeFailed => "trade-failed",
            Self::Error => "error",
        }
    }
}

/// One message addressed to exactly one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotification {
    pub user_id: UserId,
    pub kind: UserEventKind,
    /// Human-readable text shown to the user
    pub message: String,
    /// Structured payload for programmatic sinks
    pub payload: serde_json::Value,
}

impl UserNotification {
    /// Balance crossed the minimum trading balance upward
    pub fn activated(user_id: UserId, balance: Lamports, minimum: Lamports) -> Self {
        Self {
            message: format!(
                "Trading activated. Your balance reached {} (minimum {}); the agent now scans for opportunities for you.",
                balance, minimum
            ),
            payload: serde_json::json!({
                "balance": balance.value(),
                "minimum": minimum.value(),
            }),
            user_id,
            kind: UserEventKind::Activated,
        }
    }

    /// Balance crossed the minimum trading balance downward
    pub fn deactivated(user_id: UserId, balance: Lamports, minimum: Lamports) -> Self {
        Self {
            message: format!(
                "Trading paused. Your balance dropped to {} (minimum {}); add funds to resume.",
                balance, minimum
            ),
            payload: serde_json::json!({
                "balance": balance.value(),
                "minimum": minimum.value(),
            }),
            user_id,
            kind: UserEventKind::Deactivated,
        }
    }

    /// A trade confirmed on chain
    pub fn trade_succeeded(record: &TradeRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            kind: UserEventKind::TradeSucceeded,
            message: format!(
                "Trade executed: {} via {} for {}.",
                record.action, record.strategy_name, record.amount
            ),
            payload: serde_json::json!({
                "trade_id": record.trade_id,
                "strategy": record.strategy_name,
                "action": record.action,
                "amount": record.amount.value(),
                "profit": record.profit,
                "signature": record.tx_signature.as_ref().map(|s| s.as_str()),
            }),
        }
    }

    /// A trade attempt failed; funds remain untouched
    pub fn trade_failed(record: &TradeRecord, reason: &str) -> Self {
        Self {
            user_id: record.user_id.clone(),
            kind: UserEventKind::TradeFailed,
            message: format!(
                "Trade failed: {} via {}. Your funds are safe; the agent keeps scanning. ({})",
                record.action, record.strategy_name, reason
            ),
            payload: serde_json::json!({
                "trade_id": record.trade_id,
                "strategy": record.strategy_name,
                "outcome": record.outcome.as_str(),
                "reason": reason,
            }),
        }
    }
}

/// Abstract notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: UserNotification) -> AppResult<()>;
}

/// Sink that POSTs each notification as JSON to a webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> AppResult<Self> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| AppError::config("notifier.webhook_url is required"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, notification), fields(user = %notification.user_id, kind = notification.kind.as_str()))]
    async fn notify(&self, notification: UserNotification) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::network(format!(
                "webhook sink answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier").field("url", &self.url).finish()
    }
}

/// Sink that writes notifications to the log; development and simulation
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: UserNotification) -> AppResult<()> {
        info!(
            user = %notification.user_id,
            kind = notification.kind.as_str(),
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Deliver a notification, logging (not propagating) sink failures
pub async fn deliver(notifier: &dyn Notifier, notification: UserNotification) {
    let user = notification.user_id.clone();
    let kind = notification.kind;
    if let Err(e) = notifier.notify(notification).await {
        warn!(user = %user, kind = kind.as_str(), "notification delivery failed: {}", e);
    }
}

#[cfg(test)]
pub mod testing {
    //! Recording sink for the scheduler and queue tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<UserNotification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<UserNotification> {
            self.sent.lock().expect("notifier lock").clone()
        }

        pub fn sent_to(&self, user_id: &UserId) -> Vec<UserNotification> {
            self.sent()
                .into_iter()
                .filter(|n| &n.user_id == user_id)
                .collect()
        }

        pub fn count_of(&self, user_id: &UserId, kind: UserEventKind) -> usize {
            self.sent_to(user_id)
                .iter()
                .filter(|n| n.kind == kind)
                .count()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: UserNotification) -> AppResult<()> {
            self.sent.lock().expect("notifier lock").push(notification);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    #[tokio::test]
    async fn test_activation_message_carries_amounts() {
        let n = UserNotification::activated(
            uid("u1"),
            Lamports::new(50_000_000),
            Lamports::new(10_000_000),
        );
        assert_eq!(n.kind, UserEventKind::Activated);
        assert!(n.message.contains("0.05"));
        assert_eq!(n.payload["balance"], 50_000_000u64);
    }

    #[tokio::test]
    async fn test_recording_sink_counts_by_kind() {
        let sink = RecordingNotifier::new();
        deliver(
            &sink,
            UserNotification::activated(uid("u1"), Lamports::new(2), Lamports::new(1)),
        )
        .await;
        deliver(
            &sink,
            UserNotification::deactivated(uid("u1"), Lamports::new(0), Lamports::new(1)),
        )
        .await;

        assert_eq!(sink.count_of(&uid("u1"), UserEventKind::Activated), 1);
        assert_eq!(sink.count_of(&uid("u1"), UserEventKind::Deactivated), 1);
        assert_eq!(sink.count_of(&uid("u2"), UserEventKind::Activated), 0);
    }

    #[tokio::test]
    async fn test_deliver_swallows_sink_failures() {
        struct DeadSink;

        #[async_trait]
        impl Notifier for DeadSink {
            async fn notify(&self, _: UserNotification) -> AppResult<()> {
                Err(AppError::network("sink down"))
            }
        }

        // Must not panic or propagate
        deliver(
            &DeadSink,
            UserNotification::activated(uid("u1"), Lamports::new(2), Lamports::new(1)),
        )
        .await;
    }
}
