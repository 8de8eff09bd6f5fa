//! PostgreSQL persistence implementation
//!
//! Connection pooling, migrations, and the parameterized repository
//! implementations. Every tenant-scoped query filters by `user_id` in SQL;
//! nothing is filtered in process after an over-broad read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{
    BalanceRepository, NewTrade, NewWallet, StoredBalance, TradeRepository, UserPreferences,
    UserRepository, WalletMetadata, WalletRepository,
};
use crate::config::models::DatabaseConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{
    LeaderboardEntry, Lamports, PerformanceMetrics, Timestamp, TradeOutcome, TradeRecord,
    TxSignature, UserId,
};

/// PostgreSQL-backed store serving all repository traits
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    slow_query_threshold: Duration,
}

impl PostgresStore {
    /// Create the connection pool and optionally run migrations
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        if config.url.is_empty() {
            return Err(AppError::config("database.url is required"));
        }

        let connect_options = config
            .url
            .parse::<PgConnectOptions>()
            .map_err(|e| AppError::config(format!("invalid database URL: {}", e)))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .test_before_acquire(true)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                // Unreachable database at startup is fatal by contract
                AppError::config(format!("failed to connect to database: {}", e))
            })?;

        info!(
            max = config.max_connections,
            min = config.min_connections,
            "database pool established"
        );

        let store = Self {
            pool,
            slow_query_threshold: Duration::from_millis(config.slow_query_threshold_ms),
        };

        if config.auto_migrate {
            store.migrate().await?;
        }

        Ok(store)
    }

    /// Run pending migrations
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("migration failed: {}", e), "migrate".into()))?;

        info!("database migrations applied");
        Ok(())
    }

    /// Liveness probe used by the health service
    pub async fn ping(&self) -> AppResult<()> {
        let started = std::time::Instant::now();

        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("ping failed: {}", e), "ping".into()))?;

        let elapsed = started.elapsed();
        if elapsed > self.slow_query_threshold {
            warn!("database ping took {:?}", elapsed);
        }

        Ok(())
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_wallet(row: &sqlx::postgres::PgRow) -> AppResult<WalletMetadata> {
        Ok(WalletMetadata {
            wallet_id: row.try_get("wallet_id")?,
            user_id: UserId::new_unchecked(row.try_get::<String, _>("user_id")?),
            public_key: row.try_get("public_key")?,
            derivation_path: row.try_get("derivation_path")?,
            mnemonic_word_count: row.try_get::<i16, _>("mnemonic_word_count")? as u8,
            kdf_method: row.try_get("kdf_method")?,
            encryption_method: row.try_get("encryption_method")?,
            created_at: row.try_get("created_at")?,
            last_unlocked: row.try_get("last_unlocked")?,
            blob_path: row.try_get("blob_path")?,
        })
    }

    fn row_to_trade(row: &sqlx::postgres::PgRow) -> AppResult<TradeRecord> {
        let outcome: String = row.try_get("outcome")?;
        Ok(TradeRecord {
            trade_id: row.try_get("trade_id")?,
            user_id: UserId::new_unchecked(row.try_get::<String, _>("user_id")?),
            strategy_name: row.try_get("strategy_name")?,
            action: row.try_get("action")?,
            amount: Lamports::new(row.try_get::<i64, _>("amount")? as u64),
            profit: row.try_get("profit")?,
            tx_signature: row
                .try_get::<Option<String>, _>("tx_signature")?
                .map(TxSignature::new),
            outcome: TradeOutcome::from_str(&outcome)?,
            executed_at: Timestamp::from_datetime(row.try_get("executed_at")?),
            details: row.try_get("details")?,
        })
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
        )
    }
}

#[async_trait]
impl WalletRepository for PostgresStore {
    async fn insert_wallet(&self, wallet: NewWallet) -> AppResult<WalletMetadata> {
        let row = sqlx::query(
            r#"
            INSERT INTO secure_wallets
                (user_id, public_key, derivation_path, mnemonic_word_count,
                 kdf_method, encryption_method, blob_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING wallet_id, user_id, public_key, derivation_path,
                      mnemonic_word_count, kdf_method, encryption_method,
                      created_at, last_unlocked, blob_path
            "#,
        )
        .bind(wallet.user_id.as_str())
        .bind(&wallet.public_key)
        .bind(&wallet.derivation_path)
        .bind(wallet.mnemonic_word_count as i16)
        .bind(&wallet.kdf_method)
        .bind(&wallet.encryption_method)
        .bind(&wallet.blob_path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                AppError::already_exists(
                    "wallet already registered".to_string(),
                    wallet.user_id.to_string(),
                )
            } else {
                AppError::database(e.to_string(), "insert_wallet".to_string())
            }
        })?;

        Self::row_to_wallet(&row)
    }

    async fn get_wallet(&self, user_id: &UserId) -> AppResult<Option<WalletMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT wallet_id, user_id, public_key, derivation_path,
                   mnemonic_word_count, kdf_method, encryption_method,
                   created_at, last_unlocked, blob_path
            FROM secure_wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "get_wallet".to_string()))?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM secure_wallets ORDER BY wallet_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string(), "list_user_ids".to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(UserId::new_unchecked(
                    row.try_get::<String, _>("user_id")?,
                ))
            })
            .collect()
    }

    async fn touch_last_unlocked(&self, user_id: &UserId) -> AppResult<()> {
        sqlx::query("UPDATE secure_wallets SET last_unlocked = NOW() WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string(), "touch_last_unlocked".to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn ensure_user(&self, user_id: &UserId) -> AppResult<()> {
        sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string(), "ensure_user".to_string()))?;
        Ok(())
    }

    async fn get_preferences(&self, user_id: &UserId) -> AppResult<UserPreferences> {
        let row = sqlx::query("SELECT preferences FROM users WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string(), "get_preferences".to_string()))?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("preferences")?;
                Ok(serde_json::from_value(value).unwrap_or_default())
            }
            None => Ok(UserPreferences::default()),
        }
    }

    async fn set_preferences(
        &self,
        user_id: &UserId,
        preferences: &UserPreferences,
    ) -> AppResult<()> {
        let value = serde_json::to_value(preferences)?;
        sqlx::query(
            r#"
            INSERT INTO users (user_id, preferences) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET preferences = EXCLUDED.preferences
            "#,
        )
        .bind(user_id.as_str())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "set_preferences".to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TradeRepository for PostgresStore {
    async fn append_trade(&self, trade: NewTrade) -> AppResult<TradeRecord> {
        let started = std::time::Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO trades
                (user_id, strategy_name, action, amount, profit,
                 tx_signature, outcome, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING trade_id, user_id, strategy_name, action, amount, profit,
                      tx_signature, outcome, executed_at, details
            "#,
        )
        .bind(trade.user_id.as_str())
        .bind(&trade.strategy_name)
        .bind(&trade.action)
        .bind(trade.amount as i64)
        .bind(trade.profit)
        .bind(&trade.tx_signature)
        .bind(trade.outcome.as_str())
        .bind(&trade.details)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "append_trade".to_string()))?;

        let elapsed = started.elapsed();
        if elapsed > self.slow_query_threshold {
            warn!(user_id = %trade.user_id, "slow trade append: {:?}", elapsed);
        }
        debug!(user_id = %trade.user_id, "trade record appended");

        Self::row_to_trade(&row)
    }

    async fn trades_for_user(&self, user_id: &UserId, limit: u32) -> AppResult<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, user_id, strategy_name, action, amount, profit,
                   tx_signature, outcome, executed_at, details
            FROM trades
            WHERE user_id = $1
            ORDER BY trade_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "trades_for_user".to_string()))?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    async fn metrics_for_user(&self, user_id: &UserId) -> AppResult<PerformanceMetrics> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(profit), 0)::BIGINT        AS total_profit,
                COUNT(*)                                 AS total_trades,
                COUNT(*) FILTER (WHERE profit > 0)       AS winning_trades,
                COUNT(*) FILTER (WHERE profit < 0)       AS losing_trades,
                COALESCE(MAX(profit), 0)::BIGINT         AS best_trade,
                COALESCE(MIN(profit), 0)::BIGINT         AS worst_trade
            FROM trades
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "metrics_for_user".to_string()))?;

        let total_trades: i64 = row.try_get("total_trades")?;
        let winning_trades: i64 = row.try_get("winning_trades")?;

        let mut metrics = PerformanceMetrics {
            total_profit: row.try_get("total_profit")?,
            total_trades: total_trades as u64,
            winning_trades: winning_trades as u64,
            losing_trades: row.try_get::<i64, _>("losing_trades")? as u64,
            win_rate: if total_trades > 0 {
                winning_trades as f64 / total_trades as f64 * 100.0
            } else {
                0.0
            },
            best_trade: row.try_get("best_trade")?,
            worst_trade: row.try_get("worst_trade")?,
            profit_by_strategy: HashMap::new(),
        };

        let strategy_rows = sqlx::query(
            r#"
            SELECT strategy_name, COALESCE(SUM(profit), 0)::BIGINT AS profit
            FROM trades
            WHERE user_id = $1
            GROUP BY strategy_name
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "metrics_for_user".to_string()))?;

        for row in strategy_rows {
            metrics
                .profit_by_strategy
                .insert(row.try_get("strategy_name")?, row.try_get("profit")?);
        }

        Ok(metrics)
    }

    async fn leaderboard(&self, limit: u32) -> AppResult<Vec<LeaderboardEntry>> {
        // User IDs are grouped on but never selected; the output is anonymous
        let rows = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(profit), 0)::BIGINT AS profit,
                COUNT(*) FILTER (WHERE profit > 0)::DOUBLE PRECISION
                    / GREATEST(COUNT(*), 1)::DOUBLE PRECISION * 100.0 AS win_rate
            FROM trades
            GROUP BY user_id
            ORDER BY profit DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "leaderboard".to_string()))?;

        rows.iter()
            .enumerate()
            .map(|(idx, row)| {
                Ok(LeaderboardEntry {
                    rank: idx as u32 + 1,
                    profit: row.try_get("profit")?,
                    win_rate: row.try_get("win_rate")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BalanceRepository for PostgresStore {
    async fn upsert_balance(&self, user_id: &UserId, snapshot: StoredBalance) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balance_snapshots (user_id, lamports, observed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET lamports = EXCLUDED.lamports, observed_at = EXCLUDED.observed_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(snapshot.lamports as i64)
        .bind(snapshot.observed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string(), "upsert_balance".to_string()))?;
        Ok(())
    }

    async fn load_balances(&self) -> AppResult<HashMap<UserId, StoredBalance>> {
        let rows = sqlx::query("SELECT user_id, lamports, observed_at FROM balance_snapshots")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string(), "load_balances".to_string()))?;

        let mut balances = HashMap::with_capacity(rows.len());
        for row in rows {
            let observed_at: DateTime<Utc> = row.try_get("observed_at")?;
            balances.insert(
                UserId::new_unchecked(row.try_get::<String, _>("user_id")?),
                StoredBalance {
                    lamports: row.try_get::<i64, _>("lamports")? as u64,
                    observed_at,
                },
            );
        }
        Ok(balances)
    }
}
