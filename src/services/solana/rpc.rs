//! Solana RPC client implementation
//!
//! Wraps the nonblocking RPC client with per-call timeouts, bounded retry
//! for transient failures, and the shared rate gate. Every outbound request
//! takes one gate token, including each retry attempt; provider rate-limit
//! responses are reported back to the gate.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use solana_client::nonblocking::rpc_client::RpcClient as SolanaRpcClient;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::ChainRpc;
use crate::config::models::SolanaConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::result::utils::with_timeout;
use crate::core::types::{Lamports, TxSignature, WalletAddress};
use crate::services::ratelimit::RpcGate;

/// RPC client wrapper with gating and retry logic
pub struct SolanaRpcService {
    client: Arc<SolanaRpcClient>,
    gate: Arc<RpcGate>,
    endpoint: String,
    request_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl SolanaRpcService {
    /// Create a new RPC service for the configured endpoint
    pub fn new(config: &SolanaConfig, gate: Arc<RpcGate>) -> AppResult<Self> {
        let commitment = match config.commitment.as_str() {
            "processed" => CommitmentLevel::Processed,
            "confirmed" => CommitmentLevel::Confirmed,
            "finalized" => CommitmentLevel::Finalized,
            other => {
                return Err(AppError::config(format!(
                    "unknown commitment level '{}'",
                    other
                )))
            }
        };

        let client = SolanaRpcClient::new_with_commitment(
            config.rpc_url.clone(),
            CommitmentConfig { commitment },
        );

        info!(endpoint = %config.rpc_url, commitment = %config.commitment, "RPC client created");

        Ok(Self {
            client: Arc::new(client),
            gate,
            endpoint: config.rpc_url.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Execute one RPC operation: gate token, timeout, bounded retry.
    ///
    /// Provider rate-limit responses are reported to the gate before the
    /// retry sleep so concurrent callers slow down too.
    async fn execute<T, F, Fut>(&self, operation: &str, f: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.retry_backoff,
            max_elapsed_time: Some(self.retry_backoff * 2_u32.pow(self.max_retries + 1)),
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0u32;
        loop {
            self.gate.acquire().await;
            attempt += 1;

            let result = with_timeout(self.request_timeout, operation, async {
                f().await.map_err(AppError::from)
            })
            .await;

            match result {
                Ok(value) => {
                    debug!("RPC {} succeeded (attempt {})", operation, attempt);
                    return Ok(value);
                }
                Err(error) => {
                    if error.is_rate_limit() {
                        self.gate.report_provider_rejection();
                    }

                    let give_up = !error.is_retryable() || attempt > self.max_retries;
                    if give_up {
                        warn!("RPC {} failed after {} attempts: {}", operation, attempt, error);
                        return Err(AppError::network_at(
                            format!("{} failed: {}", operation, error),
                            self.endpoint.clone(),
                        )
                        .with_source(error));
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.retry_backoff);
                    debug!("RPC {} retrying after {:?}: {}", operation, delay, error);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn parse_pubkey(address: &WalletAddress) -> AppResult<Pubkey> {
        Pubkey::from_str(address.as_str())
            .map_err(|e| AppError::invalid_input(format!("invalid address: {}", e)))
    }
}

#[async_trait]
impl ChainRpc for SolanaRpcService {
    #[instrument(skip(self))]
    async fn get_balance(&self, address: &WalletAddress) -> AppResult<Lamports> {
        let pubkey = Self::parse_pubkey(address)?;
        let lamports = self
            .execute("get_balance", || self.client.get_balance(&pubkey))
            .await?;
        Ok(Lamports::new(lamports))
    }

    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    async fn get_balances(
        &self,
        addresses: &[WalletAddress],
    ) -> AppResult<Vec<Option<Lamports>>> {
        let pubkeys = addresses
            .iter()
            .map(Self::parse_pubkey)
            .collect::<AppResult<Vec<_>>>()?;

        // One multi-account request per batch; the oracle sizes the batches
        let accounts = self
            .execute("get_multiple_accounts", || {
                self.client.get_multiple_accounts(&pubkeys)
            })
            .await?;

        Ok(accounts
            .into_iter()
            .map(|account| account.map(|a| Lamports::new(a.lamports)))
            .collect())
    }

    async fn latest_blockhash(&self) -> AppResult<Hash> {
        self.execute("get_latest_blockhash", || self.client.get_latest_blockhash())
            .await
    }

    #[instrument(skip(self, transaction))]
    async fn send_and_confirm(&self, transaction: &Transaction) -> AppResult<TxSignature> {
        let signature = self
            .execute("send_and_confirm_transaction", || {
                self.client.send_and_confirm_transaction(transaction)
            })
            .await?;
        Ok(TxSignature::new(signature.to_string()))
    }

    async fn health(&self) -> AppResult<()> {
        self.execute("get_health", || self.client.get_health()).await
    }
}

impl std::fmt::Debug for SolanaRpcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpcService")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
