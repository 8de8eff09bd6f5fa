//! Simulated chain backend
//!
//! In-memory implementation of [`ChainRpc`] used in simulation mode and by
//! the end-to-end tests. Balances are a plain map, submissions fabricate a
//! signature, and test knobs can inject outages, latency, and in-flight
//! accounting for the queue-serialization checks.

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::ChainRpc;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{Lamports, TxSignature, WalletAddress};

/// In-memory chain state for simulation and tests
#[derive(Default)]
pub struct SimulatedChain {
    balances: Mutex<HashMap<String, u64>>,
    next_signature: AtomicU64,
    /// When set, every RPC call fails with a network error
    outage: AtomicBool,
    /// When set, every RPC call fails with a rate-limit error
    rate_limited: AtomicBool,
    /// Artificial latency per submission, for serialization tests
    submit_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submissions: AtomicU64,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an account's balance (external funding in test scenarios)
    pub fn set_balance(&self, address: &WalletAddress, lamports: Lamports) {
        self.balances
            .lock()
            .expect("chain lock")
            .insert(address.as_str().to_string(), lamports.value());
    }

    /// Begin or end a simulated full outage
    pub fn set_outage(&self, on: bool) {
        self.outage.store(on, Ordering::SeqCst);
    }

    /// Make the endpoint answer 429 to everything
    pub fn set_rate_limited(&self, on: bool) {
        self.rate_limited.store(on, Ordering::SeqCst);
    }

    /// Add artificial latency to each submission
    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Highest number of concurrently in-flight submissions observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Total submissions attempted
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    fn check_availability(&self) -> AppResult<()> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(AppError::rate_limited("simulated 429"));
        }
        if self.outage.load(Ordering::SeqCst) {
            return Err(AppError::network("simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for SimulatedChain {
    async fn get_balance(&self, address: &WalletAddress) -> AppResult<Lamports> {
        self.check_availability()?;
        Ok(Lamports::new(
            self.balances
                .lock()
                .expect("chain lock")
                .get(address.as_str())
                .copied()
                .unwrap_or(0),
        ))
    }

    async fn get_balances(
        &self,
        addresses: &[WalletAddress],
    ) -> AppResult<Vec<Option<Lamports>>> {
        self.check_availability()?;
        let balances = self.balances.lock().expect("chain lock");
        Ok(addresses
            .iter()
            .map(|a| balances.get(a.as_str()).copied().map(Lamports::new))
            .collect())
    }

    async fn latest_blockhash(&self) -> AppResult<Hash> {
        self.check_availability()?;
        Ok(Hash::default())
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> AppResult<TxSignature> {
        self.check_availability()?;

        // Reject anything not actually signed by its declared signers, the
        // way a real validator would
        if !transaction.signatures.is_empty() {
            transaction
                .verify()
                .map_err(|e| AppError::invalid_input(format!("signature verification failed: {}", e)))?;
        }

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let n = self.next_signature.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxSignature::new(format!("SimSig{:016x}", n)))
    }

    async fn health(&self) -> AppResult<()> {
        self.check_availability()
    }
}

impl std::fmt::Debug for SimulatedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedChain")
            .field("submissions", &self.submissions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::new_unchecked(s)
    }

    #[tokio::test]
    async fn test_balances_default_to_zero() {
        let chain = SimulatedChain::new();
        assert_eq!(
            chain.get_balance(&addr("missing")).await.unwrap(),
            Lamports::ZERO
        );

        chain.set_balance(&addr("funded"), Lamports::new(500));
        assert_eq!(
            chain.get_balance(&addr("funded")).await.unwrap(),
            Lamports::new(500)
        );
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let chain = SimulatedChain::new();
        chain.set_balance(&addr("a"), Lamports::new(1));
        chain.set_balance(&addr("c"), Lamports::new(3));

        let result = chain
            .get_balances(&[addr("a"), addr("b"), addr("c")])
            .await
            .unwrap();
        assert_eq!(result[0], Some(Lamports::new(1)));
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(Lamports::new(3)));
    }

    #[tokio::test]
    async fn test_outage_and_recovery() {
        let chain = SimulatedChain::new();
        chain.set_outage(true);
        assert!(chain.get_balance(&addr("a")).await.is_err());
        assert!(chain.health().await.is_err());

        chain.set_outage(false);
        assert!(chain.get_balance(&addr("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_error_kind() {
        let chain = SimulatedChain::new();
        chain.set_rate_limited(true);
        let err = chain.get_balance(&addr("a")).await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_signatures_unique() {
        let chain = SimulatedChain::new();
        let tx = Transaction::default();
        let s1 = chain.send_and_confirm(&tx).await.unwrap();
        let s2 = chain.send_and_confirm(&tx).await.unwrap();
        assert_ne!(s1, s2);
        assert_eq!(chain.submissions(), 2);
    }
}
