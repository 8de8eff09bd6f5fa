//! Chain access boundary
//!
//! The core talks to Solana through the [`ChainRpc`] trait: balance reads,
//! transaction submission with confirmation, and a health probe. The real
//! implementation wraps the nonblocking RPC client behind the shared gate;
//! the simulated implementation backs simulation mode and the test suite.

pub mod rpc;
pub mod simulated;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::transaction::Transaction;

use crate::core::error::AppResult;
use crate::core::types::{Lamports, TxSignature, WalletAddress};

pub use rpc::SolanaRpcService;
pub use simulated::SimulatedChain;

/// Chain RPC operations the core depends on
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Native balance of one account
    async fn get_balance(&self, address: &WalletAddress) -> AppResult<Lamports>;

    /// Native balances for up to one batch of accounts, in input order.
    /// `None` for addresses that do not exist on chain.
    async fn get_balances(&self, addresses: &[WalletAddress])
        -> AppResult<Vec<Option<Lamports>>>;

    /// Recent blockhash for transaction building
    async fn latest_blockhash(&self) -> AppResult<Hash>;

    /// Submit a signed transaction and await confirmation
    async fn send_and_confirm(&self, transaction: &Transaction) -> AppResult<TxSignature>;

    /// Endpoint liveness probe
    async fn health(&self) -> AppResult<()>;
}
