//! Security infrastructure: the encrypted wallet-blob vault

pub mod vault;

pub use vault::{WalletSecret, WalletVault, ENCRYPTION_METHOD, KDF_METHOD};
