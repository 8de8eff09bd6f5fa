//! Input validation utilities and helpers
//!
//! Validation for the identifiers that cross the trust boundary: user IDs
//! arriving from the chat surface, mnemonics on import, and base58 chain
//! addresses. The wallet store and the command surface call these before any
//! value reaches the repository layer.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::core::error::{AppError, AppResult};

/// Maximum accepted user-ID length
pub const MAX_USER_ID_LEN: usize = 64;

/// Regex for validating opaque user identifiers (chat-platform IDs)
static USER_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-]{1,64}$").expect("static regex"));

/// Regex for validating Solana addresses (base58, 32-44 characters)
static SOLANA_ADDRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("static regex"));

/// Regex for validating transaction signatures
static TX_SIGNATURE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{64,88}$").expect("static regex"));

/// Validate an opaque user identifier.
///
/// Rejects anything outside `[a-zA-Z0-9_-]` so quote, semicolon, and comment
/// characters can never reach a query, even though all queries are bound.
pub fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.is_empty() {
        return Err(AppError::invalid_input("user ID cannot be empty"));
    }

    if user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::invalid_input(format!(
            "user ID too long (max {} characters)",
            MAX_USER_ID_LEN
        )));
    }

    if !USER_ID_REGEX.is_match(user_id) {
        return Err(AppError::invalid_input(
            "user ID may only contain letters, digits, underscore, and dash",
        ));
    }

    Ok(())
}

/// Validate a Solana address (wallet public key)
pub fn validate_solana_address(address: &str) -> AppResult<()> {
    if address.is_empty() {
        return Err(AppError::invalid_input("address cannot be empty"));
    }

    if !SOLANA_ADDRESS_REGEX.is_match(address) {
        return Err(AppError::invalid_input("invalid Solana address format"));
    }

    Ok(())
}

/// Validate a transaction signature
pub fn validate_tx_signature(signature: &str) -> AppResult<()> {
    if !TX_SIGNATURE_REGEX.is_match(signature) {
        return Err(AppError::invalid_input(
            "invalid transaction signature format",
        ));
    }

    Ok(())
}

/// Shape-check a mnemonic before the BIP39 checksum runs: 12 or 24
/// lowercase ASCII words. The checksum itself is verified by the wallet
/// store's mnemonic handling.
pub fn validate_mnemonic_shape(mnemonic: &str) -> AppResult<usize> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();

    if words.len() != 12 && words.len() != 24 {
        return Err(AppError::invalid_mnemonic(format!(
            "mnemonic must be 12 or 24 words, got {}",
            words.len()
        )));
    }

    for word in &words {
        if !word.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(AppError::invalid_mnemonic(
                "mnemonic words must be lowercase ASCII",
            ));
        }
    }

    Ok(words.len())
}

/// Validate a URL used for RPC endpoints or webhook sinks
pub fn validate_url(url_str: &str) -> AppResult<Url> {
    if url_str.is_empty() {
        return Err(AppError::invalid_input("URL cannot be empty"));
    }

    let url =
        Url::parse(url_str).map_err(|e| AppError::invalid_input(format!("invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(AppError::invalid_input(format!(
                "URL scheme '{}' not allowed",
                other
            )))
        }
    }

    if url.host().is_none() {
        return Err(AppError::invalid_input("URL must have a host"));
    }

    Ok(url)
}
