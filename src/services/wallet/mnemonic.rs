//! BIP39 mnemonic generation, validation, and Ed25519 keypair derivation
//!
//! Derivation matches the wallet's recorded path semantics: the BIP39 seed
//! (empty passphrase) is computed and the first 32 bytes become the Ed25519
//! keypair seed.

use bip39::{Language, Mnemonic};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::keypair_from_seed;
use solana_sdk::signer::Signer;

use crate::core::error::{AppError, AppResult};
use crate::core::types::WalletAddress;
use crate::utils::validation::validate_mnemonic_shape;

/// Generate a fresh English mnemonic with the given word count (12 or 24)
pub fn generate_mnemonic(word_count: usize) -> AppResult<String> {
    if word_count != 12 && word_count != 24 {
        return Err(AppError::invalid_mnemonic(format!(
            "word count must be 12 or 24, got {}",
            word_count
        )));
    }

    let mnemonic = Mnemonic::generate_in(Language::English, word_count)
        .map_err(|e| AppError::crypto(format!("mnemonic generation failed: {}", e)))?;
    Ok(mnemonic.to_string())
}

/// Validate word count and BIP39 checksum, returning the normalized phrase
/// and its word count
pub fn validate_mnemonic(phrase: &str) -> AppResult<(String, usize)> {
    let normalized = phrase.trim().to_lowercase();
    let word_count = validate_mnemonic_shape(&normalized)?;

    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| AppError::invalid_mnemonic(format!("checksum verification failed: {}", e)))?;

    Ok((mnemonic.to_string(), word_count))
}

/// Derive the Solana keypair and 64-byte seed from a validated mnemonic
pub fn derive_keypair(phrase: &str) -> AppResult<(Keypair, WalletAddress, Vec<u8>)> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| AppError::invalid_mnemonic(format!("invalid mnemonic: {}", e)))?;

    let seed = mnemonic.to_seed("");
    let keypair = keypair_from_seed(&seed[..32])
        .map_err(|e| AppError::crypto(format!("keypair derivation failed: {}", e)))?;

    let address = WalletAddress::new_unchecked(keypair.pubkey().to_string());
    Ok((keypair, address, seed.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_valid_word_counts() {
        for count in [12, 24] {
            let phrase = generate_mnemonic(count).unwrap();
            assert_eq!(phrase.split_whitespace().count(), count);
            let (_, validated_count) = validate_mnemonic(&phrase).unwrap();
            assert_eq!(validated_count, count);
        }
    }

    #[test]
    fn test_generate_rejects_odd_counts() {
        assert!(generate_mnemonic(15).is_err());
        assert!(generate_mnemonic(0).is_err());
    }

    #[test]
    fn test_known_vector_round_trip() {
        // The all-abandon vector with its valid checksum word
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let (normalized, count) = validate_mnemonic(phrase).unwrap();
        assert_eq!(count, 12);

        let (_, addr1, seed1) = derive_keypair(&normalized).unwrap();
        let (_, addr2, seed2) = derive_keypair(&normalized).unwrap();
        assert_eq!(addr1, addr2);
        assert_eq!(seed1, seed2);
        assert_eq!(seed1.len(), 64);
    }

    #[test]
    fn test_checksum_failure_rejected() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        let err = validate_mnemonic(phrase).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidInput { field: Some(ref f), .. } if f == "mnemonic"
        ));
    }

    #[test]
    fn test_whitespace_and_case_normalized() {
        let phrase = "  Abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon ABOUT  ";
        let (normalized, _) = validate_mnemonic(phrase).unwrap();
        assert!(normalized.starts_with("abandon"));
        assert!(normalized.ends_with("about"));
    }

    #[test]
    fn test_distinct_mnemonics_distinct_keys() {
        let a = generate_mnemonic(12).unwrap();
        let b = generate_mnemonic(12).unwrap();
        assert_ne!(a, b);

        let (_, addr_a, _) = derive_keypair(&a).unwrap();
        let (_, addr_b, _) = derive_keypair(&b).unwrap();
        assert_ne!(addr_a, addr_b);
    }
}
