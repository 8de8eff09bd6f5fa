//! Cryptographic utilities for custodial key protection
//!
//! AES-256-GCM sealing, PBKDF2 key derivation, and the base64 envelope
//! format used for wallet secrets at rest. The wallet vault is the only
//! caller; nothing above it touches raw key material.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::num::NonZeroU32;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::error::{AppError, AppResult};

/// AES-256-GCM key size in bytes
pub const AES_KEY_SIZE: usize = 32;

/// Salt size for key derivation
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-256-GCM
pub const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count for key derivation
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Encrypted data container
#[derive(Debug, Clone)]
pub struct EncryptedData {
    /// Ciphertext with the GCM tag appended
    pub ciphertext: Vec<u8>,
    /// Nonce used for this sealing
    pub nonce: [u8; NONCE_SIZE],
    /// Salt used for key derivation
    pub salt: [u8; SALT_SIZE],
}

/// Secret key material that zeroes itself on drop
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureKey {
    key: [u8; AES_KEY_SIZE],
}

impl SecureKey {
    /// Create a secure key from raw bytes
    pub fn from_bytes(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self { key: bytes }
    }

    /// Derive a key from a secret and salt using PBKDF2-HMAC-SHA256
    pub fn derive(secret: &str, salt: &[u8; SALT_SIZE]) -> Self {
        let mut key = [0u8; AES_KEY_SIZE];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iterations"),
            salt,
            secret.as_bytes(),
            &mut key,
        );
        Self::from_bytes(key)
    }

    fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> AppResult<[u8; SALT_SIZE]> {
    let mut salt = [0u8; SALT_SIZE];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| AppError::crypto("failed to generate random salt"))?;
    Ok(salt)
}

/// Generate a cryptographically secure random nonce
fn generate_nonce() -> AppResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| AppError::crypto("failed to generate random nonce"))?;
    Ok(nonce)
}

/// Seal plaintext with a key derived from `secret` and a fresh salt
pub fn seal_with_secret(secret: &str, plaintext: &[u8]) -> AppResult<EncryptedData> {
    let salt = generate_salt()?;
    let nonce = generate_nonce()?;
    let key = SecureKey::derive(secret, &salt);

    let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| AppError::crypto("failed to build sealing key"))?;
    let sealing = LessSafeKey::new(unbound);

    let nonce_obj = Nonce::assume_unique_for_key(nonce);
    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(nonce_obj, Aad::empty(), &mut in_out)
        .map_err(|_| AppError::crypto("encryption failed"))?;

    Ok(EncryptedData {
        ciphertext: in_out,
        nonce,
        salt,
    })
}

/// Open an envelope previously sealed with [`seal_with_secret`].
///
/// Fails on a wrong secret or any ciphertext tampering (authenticated mode).
pub fn open_with_secret(secret: &str, encrypted: &EncryptedData) -> AppResult<Vec<u8>> {
    let key = SecureKey::derive(secret, &encrypted.salt);

    let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| AppError::crypto("failed to build opening key"))?;
    let opening = LessSafeKey::new(unbound);

    let nonce_obj = Nonce::assume_unique_for_key(encrypted.nonce);
    let mut in_out = encrypted.ciphertext.clone();
    let plaintext = opening
        .open_in_place(nonce_obj, Aad::empty(), &mut in_out)
        .map_err(|_| AppError::crypto("decryption failed: wrong key or corrupted data"))?;

    let result = plaintext.to_vec();
    in_out.zeroize();
    Ok(result)
}

/// Encode an envelope as base64 for on-disk storage: salt | nonce | ciphertext
pub fn encode_envelope(encrypted: &EncryptedData) -> String {
    let mut combined =
        Vec::with_capacity(SALT_SIZE + NONCE_SIZE + encrypted.ciphertext.len());
    combined.extend_from_slice(&encrypted.salt);
    combined.extend_from_slice(&encrypted.nonce);
    combined.extend_from_slice(&encrypted.ciphertext);
    BASE64.encode(combined)
}

/// Decode a base64 envelope produced by [`encode_envelope`]
pub fn decode_envelope(encoded: &str) -> AppResult<EncryptedData> {
    let combined = BASE64
        .decode(encoded.trim())
        .map_err(|e| AppError::crypto(format!("failed to decode envelope: {}", e)))?;

    if combined.len() < SALT_SIZE + NONCE_SIZE {
        return Err(AppError::crypto("envelope too short"));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&combined[..SALT_SIZE]);

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&combined[SALT_SIZE..SALT_SIZE + NONCE_SIZE]);

    let ciphertext = combined[SALT_SIZE + NONCE_SIZE..].to_vec();

    Ok(EncryptedData {
        ciphertext,
        nonce,
        salt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let secret = "system-master-secret";
        let plaintext = b"abandon ability able about above absent absorb abstract absurd abuse access accident";

        let sealed = seal_with_secret(secret, plaintext).unwrap();
        let opened = open_with_secret(secret, &sealed).unwrap();

        assert_eq!(plaintext.as_slice(), opened.as_slice());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = seal_with_secret("right", b"payload").unwrap();
        assert!(open_with_secret("wrong", &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = seal_with_secret("secret", b"payload").unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0xFF;
        assert!(open_with_secret("secret", &sealed).is_err());
    }

    #[test]
    fn test_envelope_encoding_round_trip() {
        let sealed = seal_with_secret("secret", b"payload").unwrap();
        let encoded = encode_envelope(&sealed);
        let decoded = decode_envelope(&encoded).unwrap();

        assert_eq!(sealed.ciphertext, decoded.ciphertext);
        assert_eq!(sealed.nonce, decoded.nonce);
        assert_eq!(sealed.salt, decoded.salt);
        assert_eq!(
            open_with_secret("secret", &decoded).unwrap(),
            b"payload".to_vec()
        );
    }

    #[test]
    fn test_fresh_salt_per_seal() {
        let a = seal_with_secret("secret", b"payload").unwrap();
        let b = seal_with_secret("secret", b"payload").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_malformed_envelope_rejected() {
        assert!(decode_envelope("not base64 !!!").is_err());
        assert!(decode_envelope(&BASE64.encode([0u8; 4])).is_err());
    }
}
