//! Encrypted wallet-blob vault
//!
//! One authenticated-ciphertext envelope per user on disk, sealing the
//! mnemonic and the derived seed under a key derived from the system-held
//! master secret. The wallet store is the only caller; the envelope format
//! lives in `utils::crypto`.

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use zeroize::ZeroizeOnDrop;

use crate::config::models::WalletConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::types::UserId;
use crate::utils::crypto::{decode_envelope, encode_envelope, open_with_secret, seal_with_secret};

/// Encryption method tag recorded in wallet metadata
pub const ENCRYPTION_METHOD: &str = "aes-256-gcm";

/// KDF method tag recorded in wallet metadata
pub const KDF_METHOD: &str = "pbkdf2-hmac-sha256";

/// Decrypted wallet secret; zeroed on drop
#[derive(Clone, ZeroizeOnDrop, serde::Serialize, serde::Deserialize)]
pub struct WalletSecret {
    /// BIP39 phrase exactly as created or imported
    pub mnemonic: String,
    /// 64-byte BIP39 seed derived from the phrase
    pub seed: Vec<u8>,
}

impl std::fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSecret")
            .field("mnemonic", &"[REDACTED]")
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

/// Filesystem vault for encrypted wallet secrets
#[derive(Debug, Clone)]
pub struct WalletVault {
    storage_dir: PathBuf,
    master_secret: String,
}

impl WalletVault {
    pub fn new(config: &WalletConfig) -> Self {
        Self {
            storage_dir: PathBuf::from(&config.storage_dir),
            master_secret: config.master_secret.clone(),
        }
    }

    /// Create the storage directory if it does not exist
    pub async fn init(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| {
                AppError::config(format!(
                    "cannot create wallet vault directory {}: {}",
                    self.storage_dir.display(),
                    e
                ))
            })?;
        info!(dir = %self.storage_dir.display(), "wallet vault ready");
        Ok(())
    }

    /// Path of the encrypted blob for a user
    pub fn blob_path(&self, user_id: &UserId) -> PathBuf {
        self.storage_dir.join(format!("{}.enc", user_id.as_str()))
    }

    /// Seal and persist a wallet secret, returning the blob path
    #[instrument(skip(self, secret))]
    pub async fn store(&self, user_id: &UserId, secret: &WalletSecret) -> AppResult<PathBuf> {
        let payload = serde_json::to_vec(secret)?;
        let sealed = seal_with_secret(&self.master_secret, &payload)?;
        let encoded = encode_envelope(&sealed);

        let path = self.blob_path(user_id);
        tokio::fs::write(&path, encoded.as_bytes())
            .await
            .map_err(|e| {
                AppError::database(
                    format!("failed to write wallet blob {}: {}", path.display(), e),
                    "vault_store".to_string(),
                )
            })?;

        debug!(user_id = %user_id, path = %path.display(), "wallet blob written");
        Ok(path)
    }

    /// Load and open a user's wallet secret
    #[instrument(skip(self))]
    pub async fn load(&self, user_id: &UserId) -> AppResult<WalletSecret> {
        let path = self.blob_path(user_id);
        let encoded = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AppError::not_found_for_user(
                format!("wallet blob missing at {}: {}", path.display(), e),
                user_id.to_string(),
            )
        })?;

        let envelope = decode_envelope(&encoded)?;
        let payload = open_with_secret(&self.master_secret, &envelope)?;
        let secret: WalletSecret = serde_json::from_slice(&payload)
            .map_err(|e| AppError::crypto(format!("wallet blob payload invalid: {}", e)))?;

        Ok(secret)
    }

    /// Remove a user's blob. Called to clean up when metadata registration
    /// fails after the blob was written; missing files are not an error.
    pub async fn remove(&self, user_id: &UserId) -> AppResult<()> {
        let path = self.blob_path(user_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                warn!(user_id = %user_id, "removed orphaned wallet blob after failed registration");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::internal(format!(
                "failed to remove wallet blob {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Whether a blob exists for the user
    pub async fn exists(&self, user_id: &UserId) -> bool {
        tokio::fs::try_exists(self.blob_path(user_id))
            .await
            .unwrap_or(false)
    }
}

/// Build a vault rooted in an explicit directory (test helper)
pub fn vault_at(dir: &Path, master_secret: &str) -> WalletVault {
    WalletVault {
        storage_dir: dir.to_path_buf(),
        master_secret: master_secret.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> WalletSecret {
        WalletSecret {
            mnemonic: "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about".to_string(),
            seed: vec![7u8; 64],
        }
    }

    #[tokio::test]
    async fn test_store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_at(dir.path(), "master-secret");
        let user = UserId::new_unchecked("u1");

        let path = vault.store(&user, &secret()).await.unwrap();
        assert!(path.exists());

        let loaded = vault.load(&user).await.unwrap();
        assert_eq!(loaded.mnemonic, secret().mnemonic);
        assert_eq!(loaded.seed, secret().seed);
    }

    #[tokio::test]
    async fn test_load_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_at(dir.path(), "master-secret");

        let err = vault.load(&UserId::new_unchecked("ghost")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_wrong_master_secret_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new_unchecked("u1");

        vault_at(dir.path(), "right").store(&user, &secret()).await.unwrap();

        let err = vault_at(dir.path(), "wrong").load(&user).await.unwrap_err();
        assert!(matches!(err, AppError::Crypto { .. }));
    }

    #[tokio::test]
    async fn test_remove_cleans_up_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_at(dir.path(), "master-secret");
        let user = UserId::new_unchecked("u1");

        vault.store(&user, &secret()).await.unwrap();
        assert!(vault.exists(&user).await);

        vault.remove(&user).await.unwrap();
        assert!(!vault.exists(&user).await);

        // Second removal is a no-op
        vault.remove(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_on_disk_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_at(dir.path(), "master-secret");
        let user = UserId::new_unchecked("u1");

        let path = vault.store(&user, &secret()).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!raw.contains("abandon"));
    }
}
