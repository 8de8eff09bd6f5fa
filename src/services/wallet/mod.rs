//! Secure wallet store: custodial keypairs with one-wallet-per-user
//!
//! Creation and import seal the mnemonic and seed into the vault, register
//! metadata, and fail atomically: a blob with no metadata row is removed
//! before the error returns. Decrypted signing handles are memoized for the
//! process lifetime with single-flight reconstruction on miss. Every
//! operation verifies that the requesting caller owns the addressed wallet;
//! authorization lives at this boundary, not in callers.

pub mod mnemonic;

use solana_sdk::signature::Keypair;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::core::error::{AppError, AppResult};
use crate::core::types::{UserId, WalletAddress};
use crate::infrastructure::database::{
    NewWallet, UserRepository, WalletMetadata, WalletRepository,
};
use crate::infrastructure::security::{WalletSecret, WalletVault, ENCRYPTION_METHOD, KDF_METHOD};
use crate::utils::validation::validate_user_id;

/// Decrypted in-memory wallet handle: public key plus signing capability.
/// Lives for the process lifetime once reconstructed.
pub struct WalletHandle {
    pub user_id: UserId,
    pub address: WalletAddress,
    keypair: Keypair,
}

impl WalletHandle {
    /// Signing keypair; never leaves the executor path for this user
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletHandle")
            .field("user_id", &self.user_id)
            .field("address", &self.address)
            .field("keypair", &"[REDACTED]")
            .finish()
    }
}

/// Custodial wallet store (create / import / export / get)
pub struct WalletStore {
    wallets: Arc<dyn WalletRepository>,
    users: Arc<dyn UserRepository>,
    vault: WalletVault,
    derivation_path: String,
    handles: RwLock<HashMap<UserId, Arc<WalletHandle>>>,
    /// Per-user guards serializing create/import/reload races
    guards: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl WalletStore {
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        users: Arc<dyn UserRepository>,
        vault: WalletVault,
        derivation_path: String,
    ) -> Self {
        Self {
            wallets,
            users,
            vault,
            derivation_path,
            handles: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Caller must be the wallet owner. Mismatches are logged at security
    /// level and never retried.
    fn authorize(caller_id: &UserId, user_id: &UserId) -> AppResult<()> {
        if caller_id != user_id {
            error!(
                caller = %caller_id,
                target = %user_id,
                "SECURITY: wallet access denied for non-owner"
            );
            return Err(AppError::unauthorized(
                caller_id.to_string(),
                user_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn guard_for(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.guards
            .lock()
            .await
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a fresh wallet: 12-word mnemonic, derived keypair, sealed
    /// blob, metadata row. Returns the public key and the mnemonic, which is
    /// shown to the user exactly once.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
    ) -> AppResult<(WalletAddress, String)> {
        validate_user_id(user_id.as_str())?;
        Self::authorize(caller_id, user_id)?;

        let guard = self.guard_for(user_id).await;
        let _held = guard.lock().await;

        if self.wallets.get_wallet(user_id).await?.is_some() {
            return Err(AppError::already_exists(
                "wallet already registered".to_string(),
                user_id.to_string(),
            ));
        }

        let phrase = mnemonic::generate_mnemonic(12)?;
        let address = self.provision(user_id, &phrase, 12).await?;

        info!(user_id = %user_id, address = %address, "wallet created");
        Ok((address, phrase))
    }

    /// Import an existing mnemonic (12 or 24 words); otherwise behaves as
    /// `create`
    #[instrument(skip(self, phrase))]
    pub async fn import(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
        phrase: &str,
    ) -> AppResult<WalletAddress> {
        validate_user_id(user_id.as_str())?;
        Self::authorize(caller_id, user_id)?;

        let (normalized, word_count) = mnemonic::validate_mnemonic(phrase)?;

        let guard = self.guard_for(user_id).await;
        let _held = guard.lock().await;

        if self.wallets.get_wallet(user_id).await?.is_some() {
            return Err(AppError::already_exists(
                "wallet already registered".to_string(),
                user_id.to_string(),
            ));
        }

        let address = self.provision(user_id, &normalized, word_count as u8).await?;

        info!(user_id = %user_id, address = %address, "wallet imported");
        Ok(address)
    }

    /// Shared create/import tail: seal blob, register metadata, cache the
    /// handle. The blob is removed if registration fails after it was
    /// written.
    async fn provision(
        &self,
        user_id: &UserId,
        phrase: &str,
        word_count: u8,
    ) -> AppResult<WalletAddress> {
        let (keypair, address, seed) = mnemonic::derive_keypair(phrase)?;

        // The user row must exist before the wallet row references it
        self.users.ensure_user(user_id).await?;

        let secret = WalletSecret {
            mnemonic: phrase.to_string(),
            seed,
        };
        let blob_path = self.vault.store(user_id, &secret).await?;

        let registration = self
            .wallets
            .insert_wallet(NewWallet {
                user_id: user_id.clone(),
                public_key: address.as_str().to_string(),
                derivation_path: self.derivation_path.clone(),
                mnemonic_word_count: word_count,
                kdf_method: KDF_METHOD.to_string(),
                encryption_method: ENCRYPTION_METHOD.to_string(),
                blob_path: blob_path.display().to_string(),
            })
            .await;

        if let Err(e) = registration {
            // No orphaned blobs: cleanup before surfacing the error
            if let Err(cleanup) = self.vault.remove(user_id).await {
                error!(user_id = %user_id, "blob cleanup after failed registration also failed: {}", cleanup);
            }
            return Err(e);
        }

        let handle = Arc::new(WalletHandle {
            user_id: user_id.clone(),
            address: address.clone(),
            keypair,
        });
        self.handles.write().await.insert(user_id.clone(), handle);

        Ok(address)
    }

    /// Export the stored mnemonic. Every export is audit-logged before the
    /// phrase leaves the store.
    #[instrument(skip(self))]
    pub async fn export(&self, caller_id: &UserId, user_id: &UserId) -> AppResult<String> {
        validate_user_id(user_id.as_str())?;
        Self::authorize(caller_id, user_id)?;

        if self.wallets.get_wallet(user_id).await?.is_none() {
            return Err(AppError::not_found_for_user(
                "no wallet registered".to_string(),
                user_id.to_string(),
            ));
        }

        let secret = self.vault.load(user_id).await?;

        warn!(user_id = %user_id, "SECURITY: mnemonic export requested");
        Ok(secret.mnemonic.clone())
    }

    /// Cached, decrypted handle for a user; reconstructed from the vault on
    /// the first access after process start. `None` when the user has no
    /// wallet.
    pub async fn get(
        &self,
        caller_id: &UserId,
        user_id: &UserId,
    ) -> AppResult<Option<Arc<WalletHandle>>> {
        Self::authorize(caller_id, user_id)?;

        if let Some(handle) = self.handles.read().await.get(user_id) {
            return Ok(Some(handle.clone()));
        }

        // Single-flight reconstruction
        let guard = self.guard_for(user_id).await;
        let _held = guard.lock().await;

        if let Some(handle) = self.handles.read().await.get(user_id) {
            return Ok(Some(handle.clone()));
        }

        let Some(metadata) = self.wallets.get_wallet(user_id).await? else {
            return Ok(None);
        };

        let handle = self.rebuild_handle(user_id, &metadata).await?;
        self.wallets.touch_last_unlocked(user_id).await?;
        Ok(Some(handle))
    }

    async fn rebuild_handle(
        &self,
        user_id: &UserId,
        metadata: &WalletMetadata,
    ) -> AppResult<Arc<WalletHandle>> {
        let secret = self.vault.load(user_id).await?;
        let (keypair, address, _) = mnemonic::derive_keypair(&secret.mnemonic)?;

        if address.as_str() != metadata.public_key {
            return Err(AppError::crypto(format!(
                "derived key does not match registered public key for user {}",
                user_id
            )));
        }

        let handle = Arc::new(WalletHandle {
            user_id: user_id.clone(),
            address,
            keypair,
        });
        self.handles
            .write()
            .await
            .insert(user_id.clone(), handle.clone());
        Ok(handle)
    }

    /// Public key for a user without touching key material
    pub async fn address_of(&self, user_id: &UserId) -> AppResult<Option<WalletAddress>> {
        if let Some(handle) = self.handles.read().await.get(user_id) {
            return Ok(Some(handle.address.clone()));
        }
        Ok(self
            .wallets
            .get_wallet(user_id)
            .await?
            .map(|m| WalletAddress::new_unchecked(m.public_key)))
    }

    /// Every user with a wallet, in registration order
    pub async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        self.wallets.list_user_ids().await
    }

    /// Eagerly rebuild all handles at process start so no first-request
    /// decryption latency is paid mid-cycle. Per-user failures are logged
    /// and skipped.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> AppResult<usize> {
        let user_ids = self.wallets.list_user_ids().await?;
        let mut loaded = 0usize;
        let mut failed = 0usize;

        for user_id in &user_ids {
            let Some(metadata) = self.wallets.get_wallet(user_id).await? else {
                continue;
            };
            match self.rebuild_handle(user_id, &metadata).await {
                Ok(_) => loaded += 1,
                Err(e) => {
                    failed += 1;
                    error!(user_id = %user_id, "failed to load wallet at startup: {}", e);
                }
            }
        }

        info!(loaded, failed, "wallet handle cache rebuilt");
        Ok(loaded)
    }
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}
