use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use super::{validate_key_identifier, KEY_PREFIX};
use crate::error::{CryptoError, CryptoResult, StorageError};
use crate::locks::IdentifierLocks;
use crate::secure_memory::SecureBytes;
use crate::storage::SecureStorage;

/// Raw key material keyed by identifier, persisted under `key:{id}`.
///
/// Operations on the same identifier are serialized; operations on different
/// identifiers run independently.
pub struct KeyStore {
    storage: Arc<dyn SecureStorage>,
    locks: IdentifierLocks,
    /// Held by anything that reads or writes a key together with its
    /// metadata; always taken before `locks`
    pair_locks: IdentifierLocks,
}

fn storage_key(identifier: &str) -> String {
    format!("{}{}", KEY_PREFIX, identifier)
}

impl KeyStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            locks: IdentifierLocks::new(),
            pair_locks: IdentifierLocks::new(),
        }
    }

    /// Exclusive access to the key/metadata pair named `identifier`
    pub(crate) async fn lock_pair(&self, identifier: &str) -> OwnedMutexGuard<()> {
        self.pair_locks.lock(identifier).await
    }

    /// Store `key` under `identifier`, replacing any existing material
    pub async fn store_key(&self, key: &[u8], identifier: &str) -> CryptoResult<()> {
        validate_key_identifier(identifier)?;
        check_material(key)?;

        let _guard = self.locks.lock(identifier).await;
        self.storage.store_data(key, &storage_key(identifier)).await?;
        log::debug!("stored key '{}' ({} bits)", identifier, key.len() * 8);
        Ok(())
    }

    /// Store `key` only if nothing is stored under `identifier` yet.
    ///
    /// Fails with `KeyAlreadyExists` otherwise; the existing material is
    /// left untouched.
    pub async fn store_key_if_absent(&self, key: &[u8], identifier: &str) -> CryptoResult<()> {
        validate_key_identifier(identifier)?;
        check_material(key)?;

        let _guard = self.locks.lock(identifier).await;
        let location = storage_key(identifier);
        if self.storage.contains_data(&location).await? {
            return Err(CryptoError::KeyAlreadyExists {
                identifier: identifier.to_string(),
            });
        }
        self.storage.store_data(key, &location).await?;
        log::debug!("created key '{}' ({} bits)", identifier, key.len() * 8);
        Ok(())
    }

    /// Key material for `identifier`, or `None` if no such key exists
    pub async fn get_key(&self, identifier: &str) -> CryptoResult<Option<SecureBytes>> {
        validate_key_identifier(identifier)?;

        let _guard = self.locks.lock(identifier).await;
        match self.storage.retrieve_data(&storage_key(identifier)).await {
            Ok(bytes) => Ok(Some(SecureBytes::from(bytes))),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the key; a missing key is `KeyNotFound`
    pub async fn delete_key(&self, identifier: &str) -> CryptoResult<()> {
        validate_key_identifier(identifier)?;

        let _guard = self.locks.lock(identifier).await;
        match self.storage.delete_data(&storage_key(identifier)).await {
            Ok(()) => {
                log::info!("deleted key '{}'", identifier);
                Ok(())
            }
            Err(StorageError::NotFound { .. }) => Err(CryptoError::key_not_found(identifier)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains_key(&self, identifier: &str) -> CryptoResult<bool> {
        validate_key_identifier(identifier)?;

        let _guard = self.locks.lock(identifier).await;
        Ok(self.storage.contains_data(&storage_key(identifier)).await?)
    }

    /// Identifiers of every stored key, sorted
    pub async fn list_key_identifiers(&self) -> CryptoResult<Vec<String>> {
        let mut identifiers: Vec<String> = self
            .storage
            .list_data_identifiers()
            .await?
            .into_iter()
            .filter_map(|id| id.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }
}

fn check_material(key: &[u8]) -> CryptoResult<()> {
    if key.is_empty() {
        return Err(CryptoError::invalid_parameter(
            "key",
            "non-empty key material",
            "0 bytes",
        ));
    }
    Ok(())
}
