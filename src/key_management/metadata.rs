use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{validate_key_identifier, METADATA_PREFIX};
use crate::locks::IdentifierLocks;
use crate::engine::EncryptionAlgorithm;
use crate::error::{CryptoError, CryptoResult, StorageError};
use crate::storage::SecureStorage;

/// Attribute overriding the service-wide rotation period, in whole days
pub const ATTR_ROTATION_PERIOD_DAYS: &str = "rotationPeriodDays";
/// Attribute naming the key this one was rotated from
pub const ATTR_ROTATED_FROM: &str = "rotatedFrom";

/// Descriptive data kept alongside each key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub id: String,
    pub algorithm: EncryptionAlgorithm,
    pub key_size_bits: u32,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl KeyMetadata {
    /// Metadata for a fresh key of `algorithm`'s size
    pub fn new(
        id: impl Into<String>,
        algorithm: EncryptionAlgorithm,
        purpose: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            algorithm,
            key_size_bits: algorithm.key_size_bits(),
            purpose: purpose.into(),
            created_at,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Per-key rotation period override.
    ///
    /// Values that are not a positive integer are ignored.
    pub fn rotation_period_days(&self) -> Option<u32> {
        self.attributes
            .get(ATTR_ROTATION_PERIOD_DAYS)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|days| *days > 0)
    }

    /// The identifier this key replaced, if it was produced by rotation
    pub fn rotated_from(&self) -> Option<&str> {
        self.attributes.get(ATTR_ROTATED_FROM).map(String::as_str)
    }
}

/// Key metadata persisted as JSON under `metadata:{id}`, in the same
/// storage as the key material but enumerable on its own.
pub struct KeyMetadataStore {
    storage: Arc<dyn SecureStorage>,
    locks: IdentifierLocks,
}

fn storage_key(identifier: &str) -> String {
    format!("{}{}", METADATA_PREFIX, identifier)
}

impl KeyMetadataStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            locks: IdentifierLocks::new(),
        }
    }

    pub async fn store_key_metadata(&self, metadata: &KeyMetadata) -> CryptoResult<()> {
        validate_key_identifier(&metadata.id)?;
        let encoded = serde_json::to_vec(metadata)?;

        let _guard = self.locks.lock(&metadata.id).await;
        self.storage
            .store_data(&encoded, &storage_key(&metadata.id))
            .await?;
        Ok(())
    }

    pub async fn get_key_metadata(&self, identifier: &str) -> CryptoResult<Option<KeyMetadata>> {
        validate_key_identifier(identifier)?;

        let _guard = self.locks.lock(identifier).await;
        self.load(identifier).await
    }

    /// Remove the metadata; missing metadata is `KeyNotFound`
    pub async fn delete_key_metadata(&self, identifier: &str) -> CryptoResult<()> {
        validate_key_identifier(identifier)?;

        let _guard = self.locks.lock(identifier).await;
        match self.storage.delete_data(&storage_key(identifier)).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound { .. }) => Err(CryptoError::key_not_found(identifier)),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata of every key, sorted by identifier.
    ///
    /// Entries deleted between listing and reading are skipped.
    pub async fn get_all_key_metadata(&self) -> CryptoResult<Vec<KeyMetadata>> {
        let mut all = Vec::new();
        for identifier in self.get_all_key_identifiers().await? {
            if let Some(metadata) = self.load(&identifier).await? {
                all.push(metadata);
            }
        }
        Ok(all)
    }

    /// Identifiers that have metadata, sorted
    pub async fn get_all_key_identifiers(&self) -> CryptoResult<Vec<String>> {
        let mut identifiers: Vec<String> = self
            .storage
            .list_data_identifiers()
            .await?
            .into_iter()
            .filter_map(|id| id.strip_prefix(METADATA_PREFIX).map(str::to_string))
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }

    async fn load(&self, identifier: &str) -> CryptoResult<Option<KeyMetadata>> {
        match self.storage.retrieve_data(&storage_key(identifier)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
