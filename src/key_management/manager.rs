use std::collections::BTreeMap;
use std::sync::Arc;

use super::metadata::{KeyMetadata, KeyMetadataStore};
use super::{persist_new_key, validate_key_identifier, KeyStore, VersionedKeyId};
use crate::clock::Clock;
use crate::engine::{CryptoEngine, EncryptionAlgorithm};
use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;

/// Key lifecycle front end: generation, import, deletion and encryption
/// under a stored key.
///
/// Key material and metadata are always written and removed as a pair.
pub struct KeyManager {
    key_store: Arc<KeyStore>,
    metadata_store: Arc<KeyMetadataStore>,
    engine: Arc<dyn CryptoEngine>,
    clock: Arc<dyn Clock>,
}

impl KeyManager {
    pub fn new(
        key_store: Arc<KeyStore>,
        metadata_store: Arc<KeyMetadataStore>,
        engine: Arc<dyn CryptoEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key_store,
            metadata_store,
            engine,
            clock,
        }
    }

    /// Generate the first version of a key for `purpose`, named `{purpose}_v1`.
    ///
    /// Fails with `KeyAlreadyExists` if that identifier is taken.
    pub async fn generate_key(
        &self,
        purpose: &str,
        algorithm: EncryptionAlgorithm,
        attributes: BTreeMap<String, String>,
    ) -> CryptoResult<String> {
        let identifier = VersionedKeyId::new(purpose, 1).to_string();
        self.generate_key_with_id(&identifier, purpose, algorithm, attributes)
            .await
    }

    /// Generate a key under a unique `{purpose}_{uuid}` identifier
    pub async fn generate_key_with_unique_id(
        &self,
        purpose: &str,
        algorithm: EncryptionAlgorithm,
        attributes: BTreeMap<String, String>,
    ) -> CryptoResult<String> {
        let identifier = format!("{}_{}", purpose, uuid::Uuid::new_v4().simple());
        self.generate_key_with_id(&identifier, purpose, algorithm, attributes)
            .await
    }

    async fn generate_key_with_id(
        &self,
        identifier: &str,
        purpose: &str,
        algorithm: EncryptionAlgorithm,
        attributes: BTreeMap<String, String>,
    ) -> CryptoResult<String> {
        validate_key_identifier(identifier)?;

        let key = self.engine.generate_key(algorithm)?;
        let mut metadata = KeyMetadata::new(identifier, algorithm, purpose, self.clock.now());
        metadata.attributes = attributes;

        persist_new_key(&self.key_store, &self.metadata_store, &key, &metadata).await?;
        log::info!("generated {} key '{}'", algorithm, identifier);
        Ok(identifier.to_string())
    }

    /// Store existing key material together with its metadata.
    ///
    /// The material must match the size required by `metadata.algorithm`.
    pub async fn import_key(&self, key: &SecureBytes, metadata: KeyMetadata) -> CryptoResult<()> {
        let algorithm = metadata.algorithm;
        if key.len() != algorithm.key_size_bytes() {
            return Err(CryptoError::InvalidKeySize {
                algorithm: algorithm.to_string(),
                expected: algorithm.key_size_bytes(),
                actual: key.len(),
            });
        }
        if metadata.key_size_bits as usize != key.bit_len() {
            return Err(CryptoError::invalid_parameter(
                "key_size_bits",
                &key.bit_len().to_string(),
                &metadata.key_size_bits.to_string(),
            ));
        }

        persist_new_key(&self.key_store, &self.metadata_store, key, &metadata).await?;
        log::info!("imported {} key '{}'", algorithm, metadata.id);
        Ok(())
    }

    pub async fn get_key(&self, identifier: &str) -> CryptoResult<Option<SecureBytes>> {
        self.key_store.get_key(identifier).await
    }

    pub async fn get_metadata(&self, identifier: &str) -> CryptoResult<Option<KeyMetadata>> {
        self.metadata_store.get_key_metadata(identifier).await
    }

    /// Metadata of every managed key, sorted by identifier
    pub async fn list_keys(&self) -> CryptoResult<Vec<KeyMetadata>> {
        self.metadata_store.get_all_key_metadata().await
    }

    /// Delete a key and its metadata.
    ///
    /// Succeeds if either half existed; `KeyNotFound` if neither did.
    pub async fn delete_key(&self, identifier: &str) -> CryptoResult<()> {
        validate_key_identifier(identifier)?;

        let _pair = self.key_store.lock_pair(identifier).await;
        let key_removed = absent_as_false(self.key_store.delete_key(identifier).await)?;
        let metadata_removed =
            absent_as_false(self.metadata_store.delete_key_metadata(identifier).await)?;

        if !key_removed && !metadata_removed {
            return Err(CryptoError::key_not_found(identifier));
        }
        if key_removed != metadata_removed {
            log::warn!("key '{}' was only half present when deleted", identifier);
        }
        Ok(())
    }

    /// Encrypt under the stored key, using the algorithm recorded in its metadata.
    ///
    /// The IV is generated and carried at the front of the returned blob.
    pub async fn encrypt_with_key(
        &self,
        identifier: &str,
        plaintext: &[u8],
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        let (key, metadata) = self.load_pair(identifier).await?;
        self.engine
            .encrypt(plaintext, key.as_bytes(), None, metadata.algorithm, aad)
    }

    /// Decrypt a blob produced by [`encrypt_with_key`](Self::encrypt_with_key)
    pub async fn decrypt_with_key(
        &self,
        identifier: &str,
        blob: &[u8],
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        let (key, metadata) = self.load_pair(identifier).await?;
        self.engine
            .decrypt(blob, key.as_bytes(), None, metadata.algorithm, aad)
    }

    async fn load_pair(&self, identifier: &str) -> CryptoResult<(SecureBytes, KeyMetadata)> {
        validate_key_identifier(identifier)?;

        let _pair = self.key_store.lock_pair(identifier).await;
        let key = self
            .key_store
            .get_key(identifier)
            .await?
            .ok_or_else(|| CryptoError::key_not_found(identifier))?;
        let metadata = self
            .metadata_store
            .get_key_metadata(identifier)
            .await?
            .ok_or_else(|| CryptoError::key_not_found(identifier))?;
        Ok((key, metadata))
    }
}

fn absent_as_false(result: CryptoResult<()>) -> CryptoResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(CryptoError::KeyNotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
