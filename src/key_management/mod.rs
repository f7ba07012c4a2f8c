/*!
 * Key Management System for symmetric keys
 *
 * Key material and its metadata are kept in one [`SecureStorage`] under
 * separate prefixes (`key:{id}` and `metadata:{id}`). They are created
 * together and deleted together under one per-identifier pair lock, and
 * readers that need both halves take the same lock, so no reader sees one
 * half without the other. A failure after the key is written removes the
 * key again.
 *
 * Rotation never overwrites. Each rotation mints a new identifier
 * (`{base}_v{N+1}`, or a unique id tagged with the key's purpose) and leaves
 * the previous version in place so older data stays decryptable.
 *
 * [`SecureStorage`]: crate::storage::SecureStorage
 */

mod key_store;
mod manager;
mod metadata;
mod rotation;


pub use key_store::KeyStore;
pub use manager::KeyManager;
pub use metadata::{KeyMetadata, KeyMetadataStore, ATTR_ROTATED_FROM, ATTR_ROTATION_PERIOD_DAYS};
pub use rotation::{KeyAgeSummary, KeyRotationService, RotationPolicy, VersionedKeyId};

use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;

pub(crate) const KEY_PREFIX: &str = "key:";
pub(crate) const METADATA_PREFIX: &str = "metadata:";

const MAX_IDENTIFIER_LEN: usize = 200;

/// Check that `identifier` can name a key.
///
/// Identifiers must be non-empty, at most 200 characters, and free of `:`
/// (the storage namespace separator) and control characters.
pub fn validate_key_identifier(identifier: &str) -> CryptoResult<()> {
    if identifier.is_empty() {
        return Err(CryptoError::invalid_key_identifier(identifier, "must not be empty"));
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(CryptoError::invalid_key_identifier(
            identifier,
            "longer than 200 characters",
        ));
    }
    if identifier.contains(':') {
        return Err(CryptoError::invalid_key_identifier(identifier, "must not contain ':'"));
    }
    if identifier.chars().any(char::is_control) {
        return Err(CryptoError::invalid_key_identifier(
            identifier,
            "must not contain control characters",
        ));
    }
    Ok(())
}

/// Write a brand-new key and its metadata as one unit.
///
/// The key is created first (refusing to overwrite); if the metadata cannot
/// be written the key is removed again before the error is returned. The
/// pair lock is held throughout.
pub(crate) async fn persist_new_key(
    key_store: &KeyStore,
    metadata_store: &KeyMetadataStore,
    key: &SecureBytes,
    metadata: &KeyMetadata,
) -> CryptoResult<()> {
    let _pair = key_store.lock_pair(&metadata.id).await;
    key_store
        .store_key_if_absent(key.as_bytes(), &metadata.id)
        .await?;

    if let Err(e) = metadata_store.store_key_metadata(metadata).await {
        log::warn!(
            "metadata for '{}' could not be stored, removing key: {}",
            metadata.id,
            e
        );
        if let Err(rollback) = key_store.delete_key(&metadata.id).await {
            log::error!("rollback of key '{}' failed: {}", metadata.id, rollback);
        }
        return Err(e);
    }
    Ok(())
}
