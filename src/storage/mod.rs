/*!
 * Secure Storage
 *
 * The key-value byte store every persistent component of the core is built
 * on. Raw key material, key metadata and password hashes all live in one
 * [`SecureStorage`] under distinct identifier prefixes.
 *
 * Two backends are provided:
 *
 * - [`InMemorySecureStorage`] for tests and ephemeral sessions
 * - [`EncryptedFileStorage`], which seals each entry with AES-256-GCM under a
 *   storage master key before it touches the disk
 *
 * Applications with a platform keychain implement the trait themselves.
 */

mod file;
mod memory;

pub use file::EncryptedFileStorage;
pub use memory::InMemorySecureStorage;

use async_trait::async_trait;

use crate::error::StorageError;

/// Trait for pluggable secure storage backends.
///
/// Implementations must make each call atomic with respect to the others:
/// a reader observes either the previous value or the new one, never a
/// partial write.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Store `data` under `identifier`, replacing any previous value
    async fn store_data(&self, data: &[u8], identifier: &str) -> Result<(), StorageError>;

    /// Read the value stored under `identifier`.
    ///
    /// A missing entry is `StorageError::NotFound`.
    async fn retrieve_data(&self, identifier: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove the value stored under `identifier`.
    ///
    /// A missing entry is `StorageError::NotFound`.
    async fn delete_data(&self, identifier: &str) -> Result<(), StorageError>;

    /// Every identifier currently stored, in no particular order
    async fn list_data_identifiers(&self) -> Result<Vec<String>, StorageError>;

    /// Whether an entry exists under `identifier`
    async fn contains_data(&self, identifier: &str) -> Result<bool, StorageError> {
        match self.retrieve_data(identifier).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
