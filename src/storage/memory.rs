use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SecureStorage;
use crate::error::StorageError;
use crate::secure_memory::SecureBytes;

/// Process-local [`SecureStorage`].
///
/// Values are held as [`SecureBytes`], so they are zeroed when overwritten,
/// deleted or when the storage is dropped.
#[derive(Debug, Default)]
pub struct InMemorySecureStorage {
    entries: RwLock<HashMap<String, SecureBytes>>,
}

impl InMemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecureStorage for InMemorySecureStorage {
    async fn store_data(&self, data: &[u8], identifier: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(identifier.to_string(), SecureBytes::new(data));
        Ok(())
    }

    async fn retrieve_data(&self, identifier: &str) -> Result<Vec<u8>, StorageError> {
        let entries = self.entries.read().await;
        entries
            .get(identifier)
            .map(|value| value.as_bytes().to_vec())
            .ok_or_else(|| StorageError::NotFound {
                identifier: identifier.to_string(),
            })
    }

    async fn delete_data(&self, identifier: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        match entries.remove(identifier) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                identifier: identifier.to_string(),
            }),
        }
    }

    async fn list_data_identifiers(&self) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        let mut identifiers: Vec<String> = entries.keys().cloned().collect();
        identifiers.sort();
        Ok(identifiers)
    }

    async fn contains_data(&self, identifier: &str) -> Result<bool, StorageError> {
        Ok(self.entries.read().await.contains_key(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let storage = InMemorySecureStorage::new();
        storage.store_data(b"value", "key:a").await.unwrap();

        assert_eq!(storage.retrieve_data("key:a").await.unwrap(), b"value");
        assert!(storage.contains_data("key:a").await.unwrap());

        storage.delete_data("key:a").await.unwrap();
        assert!(storage.retrieve_data("key:a").await.unwrap_err().is_not_found());
        assert!(storage.delete_data("key:a").await.unwrap_err().is_not_found());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let storage = InMemorySecureStorage::new();
        storage.store_data(b"first", "id").await.unwrap();
        storage.store_data(b"second", "id").await.unwrap();
        assert_eq!(storage.retrieve_data("id").await.unwrap(), b"second");
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_listing_is_sorted() {
        let storage = InMemorySecureStorage::new();
        for id in ["metadata:b", "key:b", "key:a"] {
            storage.store_data(b"x", id).await.unwrap();
        }
        assert_eq!(
            storage.list_data_identifiers().await.unwrap(),
            vec!["key:a", "key:b", "metadata:b"]
        );
    }
}
