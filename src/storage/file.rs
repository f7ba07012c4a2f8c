use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use zeroize::Zeroizing;

use super::SecureStorage;
use crate::engine::{CryptoEngine, EncryptionAlgorithm, SoftwareCryptoEngine};
use crate::error::{CryptoError, CryptoResult, StorageError};
use crate::secure_memory::SecureBytes;

const SEALED_EXTENSION: &str = "sealed";
const SEAL_ALGORITHM: EncryptionAlgorithm = EncryptionAlgorithm::Aes256Gcm;
const ID_LEN_PREFIX: usize = 4;

/// [`SecureStorage`] that keeps one AES-256-GCM sealed file per identifier.
///
/// A file is named by the hex SHA-256 of its identifier, so names have a
/// fixed length whatever the identifier. The sealed payload is
/// `u32be(len(identifier)) || identifier || data` and the file stem is the
/// associated data; a file renamed onto another identifier fails to open and
/// is reported as `StorageError::Corrupted`. Listing opens each file to
/// recover its identifier.
///
/// Writes go to a uniquely named temporary file that is then renamed over
/// the target, so concurrent readers see the old value or the new one.
pub struct EncryptedFileStorage {
    root: PathBuf,
    master_key: SecureBytes,
    engine: SoftwareCryptoEngine,
}

impl EncryptedFileStorage {
    /// Open (creating if needed) a storage directory sealed under `master_key`.
    ///
    /// The master key must be 32 bytes.
    pub async fn open(root: impl Into<PathBuf>, master_key: SecureBytes) -> CryptoResult<Self> {
        if master_key.len() != SEAL_ALGORITHM.key_size_bytes() {
            return Err(CryptoError::InvalidKeySize {
                algorithm: SEAL_ALGORITHM.to_string(),
                expected: SEAL_ALGORITHM.key_size_bytes(),
                actual: master_key.len(),
            });
        }

        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CryptoError::Storage(map_io_error(&root.display().to_string(), e)))?;

        log::debug!("opened encrypted file storage at {}", root.display());
        Ok(Self {
            root,
            master_key,
            engine: SoftwareCryptoEngine::new(),
        })
    }

    /// Per-user data directory for the storage, if the platform has one
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("umbra").join("secure-storage"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", file_stem(identifier), SEALED_EXTENSION))
    }

    fn seal(&self, stem: &str, identifier: &str, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        let id_len = u32::try_from(identifier.len()).map_err(|_| StorageError::Unavailable {
            cause: "identifier too long".to_string(),
        })?;

        let mut payload = Zeroizing::new(Vec::with_capacity(
            ID_LEN_PREFIX + identifier.len() + data.len(),
        ));
        payload.extend_from_slice(&id_len.to_be_bytes());
        payload.extend_from_slice(identifier.as_bytes());
        payload.extend_from_slice(data);

        self.engine
            .encrypt(
                &payload,
                self.master_key.as_bytes(),
                None,
                SEAL_ALGORITHM,
                Some(stem.as_bytes()),
            )
            .map_err(|e| StorageError::Unavailable {
                cause: format!("sealing failed: {}", e),
            })
    }

    /// Open a sealed file, returning the identifier it was stored under and
    /// the offset of the data within the payload
    fn open_sealed(&self, stem: &str, sealed: &[u8]) -> Option<(String, Zeroizing<Vec<u8>>, usize)> {
        let payload = Zeroizing::new(
            self.engine
                .decrypt(
                    sealed,
                    self.master_key.as_bytes(),
                    None,
                    SEAL_ALGORITHM,
                    Some(stem.as_bytes()),
                )
                .ok()?,
        );

        let prefix: [u8; ID_LEN_PREFIX] = payload.get(..ID_LEN_PREFIX)?.try_into().ok()?;
        let data_start = ID_LEN_PREFIX.checked_add(u32::from_be_bytes(prefix) as usize)?;
        let identifier = std::str::from_utf8(payload.get(ID_LEN_PREFIX..data_start)?).ok()?;
        if file_stem(identifier) != stem {
            return None;
        }
        Some((identifier.to_string(), payload, data_start))
    }
}

fn file_stem(identifier: &str) -> String {
    hex::encode(Sha256::digest(identifier.as_bytes()))
}

fn stem_of(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(&format!(".{}", SEALED_EXTENSION))?;
    let is_digest = stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit());
    is_digest.then_some(stem)
}

fn map_io_error(identifier: &str, err: std::io::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound {
            identifier: identifier.to_string(),
        },
        ErrorKind::PermissionDenied => StorageError::PermissionDenied {
            identifier: identifier.to_string(),
        },
        _ => StorageError::Unavailable {
            cause: err.to_string(),
        },
    }
}

#[async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn store_data(&self, data: &[u8], identifier: &str) -> Result<(), StorageError> {
        let stem = file_stem(identifier);
        let sealed = self.seal(&stem, identifier, data)?;

        let target = self.path_for(identifier);
        let temp = self
            .root
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        fs::write(&temp, &sealed)
            .await
            .map_err(|e| map_io_error(identifier, e))?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(map_io_error(identifier, e));
        }
        Ok(())
    }

    async fn retrieve_data(&self, identifier: &str) -> Result<Vec<u8>, StorageError> {
        let sealed = fs::read(self.path_for(identifier))
            .await
            .map_err(|e| map_io_error(identifier, e))?;

        match self.open_sealed(&file_stem(identifier), &sealed) {
            Some((stored_as, payload, data_start)) if stored_as == identifier => {
                Ok(payload[data_start..].to_vec())
            }
            _ => {
                log::warn!("sealed entry '{}' failed to open", identifier);
                Err(StorageError::Corrupted {
                    identifier: identifier.to_string(),
                    cause: "authentication tag mismatch".to_string(),
                })
            }
        }
    }

    async fn delete_data(&self, identifier: &str) -> Result<(), StorageError> {
        fs::remove_file(self.path_for(identifier))
            .await
            .map_err(|e| map_io_error(identifier, e))
    }

    async fn list_data_identifiers(&self) -> Result<Vec<String>, StorageError> {
        let root = self.root.display().to_string();
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| map_io_error(&root, e))?;

        let mut identifiers = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io_error(&root, e))? {
            let file_name = entry.file_name();
            let stem = match file_name.to_str().and_then(stem_of) {
                Some(stem) => stem,
                None => continue,
            };

            let sealed = match fs::read(entry.path()).await {
                Ok(sealed) => sealed,
                // Deleted since the directory was read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(map_io_error(&root, e)),
            };
            match self.open_sealed(stem, &sealed) {
                Some((identifier, _, _)) => identifiers.push(identifier),
                None => log::warn!("skipping sealed file {} that failed to open", stem),
            }
        }
        identifiers.sort();
        Ok(identifiers)
    }

    async fn contains_data(&self, identifier: &str) -> Result<bool, StorageError> {
        fs::try_exists(self.path_for(identifier))
            .await
            .map_err(|e| map_io_error(identifier, e))
    }
}
