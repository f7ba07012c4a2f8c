/*!
 * Cryptographic Engine
 *
 * Stateless primitive operations: symmetric encryption and decryption,
 * hashing and secure random generation. The [`CryptoEngine`] trait is the
 * seam the key management and authentication layers depend on;
 * [`SoftwareCryptoEngine`] backs it with the audited RustCrypto ciphers.
 *
 * Every call is independent, so a single engine can be shared across tasks
 * and used fully in parallel.
 */

mod aead;
mod algorithm;
mod cbc;
mod digest;

pub use algorithm::{EncryptionAlgorithm, HashAlgorithm, TAG_SIZE};

use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;
use crate::utils;


/// Primitive cryptographic operations.
///
/// # IV handling
///
/// * AES-256-CBC always emits `iv || ciphertext` and reads the IV back from
///   the prefix on decryption. A supplied IV must match that prefix.
/// * For the authenticated modes, a caller-supplied IV produces exactly
///   `ciphertext || tag`; the caller keeps the IV. When the IV is omitted a
///   fresh one is generated and prepended, giving `iv || ciphertext || tag`,
///   and decryption with `iv = None` reads it back from the prefix.
pub trait CryptoEngine: Send + Sync {
    /// Encrypt `plaintext` under `key`.
    ///
    /// # Errors
    ///
    /// * `InvalidKeySize` / `InvalidIvSize` with expected and actual lengths
    /// * `InvalidParameter` if AAD is supplied to the unauthenticated CBC mode
    /// * `RandomGenerationFailed` if an IV had to be generated and the CSPRNG failed
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        iv: Option<&[u8]>,
        algorithm: EncryptionAlgorithm,
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>>;

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Tag mismatch, padding failure and truncated input are all reported
    /// as `DecryptionFailed`, and no partial plaintext is returned.
    fn decrypt(
        &self,
        blob: &[u8],
        key: &[u8],
        iv: Option<&[u8]>,
        algorithm: EncryptionAlgorithm,
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>>;

    /// Deterministic digest of `data`
    fn hash(&self, data: &[u8], algorithm: HashAlgorithm) -> Vec<u8>;

    /// `count` bytes from the operating system CSPRNG
    fn generate_random_bytes(&self, count: usize) -> CryptoResult<Vec<u8>>;

    /// Fresh key material sized for `algorithm`
    fn generate_key(&self, algorithm: EncryptionAlgorithm) -> CryptoResult<SecureBytes> {
        self.generate_random_bytes(algorithm.key_size_bytes())
            .map(SecureBytes::from)
    }

    /// Fresh IV sized for `algorithm`
    fn generate_iv(&self, algorithm: EncryptionAlgorithm) -> CryptoResult<Vec<u8>> {
        self.generate_random_bytes(algorithm.iv_size_bytes())
    }

    /// Hex-encoded digest of `data`
    fn hash_hex(&self, data: &[u8], algorithm: HashAlgorithm) -> String {
        utils::to_hex(&self.hash(data, algorithm))
    }
}

/// [`CryptoEngine`] backed by `aes-gcm`, `chacha20poly1305`, `cbc` and `sha2`
///
/// # Examples
///
/// ```
/// use umbra_crypto::engine::{CryptoEngine, EncryptionAlgorithm, SoftwareCryptoEngine};
///
/// let engine = SoftwareCryptoEngine::new();
/// let key = engine.generate_key(EncryptionAlgorithm::Aes256Gcm).unwrap();
///
/// let blob = engine
///     .encrypt(b"Secret message", key.as_bytes(), None, EncryptionAlgorithm::Aes256Gcm, Some(b"header"))
///     .unwrap();
/// let plaintext = engine
///     .decrypt(&blob, key.as_bytes(), None, EncryptionAlgorithm::Aes256Gcm, Some(b"header"))
///     .unwrap();
/// assert_eq!(plaintext, b"Secret message");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCryptoEngine;

impl SoftwareCryptoEngine {
    pub fn new() -> Self {
        Self
    }
}

fn check_key(algorithm: EncryptionAlgorithm, key: &[u8]) -> CryptoResult<()> {
    if key.len() != algorithm.key_size_bytes() {
        return Err(CryptoError::InvalidKeySize {
            algorithm: algorithm.to_string(),
            expected: algorithm.key_size_bytes(),
            actual: key.len(),
        });
    }
    Ok(())
}

fn check_iv(algorithm: EncryptionAlgorithm, iv: &[u8]) -> CryptoResult<()> {
    if iv.len() != algorithm.iv_size_bytes() {
        return Err(CryptoError::InvalidIvSize {
            algorithm: algorithm.to_string(),
            expected: algorithm.iv_size_bytes(),
            actual: iv.len(),
        });
    }
    Ok(())
}

fn reject_aad_for_cbc(aad: Option<&[u8]>) -> CryptoResult<()> {
    match aad {
        Some(data) => Err(CryptoError::invalid_parameter(
            "aad",
            "no associated data for AES-256-CBC",
            &format!("{} bytes", data.len()),
        )),
        None => Ok(()),
    }
}

impl CryptoEngine for SoftwareCryptoEngine {
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        iv: Option<&[u8]>,
        algorithm: EncryptionAlgorithm,
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        check_key(algorithm, key)?;
        if let Some(iv) = iv {
            check_iv(algorithm, iv)?;
        }

        log::trace!("encrypting {} bytes with {}", plaintext.len(), algorithm);

        match algorithm {
            EncryptionAlgorithm::Aes256Cbc => {
                reject_aad_for_cbc(aad)?;
                match iv {
                    Some(iv) => cbc::encrypt(key, iv, plaintext),
                    None => {
                        let iv = self.generate_iv(algorithm)?;
                        cbc::encrypt(key, &iv, plaintext)
                    }
                }
            }
            EncryptionAlgorithm::Aes256Gcm | EncryptionAlgorithm::ChaCha20Poly1305 => match iv {
                Some(iv) => aead::seal(algorithm, key, iv, plaintext, aad),
                None => {
                    let iv = self.generate_iv(algorithm)?;
                    let sealed = aead::seal(algorithm, key, &iv, plaintext, aad)?;

                    let mut blob = Vec::with_capacity(iv.len() + sealed.len());
                    blob.extend_from_slice(&iv);
                    blob.extend_from_slice(&sealed);
                    Ok(blob)
                }
            },
        }
    }

    fn decrypt(
        &self,
        blob: &[u8],
        key: &[u8],
        iv: Option<&[u8]>,
        algorithm: EncryptionAlgorithm,
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        check_key(algorithm, key)?;
        if let Some(iv) = iv {
            check_iv(algorithm, iv)?;
        }

        let result = match algorithm {
            EncryptionAlgorithm::Aes256Cbc => {
                reject_aad_for_cbc(aad)?;
                cbc::decrypt(key, blob, iv)
            }
            EncryptionAlgorithm::Aes256Gcm | EncryptionAlgorithm::ChaCha20Poly1305 => match iv {
                Some(iv) => aead::open(algorithm, key, iv, blob, aad),
                None => {
                    let iv_len = algorithm.iv_size_bytes();
                    if blob.len() < iv_len {
                        return Err(CryptoError::DecryptionFailed {
                            algorithm: algorithm.to_string(),
                        });
                    }
                    let (iv, sealed) = blob.split_at(iv_len);
                    aead::open(algorithm, key, iv, sealed, aad)
                }
            },
        };

        if result.is_err() {
            log::debug!("{} decryption rejected", algorithm);
        }
        result
    }

    fn hash(&self, data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
        digest::digest(data, algorithm)
    }

    fn generate_random_bytes(&self, count: usize) -> CryptoResult<Vec<u8>> {
        utils::random_bytes(count)
    }

    fn generate_key(&self, algorithm: EncryptionAlgorithm) -> CryptoResult<SecureBytes> {
        utils::random_secure_bytes(algorithm.key_size_bytes())
    }
}
