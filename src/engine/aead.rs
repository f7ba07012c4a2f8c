//! Authenticated modes (AES-256-GCM, ChaCha20-Poly1305).
//!
//! Framing is `ciphertext || tag`, with the tag split off and verified by the
//! cipher before any keystream is applied, so a mismatch never yields plaintext.

use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroize;

use super::algorithm::{EncryptionAlgorithm, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};

/// Encrypt and append the 16-byte tag
pub(crate) fn seal(
    algorithm: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    match algorithm {
        EncryptionAlgorithm::Aes256Gcm => seal_with::<Aes256Gcm>(algorithm, key, iv, plaintext, aad),
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            seal_with::<ChaCha20Poly1305>(algorithm, key, iv, plaintext, aad)
        }
        EncryptionAlgorithm::Aes256Cbc => Err(CryptoError::UnsupportedAlgorithm {
            algorithm: format!("{} as an authenticated mode", algorithm),
        }),
    }
}

/// Split off the trailing tag, verify it, then decrypt
pub(crate) fn open(
    algorithm: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    sealed: &[u8],
    aad: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    match algorithm {
        EncryptionAlgorithm::Aes256Gcm => open_with::<Aes256Gcm>(algorithm, key, iv, sealed, aad),
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            open_with::<ChaCha20Poly1305>(algorithm, key, iv, sealed, aad)
        }
        EncryptionAlgorithm::Aes256Cbc => Err(CryptoError::UnsupportedAlgorithm {
            algorithm: format!("{} as an authenticated mode", algorithm),
        }),
    }
}

fn cipher_for<C: KeyInit>(algorithm: EncryptionAlgorithm, key: &[u8]) -> CryptoResult<C> {
    C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize {
        algorithm: algorithm.to_string(),
        expected: algorithm.key_size_bytes(),
        actual: key.len(),
    })
}

fn seal_with<C: AeadInPlace + KeyInit>(
    algorithm: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for::<C>(algorithm, key)?;

    let mut buffer = Vec::with_capacity(plaintext.len() + TAG_SIZE);
    buffer.extend_from_slice(plaintext);

    let tag = cipher
        .encrypt_in_place_detached(Nonce::<C>::from_slice(iv), aad.unwrap_or(&[]), &mut buffer)
        .map_err(|e| {
            buffer.zeroize();
            CryptoError::EncryptionFailed {
                algorithm: algorithm.to_string(),
                cause: e.to_string(),
            }
        })?;

    buffer.extend_from_slice(&tag);
    Ok(buffer)
}

fn open_with<C: AeadInPlace + KeyInit>(
    algorithm: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    sealed: &[u8],
    aad: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            algorithm: algorithm.to_string(),
        });
    }

    let cipher = cipher_for::<C>(algorithm, key)?;
    let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    let mut buffer = body.to_vec();
    match cipher.decrypt_in_place_detached(
        Nonce::<C>::from_slice(iv),
        aad.unwrap_or(&[]),
        &mut buffer,
        Tag::<C>::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::DecryptionFailed {
                algorithm: algorithm.to_string(),
            })
        }
    }
}
