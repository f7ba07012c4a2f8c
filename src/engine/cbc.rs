//! AES-CBC with PKCS#7 padding. Output is `iv || ciphertext`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::algorithm::EncryptionAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::utils;

type CbcEncryptor = cbc::Encryptor<aes::Aes128>;
type CbcDecryptor = cbc::Decryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;
const ALGORITHM: EncryptionAlgorithm = EncryptionAlgorithm::Aes256Cbc;

fn decryption_failed() -> CryptoError {
    CryptoError::DecryptionFailed {
        algorithm: ALGORITHM.to_string(),
    }
}

pub(crate) fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let encryptor = CbcEncryptor::new_from_slices(key, iv).map_err(|e| {
        CryptoError::EncryptionFailed {
            algorithm: ALGORITHM.to_string(),
            cause: e.to_string(),
        }
    })?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(iv.len() + ciphertext.len());
    blob.extend_from_slice(iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Strip the IV prefix, decrypt and unpad.
///
/// When `expected_iv` is given it must equal the prefix. Every failure,
/// including bad padding, is reported as the same `DecryptionFailed`.
pub(crate) fn decrypt(key: &[u8], blob: &[u8], expected_iv: Option<&[u8]>) -> CryptoResult<Vec<u8>> {
    let iv_len = ALGORITHM.iv_size_bytes();
    if blob.len() < iv_len + BLOCK_SIZE || (blob.len() - iv_len) % BLOCK_SIZE != 0 {
        return Err(decryption_failed());
    }

    let (iv, body) = blob.split_at(iv_len);
    if let Some(expected) = expected_iv {
        if !utils::constant_time_eq(expected, iv) {
            return Err(decryption_failed());
        }
    }

    let decryptor = CbcDecryptor::new_from_slices(key, iv).map_err(|_| decryption_failed())?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| decryption_failed())
}
