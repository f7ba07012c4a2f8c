use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

/// Size of the authentication tag appended by the authenticated modes
pub const TAG_SIZE: usize = 16;

/// Symmetric encryption algorithms supported by the engine
///
/// | Algorithm | Key | IV | Tag |
/// |---|---|---|---|
/// | AES-256-CBC | 16 | 16 | none (PKCS#7 padding) |
/// | AES-256-GCM | 32 | 12 | 16 |
/// | ChaCha20-Poly1305 | 32 | 12 | 16 |
///
/// The CBC variant keeps its legacy sizing of 16-byte keys, so its block
/// cipher runs as AES-128.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "ChaCha20-Poly1305")]
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    /// All supported algorithms
    pub const ALL: [EncryptionAlgorithm; 3] = [
        EncryptionAlgorithm::Aes256Cbc,
        EncryptionAlgorithm::Aes256Gcm,
        EncryptionAlgorithm::ChaCha20Poly1305,
    ];

    /// Required key length in bytes
    pub fn key_size_bytes(&self) -> usize {
        match self {
            EncryptionAlgorithm::Aes256Cbc => 16,
            EncryptionAlgorithm::Aes256Gcm => 32,
            EncryptionAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Required key length in bits
    pub fn key_size_bits(&self) -> u32 {
        (self.key_size_bytes() * 8) as u32
    }

    /// Required IV / nonce length in bytes
    pub fn iv_size_bytes(&self) -> usize {
        match self {
            EncryptionAlgorithm::Aes256Cbc => 16,
            EncryptionAlgorithm::Aes256Gcm => 12,
            EncryptionAlgorithm::ChaCha20Poly1305 => 12,
        }
    }

    /// Whether the mode authenticates ciphertext and AAD
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, EncryptionAlgorithm::Aes256Cbc)
    }

    /// Tag length appended to the ciphertext (0 for CBC)
    pub fn tag_size(&self) -> usize {
        if self.is_authenticated() {
            TAG_SIZE
        } else {
            0
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256Cbc => "AES-256-CBC",
            EncryptionAlgorithm::Aes256Gcm => "AES-256-GCM",
            EncryptionAlgorithm::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncryptionAlgorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            })
    }
}

/// Digest algorithms supported by [`CryptoEngine::hash`](super::CryptoEngine::hash)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA-256" | "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA-512" | "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}
