/*!
 * Umbra Cryptography Core
 *
 * This crate implements the cryptographic services of the Umbra backup
 * client, on top of a pluggable secure key-value store:
 *
 * - Symmetric encryption with AES-256-GCM, ChaCha20-Poly1305 and AES-CBC
 * - SHA-256/SHA-512 hashing and OS-backed random generation
 * - Key storage, key metadata and versioned key rotation
 * - Argon2id/PBKDF2 password hashing and HMAC-signed session tokens
 *
 * Applications construct a [`CoreServices`] once with a [`CoreConfig`] and a
 * [`SecureStorage`](storage::SecureStorage) backend, and hand out the
 * components it wires together.
 */

/// Common error types for the cryptography core
pub mod error;

/// Secure memory handling utilities
pub mod secure_memory;

/// Utilities for cryptographic operations
pub mod utils;

/// Injectable time source
pub mod clock;

/// Symmetric encryption, hashing and random generation
pub mod engine;

/// Secure key-value storage contract and backends
pub mod storage;

/// Key storage, metadata and rotation
pub mod key_management;

/// Password hashing and token-based authentication
pub mod auth;

/// Configuration
pub mod config;

/// Composition root
pub mod services;

mod locks;

// Re-export main types for convenience
pub use auth::{
    AuthMethod, AuthStatus, AuthToken, AuthenticationProvider, Credentials, EncodedHash,
    LocalAuthenticationProvider,
};
pub use config::CoreConfig;
pub use engine::{CryptoEngine, EncryptionAlgorithm, HashAlgorithm, SoftwareCryptoEngine};
pub use error::{CryptoError, CryptoResult, ErrorCategory, StorageError};
pub use key_management::{
    KeyManager, KeyMetadata, KeyMetadataStore, KeyRotationService, KeyStore, RotationPolicy,
};
pub use secure_memory::SecureBytes;
pub use services::CoreServices;

/// The types most applications need, in one import.
///
/// ```
/// use umbra_crypto::prelude::*;
///
/// let engine = SoftwareCryptoEngine::new();
/// let key = engine.generate_key(EncryptionAlgorithm::Aes256Gcm).unwrap();
/// let sealed = engine
///     .encrypt(b"hello", key.as_bytes(), None, EncryptionAlgorithm::Aes256Gcm, None)
///     .unwrap();
/// let opened = engine
///     .decrypt(&sealed, key.as_bytes(), None, EncryptionAlgorithm::Aes256Gcm, None)
///     .unwrap();
/// assert_eq!(opened, b"hello");
/// ```
pub mod prelude {
    pub use crate::auth::{
        AuthMethod, AuthStatus, AuthToken, AuthenticationProvider, Credentials, EncodedHash,
        LocalAuthenticationProvider, PasswordAlgorithm, PasswordHashingConfig, TokenPolicy,
    };
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::CoreConfig;
    pub use crate::engine::{CryptoEngine, EncryptionAlgorithm, HashAlgorithm, SoftwareCryptoEngine};
    pub use crate::error::{CryptoError, CryptoResult, ErrorCategory, StorageError};
    pub use crate::key_management::{
        KeyAgeSummary, KeyManager, KeyMetadata, KeyMetadataStore, KeyRotationService, KeyStore,
        RotationPolicy,
    };
    pub use crate::secure_memory::SecureBytes;
    pub use crate::services::CoreServices;
    pub use crate::storage::{EncryptedFileStorage, InMemorySecureStorage, SecureStorage};
}
