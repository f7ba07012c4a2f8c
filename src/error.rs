/*!
 * Error Handling for the Umbra Cryptography Core
 *
 * Provides a single error type for every component of the core, with stable
 * numeric error codes, a category used by callers to decide policy, user-facing
 * messages and non-sensitive technical details.
 *
 * Keys, passwords, salts, digests and token strings never appear in any error
 * message or detail map produced here.
 */

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors reported by a [`SecureStorage`](crate::storage::SecureStorage) backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("No entry stored under '{identifier}'")]
    NotFound { identifier: String },

    #[error("An entry already exists under '{identifier}'")]
    AlreadyExists { identifier: String },

    #[error("Secure storage unavailable: {cause}")]
    Unavailable { cause: String },

    #[error("Stored entry '{identifier}' is corrupted: {cause}")]
    Corrupted { identifier: String, cause: String },

    #[error("Permission denied for '{identifier}'")]
    PermissionDenied { identifier: String },
}

impl StorageError {
    /// Whether this error means the entry simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn error_code(&self) -> u32 {
        match self {
            StorageError::NotFound { .. } => error_codes::STORAGE_NOT_FOUND,
            StorageError::AlreadyExists { .. } => error_codes::STORAGE_ALREADY_EXISTS,
            StorageError::Unavailable { .. } => error_codes::STORAGE_UNAVAILABLE,
            StorageError::Corrupted { .. } => error_codes::STORAGE_CORRUPTED,
            StorageError::PermissionDenied { .. } => error_codes::STORAGE_PERMISSION_DENIED,
        }
    }
}

/// Comprehensive error type for all operations of the core
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    // Validation
    #[error("Invalid key size for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        algorithm: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid IV size for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidIvSize {
        algorithm: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {parameter} - expected {expected} - got {actual}")]
    InvalidParameter {
        parameter: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid key identifier '{identifier}': {reason}")]
    InvalidKeyIdentifier { identifier: String, reason: String },

    #[error("Invalid encoded hash: {reason}")]
    InvalidHashFormat { reason: String },

    // Operational
    #[error("Encryption failed for {algorithm}: {cause}")]
    EncryptionFailed { algorithm: String, cause: String },

    /// Authentication tag mismatch, padding failure and truncated input all
    /// collapse into this one variant.
    #[error("Decryption failed for {algorithm}")]
    DecryptionFailed { algorithm: String },

    #[error("Hashing failed for {algorithm}: {cause}")]
    HashingFailed { algorithm: String, cause: String },

    #[error("Key generation failed: {cause}")]
    KeyGenerationFailed { cause: String },

    #[error("Random number generation failed: {cause}")]
    RandomGenerationFailed { cause: String },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    // Storage
    #[error("Key not found: {identifier}")]
    KeyNotFound { identifier: String },

    #[error("Key already exists: {identifier}")]
    KeyAlreadyExists { identifier: String },

    #[error("Secure storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Configuration
    #[error("Invalid configuration: {setting} - {reason}")]
    Configuration { setting: String, reason: String },

    // Security boundary
    #[error("Unauthorized: {operation}")]
    Unauthorized { operation: String },

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Token expired beyond the refresh window")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    // Platform
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("Authentication method not supported: {method}")]
    MethodNotSupported { method: String },

    // Generic
    #[error("Internal error: {context} - {cause}")]
    Internal { context: String, cause: String },
}

/// Broad classification callers use to decide whether to create, fail or report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller error; never retried silently
    Validation,
    /// A cryptographic or runtime operation failed
    Operational,
    /// The backing store refused or could not serve the request
    Storage,
    /// Invalid or missing settings; fatal at startup
    Configuration,
    /// Access was refused
    SecurityBoundary,
    /// The platform lacks the requested capability
    Platform,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Operational => "operational",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::SecurityBoundary => "security_boundary",
            ErrorCategory::Platform => "platform",
        };
        f.write_str(name)
    }
}

/// Error code constants for different error categories
pub mod error_codes {
    // Validation errors: 1000-1999
    pub const INVALID_KEY_SIZE: u32 = 1001;
    pub const INVALID_IV_SIZE: u32 = 1002;
    pub const INVALID_PARAMETER: u32 = 1003;
    pub const INVALID_KEY_IDENTIFIER: u32 = 1004;
    pub const INVALID_HASH_FORMAT: u32 = 1005;

    // Operational errors: 2000-2999
    pub const ENCRYPTION_FAILED: u32 = 2001;
    pub const DECRYPTION_FAILED: u32 = 2002;
    pub const HASHING_FAILED: u32 = 2003;
    pub const KEY_GENERATION_FAILED: u32 = 2004;
    pub const RANDOM_GENERATION_FAILED: u32 = 2005;
    pub const AUTHENTICATION_FAILED: u32 = 2006;
    pub const OPERATION_TIMED_OUT: u32 = 2007;
    pub const OPERATION_CANCELLED: u32 = 2008;

    // Storage errors: 4000-4999
    pub const KEY_NOT_FOUND: u32 = 4001;
    pub const KEY_ALREADY_EXISTS: u32 = 4002;
    pub const STORAGE_NOT_FOUND: u32 = 4003;
    pub const STORAGE_ALREADY_EXISTS: u32 = 4004;
    pub const STORAGE_UNAVAILABLE: u32 = 4005;
    pub const STORAGE_CORRUPTED: u32 = 4006;
    pub const STORAGE_PERMISSION_DENIED: u32 = 4007;
    pub const SERIALIZATION_FAILED: u32 = 4008;

    // Configuration errors: 5000-5999
    pub const INVALID_CONFIGURATION: u32 = 5001;

    // Security boundary errors: 6000-6999
    pub const UNAUTHORIZED: u32 = 6001;
    pub const NOT_AUTHENTICATED: u32 = 6002;
    pub const TOKEN_EXPIRED: u32 = 6003;
    pub const TOKEN_REVOKED: u32 = 6004;
    pub const INVALID_TOKEN: u32 = 6005;

    // Platform errors: 7000-7999
    pub const UNSUPPORTED_ALGORITHM: u32 = 7001;
    pub const METHOD_NOT_SUPPORTED: u32 = 7002;

    // Generic errors
    pub const INTERNAL_ERROR: u32 = 9001;
}

impl CryptoError {
    /// Get the numeric error code for this error
    pub fn error_code(&self) -> u32 {
        match self {
            CryptoError::InvalidKeySize { .. } => error_codes::INVALID_KEY_SIZE,
            CryptoError::InvalidIvSize { .. } => error_codes::INVALID_IV_SIZE,
            CryptoError::InvalidParameter { .. } => error_codes::INVALID_PARAMETER,
            CryptoError::InvalidKeyIdentifier { .. } => error_codes::INVALID_KEY_IDENTIFIER,
            CryptoError::InvalidHashFormat { .. } => error_codes::INVALID_HASH_FORMAT,
            CryptoError::EncryptionFailed { .. } => error_codes::ENCRYPTION_FAILED,
            CryptoError::DecryptionFailed { .. } => error_codes::DECRYPTION_FAILED,
            CryptoError::HashingFailed { .. } => error_codes::HASHING_FAILED,
            CryptoError::KeyGenerationFailed { .. } => error_codes::KEY_GENERATION_FAILED,
            CryptoError::RandomGenerationFailed { .. } => error_codes::RANDOM_GENERATION_FAILED,
            CryptoError::AuthenticationFailed => error_codes::AUTHENTICATION_FAILED,
            CryptoError::Timeout { .. } => error_codes::OPERATION_TIMED_OUT,
            CryptoError::Cancelled { .. } => error_codes::OPERATION_CANCELLED,
            CryptoError::KeyNotFound { .. } => error_codes::KEY_NOT_FOUND,
            CryptoError::KeyAlreadyExists { .. } => error_codes::KEY_ALREADY_EXISTS,
            CryptoError::Storage(inner) => inner.error_code(),
            CryptoError::SerializationError(_) => error_codes::SERIALIZATION_FAILED,
            CryptoError::Configuration { .. } => error_codes::INVALID_CONFIGURATION,
            CryptoError::Unauthorized { .. } => error_codes::UNAUTHORIZED,
            CryptoError::NotAuthenticated => error_codes::NOT_AUTHENTICATED,
            CryptoError::TokenExpired => error_codes::TOKEN_EXPIRED,
            CryptoError::TokenRevoked => error_codes::TOKEN_REVOKED,
            CryptoError::InvalidToken { .. } => error_codes::INVALID_TOKEN,
            CryptoError::UnsupportedAlgorithm { .. } => error_codes::UNSUPPORTED_ALGORITHM,
            CryptoError::MethodNotSupported { .. } => error_codes::METHOD_NOT_SUPPORTED,
            CryptoError::Internal { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// Get the taxonomy category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            CryptoError::InvalidKeySize { .. }
            | CryptoError::InvalidIvSize { .. }
            | CryptoError::InvalidParameter { .. }
            | CryptoError::InvalidKeyIdentifier { .. }
            | CryptoError::InvalidHashFormat { .. } => ErrorCategory::Validation,

            CryptoError::EncryptionFailed { .. }
            | CryptoError::DecryptionFailed { .. }
            | CryptoError::HashingFailed { .. }
            | CryptoError::KeyGenerationFailed { .. }
            | CryptoError::RandomGenerationFailed { .. }
            | CryptoError::AuthenticationFailed
            | CryptoError::Timeout { .. }
            | CryptoError::Cancelled { .. }
            | CryptoError::Internal { .. } => ErrorCategory::Operational,

            CryptoError::KeyNotFound { .. }
            | CryptoError::KeyAlreadyExists { .. }
            | CryptoError::Storage(_)
            | CryptoError::SerializationError(_) => ErrorCategory::Storage,

            CryptoError::Configuration { .. } => ErrorCategory::Configuration,

            CryptoError::Unauthorized { .. }
            | CryptoError::NotAuthenticated
            | CryptoError::TokenExpired
            | CryptoError::TokenRevoked
            | CryptoError::InvalidToken { .. } => ErrorCategory::SecurityBoundary,

            CryptoError::UnsupportedAlgorithm { .. } | CryptoError::MethodNotSupported { .. } => {
                ErrorCategory::Platform
            }
        }
    }

    /// Whether a caller could reasonably try the same call again later.
    ///
    /// Nothing in this crate retries on its own; this only informs caller policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            CryptoError::Storage(StorageError::Unavailable { .. })
            | CryptoError::Timeout { .. }
            | CryptoError::Cancelled { .. }
            | CryptoError::RandomGenerationFailed { .. } => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_friendly_message(&self) -> String {
        match self {
            CryptoError::InvalidKeySize { algorithm, .. } => format!(
                "The key supplied for {} has the wrong length.",
                algorithm
            ),
            CryptoError::InvalidIvSize { algorithm, .. } => format!(
                "The initialization vector supplied for {} has the wrong length.",
                algorithm
            ),
            CryptoError::InvalidParameter { parameter, expected, .. } => format!(
                "Invalid parameter '{}'. Expected {}.",
                parameter, expected
            ),
            CryptoError::InvalidKeyIdentifier { identifier, .. } => {
                format!("'{}' is not a valid key identifier.", identifier)
            }
            CryptoError::InvalidHashFormat { .. } => {
                "The stored password hash is malformed and cannot be used.".to_string()
            }
            CryptoError::EncryptionFailed { .. } => {
                "Encryption failed. No data was written.".to_string()
            }
            CryptoError::DecryptionFailed { .. } => {
                "Decryption failed. The data may be corrupted, tampered with, or encrypted under a different key."
                    .to_string()
            }
            CryptoError::HashingFailed { .. } => "Hashing operation failed.".to_string(),
            CryptoError::KeyGenerationFailed { .. } => {
                "A new key could not be generated.".to_string()
            }
            CryptoError::RandomGenerationFailed { .. } => {
                "Secure random number generation is unavailable. Cryptographic operations cannot continue."
                    .to_string()
            }
            CryptoError::AuthenticationFailed => {
                "The identifier or password is incorrect.".to_string()
            }
            CryptoError::Timeout { operation } => {
                format!("Operation '{}' did not complete in time.", operation)
            }
            CryptoError::Cancelled { operation } => {
                format!("Operation '{}' was cancelled.", operation)
            }
            CryptoError::KeyNotFound { identifier } => {
                format!("No key named '{}' exists.", identifier)
            }
            CryptoError::KeyAlreadyExists { identifier } => {
                format!("A key named '{}' already exists.", identifier)
            }
            CryptoError::Storage(inner) => match inner {
                StorageError::NotFound { .. } => "The requested item was not found.".to_string(),
                StorageError::AlreadyExists { .. } => "The item already exists.".to_string(),
                StorageError::Unavailable { .. } => {
                    "Secure storage is currently unavailable. Try again later.".to_string()
                }
                StorageError::Corrupted { .. } => {
                    "Stored data is corrupted and cannot be read.".to_string()
                }
                StorageError::PermissionDenied { .. } => {
                    "Access to secure storage was denied.".to_string()
                }
            },
            CryptoError::SerializationError(_) => {
                "Data serialization failed. Data format may be corrupted.".to_string()
            }
            CryptoError::Configuration { setting, .. } => {
                format!("Configuration setting '{}' is invalid.", setting)
            }
            CryptoError::Unauthorized { operation } => {
                format!("You are not authorized to perform '{}'.", operation)
            }
            CryptoError::NotAuthenticated => "Please sign in to continue.".to_string(),
            CryptoError::TokenExpired => {
                "Your session has expired. Please sign in again.".to_string()
            }
            CryptoError::TokenRevoked => {
                "Your session was ended. Please sign in again.".to_string()
            }
            CryptoError::InvalidToken { .. } => "The session token is invalid.".to_string(),
            CryptoError::UnsupportedAlgorithm { algorithm } => {
                format!("Algorithm '{}' is not supported.", algorithm)
            }
            CryptoError::MethodNotSupported { method } => {
                format!("Sign-in method '{}' is not available.", method)
            }
            CryptoError::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }

    /// Get technical details for debugging.
    ///
    /// Only non-sensitive values (sizes, algorithm names, identifiers) are included.
    pub fn technical_details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();

        details.insert("error_code".to_string(), self.error_code().to_string());
        details.insert("error_type".to_string(), self.error_type().to_string());
        details.insert("category".to_string(), self.category().to_string());

        match self {
            CryptoError::InvalidKeySize {
                algorithm,
                expected,
                actual,
            }
            | CryptoError::InvalidIvSize {
                algorithm,
                expected,
                actual,
            } => {
                details.insert("algorithm".to_string(), algorithm.clone());
                details.insert("expected".to_string(), expected.to_string());
                details.insert("actual".to_string(), actual.to_string());
            }
            CryptoError::InvalidParameter {
                parameter,
                expected,
                actual,
            } => {
                details.insert("parameter".to_string(), parameter.clone());
                details.insert("expected".to_string(), expected.clone());
                details.insert("actual".to_string(), actual.clone());
            }
            CryptoError::InvalidKeyIdentifier { identifier, reason } => {
                details.insert("identifier".to_string(), identifier.clone());
                details.insert("reason".to_string(), reason.clone());
            }
            CryptoError::EncryptionFailed { algorithm, .. }
            | CryptoError::DecryptionFailed { algorithm }
            | CryptoError::HashingFailed { algorithm, .. }
            | CryptoError::UnsupportedAlgorithm { algorithm } => {
                details.insert("algorithm".to_string(), algorithm.clone());
            }
            CryptoError::KeyNotFound { identifier } | CryptoError::KeyAlreadyExists { identifier } => {
                details.insert("identifier".to_string(), identifier.clone());
            }
            CryptoError::Storage(inner) => match inner {
                StorageError::NotFound { identifier }
                | StorageError::AlreadyExists { identifier }
                | StorageError::PermissionDenied { identifier }
                | StorageError::Corrupted { identifier, .. } => {
                    details.insert("identifier".to_string(), identifier.clone());
                }
                StorageError::Unavailable { cause } => {
                    details.insert("cause".to_string(), cause.clone());
                }
            },
            CryptoError::Configuration { setting, reason } => {
                details.insert("setting".to_string(), setting.clone());
                details.insert("reason".to_string(), reason.clone());
            }
            CryptoError::Timeout { operation }
            | CryptoError::Cancelled { operation }
            | CryptoError::Unauthorized { operation } => {
                details.insert("operation".to_string(), operation.clone());
            }
            CryptoError::MethodNotSupported { method } => {
                details.insert("method".to_string(), method.clone());
            }
            CryptoError::Internal { context, .. } => {
                details.insert("context".to_string(), context.clone());
            }
            _ => {}
        }

        details
    }

    /// Get suggested remediation steps
    pub fn suggested_remediation(&self) -> Option<String> {
        match self {
            CryptoError::InvalidKeySize { expected, .. } => Some(format!(
                "Supply a key of exactly {} bytes for this algorithm.",
                expected
            )),
            CryptoError::InvalidIvSize { expected, .. } => Some(format!(
                "Supply an IV of exactly {} bytes, or omit it to have one generated.",
                expected
            )),
            CryptoError::RandomGenerationFailed { .. } => Some(
                "Check system entropy sources. The operating system CSPRNG must be available."
                    .to_string(),
            ),
            CryptoError::Storage(StorageError::Unavailable { .. }) => {
                Some("Verify that the secure storage backend is reachable.".to_string())
            }
            CryptoError::Configuration { .. } => {
                Some("Correct the configuration and restart the application.".to_string())
            }
            CryptoError::TokenExpired | CryptoError::TokenRevoked | CryptoError::NotAuthenticated => {
                Some("Authenticate again with valid credentials.".to_string())
            }
            CryptoError::UnsupportedAlgorithm { .. } => Some(
                "Use AES-256-GCM, ChaCha20-Poly1305 or AES-256-CBC.".to_string(),
            ),
            _ => None,
        }
    }

    /// Get the error variant name as a string
    pub fn error_type(&self) -> &'static str {
        match self {
            CryptoError::InvalidKeySize { .. } => "InvalidKeySize",
            CryptoError::InvalidIvSize { .. } => "InvalidIVSize",
            CryptoError::InvalidParameter { .. } => "InvalidParameter",
            CryptoError::InvalidKeyIdentifier { .. } => "InvalidKeyIdentifier",
            CryptoError::InvalidHashFormat { .. } => "InvalidHashFormat",
            CryptoError::EncryptionFailed { .. } => "EncryptionFailed",
            CryptoError::DecryptionFailed { .. } => "DecryptionFailed",
            CryptoError::HashingFailed { .. } => "HashingFailed",
            CryptoError::KeyGenerationFailed { .. } => "KeyGenerationFailed",
            CryptoError::RandomGenerationFailed { .. } => "RandomGenerationFailed",
            CryptoError::AuthenticationFailed => "AuthenticationFailed",
            CryptoError::Timeout { .. } => "Timeout",
            CryptoError::Cancelled { .. } => "Cancelled",
            CryptoError::KeyNotFound { .. } => "KeyNotFound",
            CryptoError::KeyAlreadyExists { .. } => "KeyAlreadyExists",
            CryptoError::Storage(_) => "StorageError",
            CryptoError::SerializationError(_) => "SerializationError",
            CryptoError::Configuration { .. } => "ConfigurationError",
            CryptoError::Unauthorized { .. } => "Unauthorized",
            CryptoError::NotAuthenticated => "NotAuthenticated",
            CryptoError::TokenExpired => "TokenExpired",
            CryptoError::TokenRevoked => "TokenRevoked",
            CryptoError::InvalidToken { .. } => "InvalidToken",
            CryptoError::UnsupportedAlgorithm { .. } => "UnsupportedAlgorithm",
            CryptoError::MethodNotSupported { .. } => "MethodNotSupported",
            CryptoError::Internal { .. } => "InternalError",
        }
    }
}

/// Convenience constructors for common error types
impl CryptoError {
    pub fn invalid_parameter(parameter: &str, expected: &str, actual: &str) -> Self {
        CryptoError::InvalidParameter {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn invalid_hash_format(reason: &str) -> Self {
        CryptoError::InvalidHashFormat {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_key_identifier(identifier: &str, reason: &str) -> Self {
        CryptoError::InvalidKeyIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn configuration(setting: &str, reason: &str) -> Self {
        CryptoError::Configuration {
            setting: setting.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn key_not_found(identifier: &str) -> Self {
        CryptoError::KeyNotFound {
            identifier: identifier.to_string(),
        }
    }

    /// Wrap an unexpected lower-level failure with context instead of discarding it
    pub fn internal(context: &str, cause: impl fmt::Display) -> Self {
        CryptoError::Internal {
            context: context.to_string(),
            cause: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CryptoError {
    fn from(err: std::io::Error) -> Self {
        CryptoError::internal("I/O operation failed", err)
    }
}

/// Result type alias for operations of the core
pub type CryptoResult<T> = Result<T, CryptoError>;
