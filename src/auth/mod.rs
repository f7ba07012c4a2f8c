/*!
 * Authentication
 *
 * Password hashing and verification, and the token lifecycle of a single
 * client session:
 *
 * ```text
 *  NotAuthenticated --perform_authentication--> Authenticated
 *  Authenticated    --near or past expiry-----> RequiresRefresh
 *  RequiresRefresh  --refresh_auth_token------> Authenticated
 *  any              --revoke / logout---------> NotAuthenticated
 * ```
 *
 * Expiry is computed on demand from the injected clock; nothing runs in the
 * background.
 */

pub mod password;
pub mod provider;
pub mod token;

#[cfg(test)]
mod tests;

pub use password::{
    Argon2Params, EncodedHash, KdfParams, PasswordAlgorithm, PasswordHasher, PasswordHashingConfig,
};
pub use provider::LocalAuthenticationProvider;
pub use token::{AuthToken, TokenPolicy, TokenSigner};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoResult;

/// How a caller proves its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    Biometric,
    SingleSignOn,
    Certificate,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMethod::Password => "password",
            AuthMethod::Biometric => "biometric",
            AuthMethod::SingleSignOn => "single_sign_on",
            AuthMethod::Certificate => "certificate",
        };
        f.write_str(name)
    }
}

/// Session state derived from the active token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Authenticated,
    RequiresRefresh,
    NotAuthenticated,
}

/// Credentials presented for one authentication attempt.
///
/// The secret is zeroed on drop and never printed.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    secret: Zeroizing<String>,
    pub method: AuthMethod,
    pub metadata: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            identifier: identifier.into(),
            secret: Zeroizing::new(secret.into()),
            method,
            metadata: BTreeMap::new(),
        }
    }

    /// Identifier and password
    pub fn password(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(identifier, password, AuthMethod::Password)
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .field("method", &self.method)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Capability set of an authentication backend.
///
/// Implementations are selected at construction time; callers hold a
/// `dyn AuthenticationProvider`.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Hash `password` under a fresh salt with the configured KDF
    async fn hash_password(&self, password: &str) -> CryptoResult<EncodedHash>;

    /// Check `password` against an encoded hash.
    ///
    /// A malformed hash is `InvalidHashFormat`, not `false`.
    async fn verify_password(&self, password: &str, encoded_hash: &str) -> CryptoResult<bool>;

    /// Verify credentials and, on success, start a session with a new token.
    ///
    /// Unsupported methods fail with `MethodNotSupported`; unknown identifiers
    /// and wrong secrets both fail with `AuthenticationFailed`.
    async fn perform_authentication(&self, credentials: &Credentials) -> CryptoResult<AuthToken>;

    /// Whether the token is unexpired, well formed, authentic and not revoked
    async fn validate_auth_token(&self, token: &AuthToken) -> bool;

    /// Replace a token that is valid or expired within the grace window.
    ///
    /// Beyond the grace window this is `TokenExpired`.
    async fn refresh_auth_token(&self, token: &AuthToken) -> CryptoResult<AuthToken>;

    /// Invalidate the token; returns whether it was newly revoked
    async fn revoke_auth_token(&self, token: &AuthToken) -> bool;

    async fn check_status(&self) -> AuthStatus;

    /// End the session. Idempotent.
    async fn perform_logout(&self) -> bool;
}
