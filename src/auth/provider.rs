// Local password authentication with in-process token sessions

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::password::{EncodedHash, PasswordHasher, PasswordHashingConfig};
use super::token::{AuthToken, TokenPolicy, TokenSigner};
use super::{AuthMethod, AuthStatus, AuthenticationProvider, Credentials};
use crate::clock::Clock;
use crate::error::{CryptoError, CryptoResult, StorageError};
use crate::locks::IdentifierLocks;
use crate::storage::SecureStorage;
use crate::utils;

const CREDENTIAL_PREFIX: &str = "credential:";
const MAX_IDENTIFIER_LEN: usize = 256;

// Verified against when the identifier is unknown, so both failure paths
// cost one key derivation
const TIMING_DUMMY_PASSWORD: &str = "umbra-unknown-identity";

#[derive(Debug, Default)]
struct SessionState {
    active: Option<AuthToken>,
    /// SHA-256 of revoked token strings, with the token's expiry
    revoked: HashMap<String, DateTime<Utc>>,
    context: BTreeMap<String, String>,
}

impl SessionState {
    fn is_revoked(&self, token: &AuthToken) -> bool {
        self.revoked.contains_key(&revocation_key(token))
    }

    fn clear_session(&mut self) {
        self.active = None;
        self.context.clear();
    }

    /// Forget revocations for tokens that can no longer be validated or
    /// refreshed anyway
    fn prune(&mut self, now: DateTime<Utc>, policy: &TokenPolicy) {
        let grace = policy.refresh_grace();
        self.revoked.retain(|_, expires_at| now - *expires_at <= grace);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenCheck {
    Valid,
    Expired,
    Revoked,
    Forged,
}

fn revocation_key(token: &AuthToken) -> String {
    utils::to_hex(&Sha256::digest(token.token_string.as_bytes()))
}

/// Password authentication against credentials kept in [`SecureStorage`].
///
/// Password hashes live under `credential:{identifier}`. Tokens are signed
/// with the provider's [`TokenSigner`]; revocations and the active session
/// are held in memory. Key derivation runs on the blocking thread pool.
pub struct LocalAuthenticationProvider {
    hasher: Arc<PasswordHasher>,
    signer: TokenSigner,
    policy: TokenPolicy,
    storage: Arc<dyn SecureStorage>,
    clock: Arc<dyn Clock>,
    state: RwLock<SessionState>,
    credential_locks: IdentifierLocks,
    dummy_hash: EncodedHash,
}

impl LocalAuthenticationProvider {
    pub fn new(
        hashing: PasswordHashingConfig,
        policy: TokenPolicy,
        signer: TokenSigner,
        storage: Arc<dyn SecureStorage>,
        clock: Arc<dyn Clock>,
    ) -> CryptoResult<Self> {
        policy.validate()?;
        let hasher = PasswordHasher::new(hashing)?;
        let dummy_hash = hasher.hash_password(TIMING_DUMMY_PASSWORD)?;

        Ok(Self {
            hasher: Arc::new(hasher),
            signer,
            policy,
            storage,
            clock,
            state: RwLock::new(SessionState::default()),
            credential_locks: IdentifierLocks::new(),
            dummy_hash,
        })
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Register a password for a new identifier.
    ///
    /// An identifier that already has credentials is a storage
    /// `AlreadyExists` error.
    pub async fn register_credentials(&self, identifier: &str, password: &str) -> CryptoResult<()> {
        validate_identifier(identifier)?;
        let location = credential_key(identifier);

        let _guard = self.credential_locks.lock(identifier).await;
        if self.storage.contains_data(&location).await? {
            return Err(StorageError::AlreadyExists {
                identifier: identifier.to_string(),
            }
            .into());
        }

        let encoded = self.hash_in_background(password).await?;
        self.storage
            .store_data(encoded.to_string().as_bytes(), &location)
            .await?;
        log::info!("registered credentials for '{}'", identifier);
        Ok(())
    }

    /// Replace the password after checking the current one.
    ///
    /// Unknown identifiers and a wrong current password both fail with
    /// `AuthenticationFailed`.
    pub async fn change_password(
        &self,
        identifier: &str,
        current_password: &str,
        new_password: &str,
    ) -> CryptoResult<()> {
        validate_identifier(identifier)?;

        let _guard = self.credential_locks.lock(identifier).await;
        let stored = match self.load_hash(identifier).await? {
            Some(stored) => stored,
            None => {
                self.verify_in_background(current_password, self.dummy_hash.clone())
                    .await?;
                return Err(CryptoError::AuthenticationFailed);
            }
        };

        if !self.verify_in_background(current_password, stored).await? {
            log::info!("password change rejected for '{}'", identifier);
            return Err(CryptoError::AuthenticationFailed);
        }

        let encoded = self.hash_in_background(new_password).await?;
        self.storage
            .store_data(encoded.to_string().as_bytes(), &credential_key(identifier))
            .await?;
        log::info!("password changed for '{}'", identifier);
        Ok(())
    }

    pub async fn remove_credentials(&self, identifier: &str) -> CryptoResult<()> {
        validate_identifier(identifier)?;

        let _guard = self.credential_locks.lock(identifier).await;
        self.storage.delete_data(&credential_key(identifier)).await?;
        log::info!("removed credentials for '{}'", identifier);
        Ok(())
    }

    pub async fn has_credentials(&self, identifier: &str) -> CryptoResult<bool> {
        validate_identifier(identifier)?;
        Ok(self.storage.contains_data(&credential_key(identifier)).await?)
    }

    /// Resolve the user behind `token` for `operation`.
    ///
    /// Expired and revoked tokens report as such; anything not issued by
    /// this provider is `Unauthorized`.
    pub async fn authorize(&self, token: &AuthToken, operation: &str) -> CryptoResult<String> {
        let now = self.clock.now();
        let state = self.state.read().await;
        match self.check(token, now, &state) {
            TokenCheck::Valid => Ok(token.user_identifier.clone()),
            TokenCheck::Expired => Err(CryptoError::TokenExpired),
            TokenCheck::Revoked => Err(CryptoError::TokenRevoked),
            TokenCheck::Forged => {
                log::warn!("rejected token {} for '{}'", token.fingerprint(), operation);
                Err(CryptoError::Unauthorized {
                    operation: operation.to_string(),
                })
            }
        }
    }

    /// The token of the current session, if any
    pub async fn active_token(&self) -> Option<AuthToken> {
        self.state.read().await.active.clone()
    }

    /// Context recorded at authentication: method, identifier, time, and
    /// any metadata supplied with the credentials
    pub async fn session_context(&self) -> BTreeMap<String, String> {
        self.state.read().await.context.clone()
    }

    fn check(&self, token: &AuthToken, now: DateTime<Utc>, state: &SessionState) -> TokenCheck {
        if !token.is_well_formed() || !self.signer.verify(token) {
            TokenCheck::Forged
        } else if state.is_revoked(token) {
            TokenCheck::Revoked
        } else if token.is_expired_at(now) {
            TokenCheck::Expired
        } else {
            TokenCheck::Valid
        }
    }

    async fn load_hash(&self, identifier: &str) -> CryptoResult<Option<EncodedHash>> {
        let location = credential_key(identifier);
        let bytes = match self.storage.retrieve_data(&location).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let encoded = String::from_utf8(bytes).map_err(|_| StorageError::Corrupted {
            identifier: location.clone(),
            cause: "credential record is not UTF-8".to_string(),
        })?;
        Ok(Some(EncodedHash::parse(&encoded)?))
    }

    async fn hash_in_background(&self, password: &str) -> CryptoResult<EncodedHash> {
        let password = Zeroizing::new(password.to_string());
        self.run_blocking("hashing password", move |hasher| {
            hasher.hash_password(&password)
        })
        .await
    }

    async fn verify_in_background(&self, password: &str, stored: EncodedHash) -> CryptoResult<bool> {
        let password = Zeroizing::new(password.to_string());
        self.run_blocking("verifying password", move |hasher| {
            hasher.verify_parsed(&password, &stored)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, context: &str, work: F) -> CryptoResult<T>
    where
        F: FnOnce(&PasswordHasher) -> CryptoResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || work(&hasher))
            .await
            .map_err(|e| CryptoError::internal(context, e))?
    }
}

#[async_trait]
impl AuthenticationProvider for LocalAuthenticationProvider {
    async fn hash_password(&self, password: &str) -> CryptoResult<EncodedHash> {
        self.hash_in_background(password).await
    }

    async fn verify_password(&self, password: &str, encoded_hash: &str) -> CryptoResult<bool> {
        let stored = EncodedHash::parse(encoded_hash)?;
        self.verify_in_background(password, stored).await
    }

    async fn perform_authentication(&self, credentials: &Credentials) -> CryptoResult<AuthToken> {
        if credentials.method != AuthMethod::Password {
            return Err(CryptoError::MethodNotSupported {
                method: credentials.method.to_string(),
            });
        }
        let identifier = credentials.identifier.as_str();
        if validate_identifier(identifier).is_err() {
            self.verify_in_background(credentials.secret(), self.dummy_hash.clone())
                .await?;
            return Err(CryptoError::AuthenticationFailed);
        }

        {
            let _guard = self.credential_locks.lock(identifier).await;
            let stored = match self.load_hash(identifier).await? {
                Some(stored) => stored,
                None => {
                    self.verify_in_background(credentials.secret(), self.dummy_hash.clone())
                        .await?;
                    log::info!("authentication failed for '{}'", identifier);
                    return Err(CryptoError::AuthenticationFailed);
                }
            };

            let password = Zeroizing::new(credentials.secret().to_string());
            let (verified, upgraded) = self
                .run_blocking("verifying password", move |hasher| {
                    if !hasher.verify_parsed(&password, &stored)? {
                        return Ok((false, None));
                    }
                    let upgraded = if hasher.needs_rehash(&stored) {
                        Some(hasher.hash_password(&password)?)
                    } else {
                        None
                    };
                    Ok((true, upgraded))
                })
                .await?;

            if !verified {
                log::info!("authentication failed for '{}'", identifier);
                return Err(CryptoError::AuthenticationFailed);
            }

            if let Some(upgraded) = upgraded {
                match self
                    .storage
                    .store_data(upgraded.to_string().as_bytes(), &credential_key(identifier))
                    .await
                {
                    Ok(()) => log::info!(
                        "upgraded password hash for '{}' to {}",
                        identifier,
                        upgraded.algorithm()
                    ),
                    Err(e) => log::warn!("password hash upgrade for '{}' failed: {}", identifier, e),
                }
            }
        }

        let now = self.clock.now();
        let token = self.signer.issue(identifier, now, &self.policy)?;

        let mut state = self.state.write().await;
        state.prune(now, &self.policy);
        state.active = Some(token.clone());
        state.context = credentials.metadata.clone();
        state
            .context
            .insert("method".to_string(), credentials.method.to_string());
        state
            .context
            .insert("identifier".to_string(), identifier.to_string());
        state
            .context
            .insert("authenticatedAt".to_string(), now.to_rfc3339());

        log::info!("authenticated '{}' (token {})", identifier, token.fingerprint());
        Ok(token)
    }

    async fn validate_auth_token(&self, token: &AuthToken) -> bool {
        let now = self.clock.now();
        let state = self.state.read().await;
        self.check(token, now, &state) == TokenCheck::Valid
    }

    async fn refresh_auth_token(&self, token: &AuthToken) -> CryptoResult<AuthToken> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        match self.check(token, now, &state) {
            TokenCheck::Forged => {
                return Err(CryptoError::InvalidToken {
                    reason: "token was not issued by this provider".to_string(),
                })
            }
            TokenCheck::Revoked => return Err(CryptoError::TokenRevoked),
            TokenCheck::Expired if now - token.expires_at > self.policy.refresh_grace() => {
                log::debug!("token {} is past its refresh window", token.fingerprint());
                return Err(CryptoError::TokenExpired);
            }
            TokenCheck::Expired | TokenCheck::Valid => {}
        }

        let refreshed = self.signer.issue(&token.user_identifier, now, &self.policy)?;
        state.prune(now, &self.policy);
        state.revoked.insert(revocation_key(token), token.expires_at);
        let was_active = state
            .active
            .as_ref()
            .map_or(true, |active| active.token_string == token.token_string);
        if was_active {
            state.active = Some(refreshed.clone());
        }

        log::info!(
            "refreshed token {} as {} for '{}'",
            token.fingerprint(),
            refreshed.fingerprint(),
            refreshed.user_identifier
        );
        Ok(refreshed)
    }

    async fn revoke_auth_token(&self, token: &AuthToken) -> bool {
        if !token.is_well_formed() || !self.signer.verify(token) {
            return false;
        }

        let mut state = self.state.write().await;
        let newly_revoked = state
            .revoked
            .insert(revocation_key(token), token.expires_at)
            .is_none();
        let is_active = state
            .active
            .as_ref()
            .map_or(false, |active| active.token_string == token.token_string);
        if is_active {
            state.clear_session();
        }

        if newly_revoked {
            log::info!("revoked token {}", token.fingerprint());
        }
        newly_revoked
    }

    async fn check_status(&self) -> AuthStatus {
        let now = self.clock.now();
        let state = self.state.read().await;

        let token = match &state.active {
            Some(token) => token,
            None => return AuthStatus::NotAuthenticated,
        };
        if state.is_revoked(token) {
            return AuthStatus::NotAuthenticated;
        }

        if token.is_expired_at(now) {
            if now - token.expires_at <= self.policy.refresh_grace() {
                AuthStatus::RequiresRefresh
            } else {
                AuthStatus::NotAuthenticated
            }
        } else if token.expires_at - now <= self.policy.refresh_threshold() {
            AuthStatus::RequiresRefresh
        } else {
            AuthStatus::Authenticated
        }
    }

    async fn perform_logout(&self) -> bool {
        let mut state = self.state.write().await;
        if let Some(token) = state.active.take() {
            state.revoked.insert(revocation_key(&token), token.expires_at);
            log::info!(
                "logged out '{}' (token {})",
                token.user_identifier,
                token.fingerprint()
            );
        }
        state.clear_session();
        true
    }
}

fn credential_key(identifier: &str) -> String {
    format!("{}{}", CREDENTIAL_PREFIX, identifier)
}

fn validate_identifier(identifier: &str) -> CryptoResult<()> {
    if identifier.is_empty() || identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(CryptoError::invalid_parameter(
            "identifier",
            "1 to 256 characters",
            &format!("{} characters", identifier.chars().count()),
        ));
    }
    if identifier.chars().any(char::is_control) {
        return Err(CryptoError::invalid_parameter(
            "identifier",
            "no control characters",
            "control characters",
        ));
    }
    Ok(())
}
