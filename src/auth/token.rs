// Authentication tokens: policy, the token value, and HMAC signing

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;
use crate::utils;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

pub const CLAIM_ISSUER: &str = "iss";
pub const CLAIM_SUBJECT: &str = "sub";
pub const CLAIM_ISSUED_AT: &str = "iat";
pub const CLAIM_EXPIRES_AT: &str = "exp";
pub const CLAIM_TOKEN_ID: &str = "jti";

const NONCE_LEN: usize = 16;
const SIGNING_KEY_LEN: usize = 32;

/// Token lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// Validity window of a freshly issued token
    pub validity_secs: u64,
    /// How long after expiry a token may still be refreshed
    pub refresh_grace_secs: u64,
    /// Remaining lifetime below which the session reports `RequiresRefresh`
    pub refresh_threshold_secs: u64,
    pub issuer: String,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            validity_secs: 3600,
            refresh_grace_secs: 7 * 86_400,
            refresh_threshold_secs: 300,
            issuer: "umbra".to_string(),
        }
    }
}

impl TokenPolicy {
    pub fn validity(&self) -> Duration {
        Duration::seconds(self.validity_secs as i64)
    }

    pub fn refresh_grace(&self) -> Duration {
        Duration::seconds(self.refresh_grace_secs as i64)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::seconds(self.refresh_threshold_secs as i64)
    }

    pub fn validate(&self) -> CryptoResult<()> {
        // Keep the durations well inside chrono's range
        const MAX_SECS: u64 = 100 * 365 * 86_400;

        if self.validity_secs == 0 || self.validity_secs > MAX_SECS {
            return Err(CryptoError::configuration(
                "tokens.validity_secs",
                "must be positive and at most 100 years",
            ));
        }
        if self.refresh_grace_secs > MAX_SECS {
            return Err(CryptoError::configuration(
                "tokens.refresh_grace_secs",
                "must be at most 100 years",
            ));
        }
        if self.refresh_threshold_secs >= self.validity_secs {
            return Err(CryptoError::configuration(
                "tokens.refresh_threshold_secs",
                "must be shorter than the validity window",
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err(CryptoError::configuration("tokens.issuer", "must not be empty"));
        }
        Ok(())
    }
}

/// An issued authentication token.
///
/// `Debug` shows a short fingerprint in place of the token string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token_string: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_identifier: String,
    pub claims: BTreeMap<String, String>,
}

impl AuthToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Token string present, bearer type, and `issued_at < expires_at`
    pub fn is_well_formed(&self) -> bool {
        !self.token_string.is_empty()
            && self.token_type == TOKEN_TYPE_BEARER
            && self.issued_at < self.expires_at
    }

    /// Non-reversible short form of the token string for logs
    pub fn fingerprint(&self) -> String {
        utils::log_fingerprint(self.token_string.as_bytes())
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("fingerprint", &self.fingerprint())
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("user_identifier", &self.user_identifier)
            .field("claims", &self.claims)
            .finish()
    }
}

/// Issues and checks HMAC-SHA256 token strings.
///
/// A token string is `base64url(nonce) "." base64url(tag)`. The tag covers
/// the nonce, token type, issue and expiry times, user identifier and every
/// claim, so none of the token's fields can be altered without detection.
pub struct TokenSigner {
    key: SecureBytes,
}

impl TokenSigner {
    pub fn new(key: SecureBytes) -> CryptoResult<Self> {
        if key.len() < SIGNING_KEY_LEN {
            return Err(CryptoError::InvalidKeySize {
                algorithm: "HMAC-SHA256".to_string(),
                expected: SIGNING_KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self { key })
    }

    /// Signer with a fresh random key; its tokens die with it
    pub fn generate() -> CryptoResult<Self> {
        Self::new(utils::random_secure_bytes(SIGNING_KEY_LEN)?)
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA256, self.key.as_bytes())
    }

    /// Issue a token for `user` valid from `now` for the policy's validity window.
    ///
    /// Times are truncated to whole seconds.
    pub fn issue(&self, user: &str, now: DateTime<Utc>, policy: &TokenPolicy) -> CryptoResult<AuthToken> {
        let issued_at = DateTime::<Utc>::from_timestamp(now.timestamp(), 0)
            .ok_or_else(|| CryptoError::internal("issuing token", "timestamp out of range"))?;
        let expires_at = issued_at + policy.validity();

        let nonce = utils::random_bytes(NONCE_LEN)?;
        let nonce_b64 = base64::encode_config(&nonce, base64::URL_SAFE_NO_PAD);

        let mut claims = BTreeMap::new();
        claims.insert(CLAIM_ISSUER.to_string(), policy.issuer.clone());
        claims.insert(CLAIM_SUBJECT.to_string(), user.to_string());
        claims.insert(CLAIM_ISSUED_AT.to_string(), issued_at.timestamp().to_string());
        claims.insert(CLAIM_EXPIRES_AT.to_string(), expires_at.timestamp().to_string());
        claims.insert(CLAIM_TOKEN_ID.to_string(), nonce_b64.clone());

        let mut token = AuthToken {
            token_string: String::new(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            issued_at,
            expires_at,
            user_identifier: user.to_string(),
            claims,
        };

        let tag = hmac::sign(&self.hmac_key(), &signed_message(&nonce, &token));
        token.token_string = format!(
            "{}.{}",
            nonce_b64,
            base64::encode_config(tag.as_ref(), base64::URL_SAFE_NO_PAD)
        );
        Ok(token)
    }

    /// Whether the token string was issued by this signer for exactly these
    /// token fields. The tag comparison is constant time.
    pub fn verify(&self, token: &AuthToken) -> bool {
        let mut parts = token.token_string.split('.');
        let (nonce_b64, tag_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(nonce), Some(tag), None) => (nonce, tag),
            _ => return false,
        };

        let nonce = match base64::decode_config(nonce_b64, base64::URL_SAFE_NO_PAD) {
            Ok(nonce) if nonce.len() == NONCE_LEN => nonce,
            _ => return false,
        };
        let tag = match base64::decode_config(tag_b64, base64::URL_SAFE_NO_PAD) {
            Ok(tag) => tag,
            Err(_) => return false,
        };

        hmac::verify(&self.hmac_key(), &signed_message(&nonce, token), &tag).is_ok()
    }
}

/// Canonical byte form of everything the tag covers. Variable-length fields
/// carry a length prefix so no two distinct tokens encode alike; claims are
/// taken in the map's sorted key order.
fn signed_message(nonce: &[u8], token: &AuthToken) -> Vec<u8> {
    let mut message = Vec::with_capacity(128);
    message.extend_from_slice(nonce);
    push_field(&mut message, token.token_type.as_bytes());
    message.extend_from_slice(&token.issued_at.timestamp().to_be_bytes());
    message.extend_from_slice(&token.expires_at.timestamp().to_be_bytes());
    push_field(&mut message, token.user_identifier.as_bytes());

    message.extend_from_slice(&(token.claims.len() as u64).to_be_bytes());
    for (name, value) in &token.claims {
        push_field(&mut message, name.as_bytes());
        push_field(&mut message, value.as_bytes());
    }
    message
}

fn push_field(message: &mut Vec<u8>, field: &[u8]) {
    message.extend_from_slice(&(field.len() as u64).to_be_bytes());
    message.extend_from_slice(field);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::generate().unwrap()
    }

    #[test]
    fn test_issued_token_shape() {
        let policy = TokenPolicy::default();
        let now = Utc::now();
        let token = signer().issue("alice", now, &policy).unwrap();

        assert!(token.is_well_formed());
        assert!(token.issued_at < token.expires_at);
        assert_eq!(token.expires_at - token.issued_at, Duration::seconds(3600));
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.claims.get("iss").map(String::as_str), Some("umbra"));
        assert_eq!(token.claims.get("sub").map(String::as_str), Some("alice"));
        assert_eq!(
            token.claims.get("exp").cloned(),
            Some(token.expires_at.timestamp().to_string())
        );
        assert!(token.issued_at <= now);
    }

    #[test]
    fn test_signature_binds_fields() {
        let signer = signer();
        let token = signer.issue("alice", Utc::now(), &TokenPolicy::default()).unwrap();
        assert!(signer.verify(&token));

        let mut extended = token.clone();
        extended.expires_at += Duration::days(1);
        assert!(!signer.verify(&extended));

        let mut impersonated = token.clone();
        impersonated.user_identifier = "mallory".to_string();
        assert!(!signer.verify(&impersonated));

        let mut relabelled = token.clone();
        relabelled.claims.insert("sub".to_string(), "admin".to_string());
        assert!(!signer.verify(&relabelled));

        let mut extra_claim = token.clone();
        extra_claim.claims.insert("role".to_string(), "admin".to_string());
        assert!(!signer.verify(&extra_claim));

        let mut dropped_claim = token.clone();
        dropped_claim.claims.remove("iss");
        assert!(!signer.verify(&dropped_claim));

        let mut retyped = token.clone();
        retyped.token_type = "MAC".to_string();
        assert!(!signer.verify(&retyped));

        let mut garbled = token.clone();
        garbled.token_string.push('x');
        assert!(!signer.verify(&garbled));

        let mut empty = token;
        empty.token_string.clear();
        assert!(!signer.verify(&empty));
    }

    #[test]
    fn test_other_signer_rejects() {
        let token = signer().issue("alice", Utc::now(), &TokenPolicy::default()).unwrap();
        assert!(!signer().verify(&token));
    }

    #[test]
    fn test_debug_hides_token_string() {
        let token = signer().issue("alice", Utc::now(), &TokenPolicy::default()).unwrap();
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains(&token.token_string));
        assert!(rendered.contains(&token.fingerprint()));
    }

    #[test]
    fn test_policy_validation() {
        assert!(TokenPolicy::default().validate().is_ok());

        let no_validity = TokenPolicy {
            validity_secs: 0,
            ..TokenPolicy::default()
        };
        assert!(no_validity.validate().is_err());

        let threshold_too_long = TokenPolicy {
            refresh_threshold_secs: 3600,
            ..TokenPolicy::default()
        };
        assert!(threshold_too_long.validate().is_err());
    }

    #[test]
    fn test_short_signing_key_rejected() {
        assert!(matches!(
            TokenSigner::new(SecureBytes::new(&[0u8; 8])),
            Err(CryptoError::InvalidKeySize { .. })
        ));
    }
}
