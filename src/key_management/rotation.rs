// Key rotation: policy, versioned identifiers and the rotation service

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::metadata::{KeyMetadata, KeyMetadataStore, ATTR_ROTATED_FROM};
use super::{persist_new_key, validate_key_identifier, KeyStore};
use crate::clock::Clock;
use crate::engine::{CryptoEngine, EncryptionAlgorithm};
use crate::error::{CryptoError, CryptoResult};
use crate::locks::IdentifierLocks;
use crate::secure_memory::SecureBytes;

static VERSIONED_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.+)_v(\d+)$").ok());

const SECONDS_PER_DAY: i64 = 86_400;

/// Represents a key rotation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Rotation period applied when a key has no override
    pub default_period_days: u32,
    /// Rotation period used instead when `high_security` is set
    pub high_security_period_days: u32,
    pub high_security: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            default_period_days: 90,
            high_security_period_days: 30,
            high_security: false,
        }
    }
}

impl RotationPolicy {
    /// Policy for sensitive deployments (30-day rotation)
    pub fn high_security() -> Self {
        Self {
            high_security: true,
            ..Self::default()
        }
    }

    /// Service-wide period in days
    pub fn period_days(&self) -> u32 {
        if self.high_security {
            self.high_security_period_days
        } else {
            self.default_period_days
        }
    }

    pub fn validate(&self) -> CryptoResult<()> {
        if self.default_period_days == 0 {
            return Err(CryptoError::configuration(
                "rotation.default_period_days",
                "must be at least one day",
            ));
        }
        if self.high_security_period_days == 0 {
            return Err(CryptoError::configuration(
                "rotation.high_security_period_days",
                "must be at least one day",
            ));
        }
        Ok(())
    }
}

/// A `{base}_v{version}` key identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionedKeyId {
    pub base: String,
    pub version: u32,
}

impl VersionedKeyId {
    pub fn new(base: impl Into<String>, version: u32) -> Self {
        Self {
            base: base.into(),
            version,
        }
    }

    /// The identifier one version later
    pub fn next(&self) -> CryptoResult<Self> {
        let version = self.version.checked_add(1).ok_or_else(|| {
            CryptoError::invalid_key_identifier(&self.to_string(), "version counter exhausted")
        })?;
        Ok(Self::new(self.base.clone(), version))
    }
}

impl FromStr for VersionedKeyId {
    type Err = CryptoError;

    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        let pattern = VERSIONED_ID
            .as_ref()
            .ok_or_else(|| CryptoError::internal("versioned key id pattern", "failed to compile"))?;
        let captures = pattern.captures(identifier).ok_or_else(|| {
            CryptoError::invalid_key_identifier(identifier, "expected the form {base}_v{number}")
        })?;

        let version = captures[2].parse::<u32>().map_err(|_| {
            CryptoError::invalid_key_identifier(identifier, "version number out of range")
        })?;
        Ok(Self::new(&captures[1], version))
    }
}

impl fmt::Display for VersionedKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_v{}", self.base, self.version)
    }
}

/// Age and rotation state of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAgeSummary {
    pub id: String,
    pub purpose: String,
    pub algorithm: EncryptionAlgorithm,
    pub created_at: DateTime<Utc>,
    pub age_days: i64,
    pub rotation_period_days: u32,
    pub rotation_due: bool,
    pub days_until_rotation: Option<u64>,
}

/// Policy-driven generation of new key versions.
///
/// Rotations of the same base identifier are serialized, and the new
/// version is always one above the highest version already stored, so two
/// concurrent rotations can never mint the same identifier.
pub struct KeyRotationService {
    key_store: Arc<KeyStore>,
    metadata_store: Arc<KeyMetadataStore>,
    engine: Arc<dyn CryptoEngine>,
    clock: Arc<dyn Clock>,
    policy: RotationPolicy,
    rotation_locks: IdentifierLocks,
}

impl KeyRotationService {
    pub fn new(
        key_store: Arc<KeyStore>,
        metadata_store: Arc<KeyMetadataStore>,
        engine: Arc<dyn CryptoEngine>,
        clock: Arc<dyn Clock>,
        policy: RotationPolicy,
    ) -> Self {
        Self {
            key_store,
            metadata_store,
            engine,
            clock,
            policy,
            rotation_locks: IdentifierLocks::new(),
        }
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Rotate `{base}_v{N}` to the next free version and return its identifier.
    ///
    /// The new key has the same length as the old one and inherits its
    /// algorithm, purpose and attributes. The old key is not touched.
    ///
    /// # Errors
    ///
    /// * `KeyNotFound` if `identifier` has no key or no metadata
    /// * `InvalidKeyIdentifier` if `identifier` is not of the versioned form
    pub async fn rotate_key(&self, identifier: &str) -> CryptoResult<String> {
        let (old_key, old_metadata) = self.resolve(identifier).await?;
        let current: VersionedKeyId = identifier.parse()?;

        let _guard = self.rotation_locks.lock(&current.base).await;

        let latest = self
            .stored_versions(&current.base)
            .await?
            .into_iter()
            .map(|id| id.version)
            .max()
            .unwrap_or(current.version)
            .max(current.version);
        let new_id = VersionedKeyId::new(current.base.clone(), latest).next()?.to_string();
        validate_key_identifier(&new_id)?;

        self.mint(&old_key, &old_metadata, &new_id).await?;
        log::info!("rotated key '{}' to '{}'", identifier, new_id);
        Ok(new_id)
    }

    /// Rotate to a freshly generated identifier tagged with the key's purpose.
    ///
    /// Works for any identifier, versioned or not.
    pub async fn rotate_key_with_purpose_id(&self, identifier: &str) -> CryptoResult<String> {
        let (old_key, old_metadata) = self.resolve(identifier).await?;

        let tag: String = old_metadata
            .purpose
            .chars()
            .map(|c| if c == ':' || c.is_control() { '-' } else { c })
            .take(100)
            .collect();
        let new_id = format!("{}_{}", tag, uuid::Uuid::new_v4().simple());
        validate_key_identifier(&new_id)?;

        self.mint(&old_key, &old_metadata, &new_id).await?;
        log::info!("rotated key '{}' to '{}'", identifier, new_id);
        Ok(new_id)
    }

    /// Whether the key has reached its rotation period
    pub async fn should_rotate_key(&self, identifier: &str) -> CryptoResult<bool> {
        let metadata = self.require_metadata(identifier).await?;
        Ok(self.is_due(&metadata, self.clock.now()))
    }

    /// Whole days until rotation is due, rounded up; `None` once it is due
    pub async fn time_until_rotation(&self, identifier: &str) -> CryptoResult<Option<u64>> {
        let metadata = self.require_metadata(identifier).await?;
        Ok(self.days_remaining(&metadata, self.clock.now()))
    }

    /// Keys that are due and have not already been superseded by a rotation
    pub async fn keys_due_for_rotation(&self) -> CryptoResult<Vec<String>> {
        let all = self.metadata_store.get_all_key_metadata().await?;
        let superseded: HashSet<&str> = all.iter().filter_map(KeyMetadata::rotated_from).collect();
        let now = self.clock.now();

        Ok(all
            .iter()
            .filter(|metadata| !superseded.contains(metadata.id.as_str()))
            .filter(|metadata| self.is_due(metadata, now))
            .map(|metadata| metadata.id.clone())
            .collect())
    }

    pub async fn key_age_summary(&self, identifier: &str) -> CryptoResult<KeyAgeSummary> {
        let metadata = self.require_metadata(identifier).await?;
        Ok(self.summarize(&metadata, self.clock.now()))
    }

    /// Summaries for every key with metadata, sorted by identifier
    pub async fn all_key_age_summaries(&self) -> CryptoResult<Vec<KeyAgeSummary>> {
        let now = self.clock.now();
        Ok(self
            .metadata_store
            .get_all_key_metadata()
            .await?
            .iter()
            .map(|metadata| self.summarize(metadata, now))
            .collect())
    }

    /// Every stored version of `base`, oldest first
    pub async fn key_versions(&self, base: &str) -> CryptoResult<Vec<String>> {
        let mut versions = self.stored_versions(base).await?;
        versions.sort_by_key(|id| id.version);
        Ok(versions.iter().map(VersionedKeyId::to_string).collect())
    }

    fn period_for(&self, metadata: &KeyMetadata) -> u32 {
        metadata
            .rotation_period_days()
            .unwrap_or_else(|| self.policy.period_days())
    }

    fn is_due(&self, metadata: &KeyMetadata, now: DateTime<Utc>) -> bool {
        now - metadata.created_at >= Duration::days(i64::from(self.period_for(metadata)))
    }

    fn days_remaining(&self, metadata: &KeyMetadata, now: DateTime<Utc>) -> Option<u64> {
        let due_at = metadata.created_at + Duration::days(i64::from(self.period_for(metadata)));
        let remaining = due_at - now;
        if remaining <= Duration::zero() {
            return None;
        }

        let millis_per_day = SECONDS_PER_DAY * 1000;
        let days = (remaining.num_milliseconds() + millis_per_day - 1) / millis_per_day;
        Some(days.max(1) as u64)
    }

    fn summarize(&self, metadata: &KeyMetadata, now: DateTime<Utc>) -> KeyAgeSummary {
        KeyAgeSummary {
            id: metadata.id.clone(),
            purpose: metadata.purpose.clone(),
            algorithm: metadata.algorithm,
            created_at: metadata.created_at,
            age_days: (now - metadata.created_at).num_days(),
            rotation_period_days: self.period_for(metadata),
            rotation_due: self.is_due(metadata, now),
            days_until_rotation: self.days_remaining(metadata, now),
        }
    }

    async fn require_metadata(&self, identifier: &str) -> CryptoResult<KeyMetadata> {
        self.metadata_store
            .get_key_metadata(identifier)
            .await?
            .ok_or_else(|| CryptoError::key_not_found(identifier))
    }

    async fn resolve(&self, identifier: &str) -> CryptoResult<(SecureBytes, KeyMetadata)> {
        validate_key_identifier(identifier)?;

        let _pair = self.key_store.lock_pair(identifier).await;
        let key = self
            .key_store
            .get_key(identifier)
            .await?
            .ok_or_else(|| CryptoError::key_not_found(identifier))?;

        let metadata = match self.metadata_store.get_key_metadata(identifier).await? {
            Some(metadata) => metadata,
            None => {
                log::warn!("key '{}' has no metadata and cannot be rotated", identifier);
                return Err(CryptoError::key_not_found(identifier));
            }
        };
        Ok((key, metadata))
    }

    async fn stored_versions(&self, base: &str) -> CryptoResult<Vec<VersionedKeyId>> {
        Ok(self
            .key_store
            .list_key_identifiers()
            .await?
            .iter()
            .filter_map(|id| id.parse::<VersionedKeyId>().ok())
            .filter(|id| id.base == base)
            .collect())
    }

    async fn mint(
        &self,
        old_key: &SecureBytes,
        old_metadata: &KeyMetadata,
        new_id: &str,
    ) -> CryptoResult<()> {
        let new_key = SecureBytes::from(self.engine.generate_random_bytes(old_key.len())?);

        let mut metadata = KeyMetadata {
            id: new_id.to_string(),
            algorithm: old_metadata.algorithm,
            key_size_bits: old_metadata.key_size_bits,
            purpose: old_metadata.purpose.clone(),
            created_at: self.clock.now(),
            attributes: old_metadata.attributes.clone(),
        };
        metadata
            .attributes
            .insert(ATTR_ROTATED_FROM.to_string(), old_metadata.id.clone());

        persist_new_key(&self.key_store, &self.metadata_store, &new_key, &metadata).await
    }
}
