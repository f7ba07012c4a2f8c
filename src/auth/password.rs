// Password hashing: KDF configuration, the `$`-delimited encoded form, and
// hashing/verification

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::utils;

const ARGON2_VERSION: u32 = 19;
const MIN_SALT_LEN: usize = 16;
const MIN_PARSED_SALT_LEN: usize = 8;
const MIN_DIGEST_LEN: usize = 16;
const MAX_DIGEST_LEN: usize = 64;

/// Upper bounds on cost parameters, both for configuration and for stored
/// hashes. A stored hash above them is rejected before any derivation runs.
pub const MAX_ARGON2_MEMORY_KIB: u32 = 4 * 1024 * 1024; // 4 GiB
pub const MAX_ARGON2_TIME_COST: u32 = 64;
pub const MAX_ARGON2_PARALLELISM: u32 = 64;
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Key derivation function used for password hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasswordAlgorithm {
    #[serde(rename = "argon2id")]
    Argon2id,
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256,
}

impl PasswordAlgorithm {
    /// Tag used in the encoded form
    pub fn tag(&self) -> &'static str {
        match self {
            PasswordAlgorithm::Argon2id => "argon2id",
            PasswordAlgorithm::Pbkdf2Sha256 => "pbkdf2-sha256",
        }
    }
}

impl fmt::Display for PasswordAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost (in KiB)
    pub memory_cost_kib: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Parameters for password hashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordHashingConfig {
    pub algorithm: PasswordAlgorithm,
    pub argon2: Argon2Params,
    pub pbkdf2_iterations: u32,
    /// Salt length in bytes (at least 16)
    pub salt_len: usize,
    /// Digest length in bytes
    pub output_len: usize,
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self {
            algorithm: PasswordAlgorithm::Argon2id,
            argon2: Argon2Params::default(),
            pbkdf2_iterations: 310_000,
            salt_len: 16,
            output_len: 32,
        }
    }
}

impl PasswordHashingConfig {
    /// Low-resource mode for constrained environments
    pub fn low_resource() -> Self {
        Self {
            argon2: Argon2Params {
                memory_cost_kib: 19456, // 19 MiB
                time_cost: 2,
                parallelism: 1,
            },
            ..Self::default()
        }
    }

    /// High-security mode for sensitive deployments
    pub fn high_security() -> Self {
        Self {
            argon2: Argon2Params {
                memory_cost_kib: 262144, // 256 MiB
                time_cost: 4,
                parallelism: 8,
            },
            pbkdf2_iterations: 600_000,
            salt_len: 32,
            ..Self::default()
        }
    }

    /// The KDF parameters new hashes are produced with
    pub fn kdf_params(&self) -> KdfParams {
        match self.algorithm {
            PasswordAlgorithm::Argon2id => KdfParams::Argon2id(self.argon2),
            PasswordAlgorithm::Pbkdf2Sha256 => KdfParams::Pbkdf2Sha256 {
                iterations: self.pbkdf2_iterations,
            },
        }
    }

    pub fn validate(&self) -> CryptoResult<()> {
        if self.salt_len < MIN_SALT_LEN {
            return Err(CryptoError::configuration(
                "password.salt_len",
                "must be at least 16 bytes",
            ));
        }
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&self.output_len) {
            return Err(CryptoError::configuration(
                "password.output_len",
                "must be between 16 and 64 bytes",
            ));
        }
        if self.pbkdf2_iterations == 0 || self.pbkdf2_iterations > MAX_PBKDF2_ITERATIONS {
            return Err(CryptoError::configuration(
                "password.pbkdf2_iterations",
                "must be between 1 and 10000000",
            ));
        }
        if self.argon2.memory_cost_kib > MAX_ARGON2_MEMORY_KIB
            || self.argon2.time_cost > MAX_ARGON2_TIME_COST
            || self.argon2.parallelism > MAX_ARGON2_PARALLELISM
        {
            return Err(CryptoError::configuration(
                "password.argon2",
                "memory at most 4 GiB, time cost and parallelism at most 64",
            ));
        }
        argon2_params(&self.argon2, self.output_len)
            .map_err(|e| CryptoError::configuration("password.argon2", &e.to_string()))?;
        Ok(())
    }
}

fn argon2_params(params: &Argon2Params, output_len: usize) -> Result<Params, argon2::Error> {
    Params::new(
        params.memory_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(output_len),
    )
}

/// KDF with the parameters a hash was produced under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Argon2id(Argon2Params),
    Pbkdf2Sha256 { iterations: u32 },
}

impl KdfParams {
    pub fn algorithm(&self) -> PasswordAlgorithm {
        match self {
            KdfParams::Argon2id(_) => PasswordAlgorithm::Argon2id,
            KdfParams::Pbkdf2Sha256 { .. } => PasswordAlgorithm::Pbkdf2Sha256,
        }
    }
}

/// A stored password hash.
///
/// Encoded as
///
/// ```text
/// $argon2id$v=19$m=<KiB>$t=<iterations>$p=<lanes>$<salt>$<digest>
/// $pbkdf2-sha256$i=<iterations>$<salt>$<digest>
/// ```
///
/// with salt and digest in standard base64 without padding. Parsing is
/// strict: fields must appear in this order, numbers must be canonical, and
/// anything else is `InvalidHashFormat`. A parsed value re-serializes to the
/// exact input string.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedHash {
    params: KdfParams,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl EncodedHash {
    pub fn new(params: KdfParams, salt: Vec<u8>, digest: Vec<u8>) -> Self {
        Self {
            params,
            salt,
            digest,
        }
    }

    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let fields: Vec<&str> = encoded.split('$').collect();
        if fields.len() < 2 || !fields[0].is_empty() {
            return Err(CryptoError::invalid_hash_format("must start with '$'"));
        }

        let (params, salt, digest) = match fields[1] {
            "argon2id" => {
                if fields.len() != 8 {
                    return Err(CryptoError::invalid_hash_format(
                        "argon2id hashes have exactly 7 fields",
                    ));
                }
                let version = parse_param(fields[2], "v", u32::MAX)?;
                if version != ARGON2_VERSION {
                    return Err(CryptoError::invalid_hash_format("unsupported argon2 version"));
                }
                let params = Argon2Params {
                    memory_cost_kib: parse_param(fields[3], "m", MAX_ARGON2_MEMORY_KIB)?,
                    time_cost: parse_param(fields[4], "t", MAX_ARGON2_TIME_COST)?,
                    parallelism: parse_param(fields[5], "p", MAX_ARGON2_PARALLELISM)?,
                };
                (KdfParams::Argon2id(params), fields[6], fields[7])
            }
            "pbkdf2-sha256" => {
                if fields.len() != 5 {
                    return Err(CryptoError::invalid_hash_format(
                        "pbkdf2-sha256 hashes have exactly 4 fields",
                    ));
                }
                let iterations = parse_param(fields[2], "i", MAX_PBKDF2_ITERATIONS)?;
                (KdfParams::Pbkdf2Sha256 { iterations }, fields[3], fields[4])
            }
            _ => return Err(CryptoError::invalid_hash_format("unknown algorithm tag")),
        };

        let salt = decode_b64(salt, "salt")?;
        let digest = decode_b64(digest, "digest")?;
        if salt.len() < MIN_PARSED_SALT_LEN {
            return Err(CryptoError::invalid_hash_format("salt too short"));
        }
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&digest.len()) {
            return Err(CryptoError::invalid_hash_format("digest length out of range"));
        }

        Ok(Self::new(params, salt, digest))
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn algorithm(&self) -> PasswordAlgorithm {
        self.params.algorithm()
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn digest_len(&self) -> usize {
        self.digest.len()
    }
}

fn parse_param(field: &str, name: &str, max: u32) -> CryptoResult<u32> {
    let value = field
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| CryptoError::invalid_hash_format(&format!("expected parameter '{}'", name)))?;

    let canonical = !value.is_empty()
        && value.bytes().all(|b| b.is_ascii_digit())
        && !(value.len() > 1 && value.starts_with('0'));
    if !canonical {
        return Err(CryptoError::invalid_hash_format(&format!(
            "parameter '{}' is not a canonical number",
            name
        )));
    }

    match value.parse::<u32>() {
        Ok(0) => Err(CryptoError::invalid_hash_format(&format!(
            "parameter '{}' must be positive",
            name
        ))),
        Ok(number) if number <= max => Ok(number),
        _ => Err(CryptoError::invalid_hash_format(&format!(
            "parameter '{}' out of range",
            name
        ))),
    }
}

fn decode_b64(field: &str, name: &str) -> CryptoResult<Vec<u8>> {
    let bytes = base64::decode_config(field, base64::STANDARD_NO_PAD)
        .map_err(|_| CryptoError::invalid_hash_format(&format!("{} is not valid base64", name)))?;
    // Reject non-canonical encodings so parse -> display is lossless
    if base64::encode_config(&bytes, base64::STANDARD_NO_PAD) != field {
        return Err(CryptoError::invalid_hash_format(&format!(
            "{} is not canonical base64",
            name
        )));
    }
    Ok(bytes)
}

impl fmt::Display for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            KdfParams::Argon2id(p) => write!(
                f,
                "$argon2id$v={}$m={}$t={}$p={}",
                ARGON2_VERSION, p.memory_cost_kib, p.time_cost, p.parallelism
            )?,
            KdfParams::Pbkdf2Sha256 { iterations } => {
                write!(f, "$pbkdf2-sha256$i={}", iterations)?
            }
        }
        write!(
            f,
            "${}${}",
            base64::encode_config(&self.salt, base64::STANDARD_NO_PAD),
            base64::encode_config(&self.digest, base64::STANDARD_NO_PAD)
        )
    }
}

impl fmt::Debug for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedHash")
            .field("params", &self.params)
            .field("salt_len", &self.salt.len())
            .field("digest_len", &self.digest.len())
            .finish()
    }
}

impl FromStr for EncodedHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Hashes and verifies passwords under a [`PasswordHashingConfig`]
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    config: PasswordHashingConfig,
}

impl PasswordHasher {
    pub fn new(config: PasswordHashingConfig) -> CryptoResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PasswordHashingConfig {
        &self.config
    }

    /// Hash `password` under a fresh random salt
    pub fn hash_password(&self, password: &str) -> CryptoResult<EncodedHash> {
        if password.is_empty() {
            return Err(CryptoError::invalid_parameter(
                "password",
                "a non-empty password",
                "empty",
            ));
        }

        let salt = utils::random_bytes(self.config.salt_len)?;
        let params = self.config.kdf_params();
        let digest = derive(&params, password.as_bytes(), &salt, self.config.output_len)?;
        Ok(EncodedHash::new(params, salt, digest.to_vec()))
    }

    /// Check `password` against a stored encoded hash.
    ///
    /// The digest is recomputed under the stored parameters and compared in
    /// constant time.
    pub fn verify_password(&self, password: &str, encoded: &str) -> CryptoResult<bool> {
        let stored = EncodedHash::parse(encoded)?;
        self.verify_parsed(password, &stored)
    }

    pub fn verify_parsed(&self, password: &str, stored: &EncodedHash) -> CryptoResult<bool> {
        let candidate = derive(
            &stored.params,
            password.as_bytes(),
            &stored.salt,
            stored.digest.len(),
        )?;
        Ok(utils::constant_time_eq(&candidate, &stored.digest))
    }

    /// Whether `stored` was produced with different parameters than the
    /// current configuration and should be replaced on next successful login
    pub fn needs_rehash(&self, stored: &EncodedHash) -> bool {
        stored.params != self.config.kdf_params()
            || stored.digest.len() != self.config.output_len
            || stored.salt.len() < self.config.salt_len
    }
}

fn derive(
    params: &KdfParams,
    password: &[u8],
    salt: &[u8],
    output_len: usize,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut output = Zeroizing::new(vec![0u8; output_len]);

    match params {
        KdfParams::Argon2id(p) => {
            let params = argon2_params(p, output_len)
                .map_err(|e| CryptoError::invalid_hash_format(&format!("argon2 parameters: {}", e)))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password_into(password, salt, &mut output)
                .map_err(|e| CryptoError::HashingFailed {
                    algorithm: PasswordAlgorithm::Argon2id.to_string(),
                    cause: e.to_string(),
                })?;
        }
        KdfParams::Pbkdf2Sha256 { iterations } => {
            let iterations = NonZeroU32::new(*iterations)
                .ok_or_else(|| CryptoError::invalid_hash_format("iterations must be positive"))?;
            pbkdf2::derive(
                pbkdf2::PBKDF2_HMAC_SHA256,
                iterations,
                salt,
                password,
                &mut output,
            );
        }
    }

    Ok(output)
}
