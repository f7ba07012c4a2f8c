use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;

/// Generate random bytes of the specified length from the operating system CSPRNG.
///
/// There is no fallback generator: if the OS source fails, the call fails with
/// `RandomGenerationFailed`.
pub fn random_bytes(length: usize) -> CryptoResult<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RandomGenerationFailed {
            cause: e.to_string(),
        })?;
    Ok(bytes)
}

/// Generate random key material of the specified length
pub fn random_secure_bytes(length: usize) -> CryptoResult<SecureBytes> {
    let mut bytes = SecureBytes::zeroed(length);
    OsRng
        .try_fill_bytes(bytes.as_bytes_mut())
        .map_err(|e| CryptoError::RandomGenerationFailed {
            cause: e.to_string(),
        })?;
    Ok(bytes)
}

/// Constant-time comparison of two byte slices to avoid timing attacks
///
/// Slices of different length compare unequal; the length itself is not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Convert bytes to a lowercase hexadecimal string
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Convert a hexadecimal string to bytes
pub fn from_hex(hex_str: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| {
        CryptoError::invalid_parameter("hex", "an even-length hexadecimal string", &e.to_string())
    })
}

/// Short, non-reversible fingerprint of a secret value, safe to put in logs
pub fn log_fingerprint(secret: &[u8]) -> String {
    let digest = Sha256::digest(secret);
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1 = random_bytes(32).unwrap();
        let bytes2 = random_bytes(32).unwrap();

        assert_eq!(bytes1.len(), 32);
        assert_eq!(bytes2.len(), 32);
        // Two random byte arrays should be different
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_random_bytes_zero_length() {
        assert!(random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_random_secure_bytes() {
        let key = random_secure_bytes(32).unwrap();
        assert_eq!(key.len(), 32);
        assert!(key.as_bytes().iter().any(|b| *b != 0));
    }

    #[test]
    fn test_constant_time_eq() {
        let a = [1, 2, 3, 4];
        let b = [1, 2, 3, 4];
        let c = [1, 2, 3, 5];
        let d = [1, 2, 3];

        assert!(constant_time_eq(&a, &b));
        assert!(!constant_time_eq(&a, &c));
        assert!(!constant_time_eq(&a, &d));
    }

    #[test]
    fn test_hex_conversion() {
        let data = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let hex = to_hex(&data);
        assert_eq!(hex, "0123456789abcdef");

        let bytes = from_hex(&hex).unwrap();
        assert_eq!(bytes, data);
        assert!(from_hex("abc").is_err());
    }

    #[test]
    fn test_log_fingerprint_is_short_and_stable() {
        let a = log_fingerprint(b"token-value");
        let b = log_fingerprint(b"token-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, log_fingerprint(b"other-token"));
    }
}
