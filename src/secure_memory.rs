//! Secure Memory Handling for Key Material
//!
//! Raw key bytes are held in [`SecureBytes`], which zeroes its buffer when
//! dropped, never prints its contents, and compares in constant time.
//! Every component that holds key material in memory (the key store, the
//! rotation service, the encrypted file backend, the token signer) owns it
//! through this type.

use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A container for sensitive bytes that is zeroed when dropped.
///
/// # Security Properties
///
/// 1. Automatically zeroes memory when dropped
/// 2. `Debug` output is redacted so contents cannot be logged by accident
/// 3. Equality is evaluated in constant time
/// 4. Clones zeroize independently
///
/// # Example
///
/// ```
/// use umbra_crypto::secure_memory::SecureBytes;
///
/// let key = SecureBytes::new(&[0x01, 0x02, 0x03, 0x04]);
/// assert_eq!(key.len(), 4);
/// assert_eq!(format!("{:?}", key), "SecureBytes([REDACTED; 4 bytes])");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes {
    bytes: Vec<u8>,
}

impl SecureBytes {
    /// Create a new SecureBytes holding a copy of `data`
    pub fn new(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
        }
    }

    /// Create a zero-filled buffer of `len` bytes, to be written in place
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    /// Get a reference to the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get a mutable reference to the underlying bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Consume the container and return the contained bytes.
    ///
    /// After calling this the caller is responsible for zeroizing the vector.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Get the current length of the buffer in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the material in bits
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {} bytes])", self.bytes.len())
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.len() == other.bytes.len() && bool::from(self.bytes.ct_eq(&other.bytes))
    }
}

impl Eq for SecureBytes {}

impl From<Vec<u8>> for SecureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for SecureBytes {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_bytes() {
        let data = [1u8, 2, 3, 4, 5];
        let bytes = SecureBytes::new(&data);

        assert_eq!(bytes.as_bytes(), &data);
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes.bit_len(), 40);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_debug_is_redacted() {
        let bytes = SecureBytes::new(b"super secret key material");
        let rendered = format!("{:?}", bytes);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_zeroize_clears_contents() {
        let mut bytes = SecureBytes::new(&[0xAA; 16]);
        bytes.zeroize();
        assert!(bytes.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_constant_time_equality() {
        let a = SecureBytes::new(&[1, 2, 3]);
        let b = SecureBytes::new(&[1, 2, 3]);
        let c = SecureBytes::new(&[1, 2, 4]);
        let d = SecureBytes::new(&[1, 2]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_into_vec_moves_contents() {
        let bytes = SecureBytes::from(vec![9u8; 8]);
        let mut raw = bytes.into_vec();
        assert_eq!(raw, vec![9u8; 8]);
        raw.zeroize();
    }
}
