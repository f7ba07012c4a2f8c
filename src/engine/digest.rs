//! SHA-2 digests.

use sha2::{Digest, Sha256, Sha512};

use super::algorithm::HashAlgorithm;

pub(crate) fn digest(data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}
