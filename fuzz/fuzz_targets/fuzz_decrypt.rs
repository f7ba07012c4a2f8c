#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use umbra_crypto::engine::{CryptoEngine, EncryptionAlgorithm, SoftwareCryptoEngine};
use umbra_crypto::CryptoError;

#[derive(Arbitrary, Debug)]
struct DecryptInput {
    algorithm: u8,
    key: Vec<u8>,
    iv: Option<Vec<u8>>,
    aad: Option<Vec<u8>>,
    blob: Vec<u8>,
    plaintext: Vec<u8>,
    flip: Option<(usize, u8)>,
}

fuzz_target!(|input: DecryptInput| {
    let algorithm = EncryptionAlgorithm::ALL[input.algorithm as usize % EncryptionAlgorithm::ALL.len()];
    let engine = SoftwareCryptoEngine::new();

    // Arbitrary input must be rejected cleanly, never panic
    let _ = engine.decrypt(
        &input.blob,
        &input.key,
        input.iv.as_deref(),
        algorithm,
        input.aad.as_deref(),
    );

    // With a well-sized key, sealed data must open and any change must be detected
    let mut key = input.key.clone();
    key.resize(algorithm.key_size_bytes(), 0);
    let aad = if algorithm.is_authenticated() {
        input.aad.as_deref()
    } else {
        None
    };

    let mut sealed = match engine.encrypt(&input.plaintext, &key, None, algorithm, aad) {
        Ok(sealed) => sealed,
        Err(_) => return,
    };
    let opened = engine
        .decrypt(&sealed, &key, None, algorithm, aad)
        .expect("sealed data must open");
    assert_eq!(opened, input.plaintext);

    if let Some((position, mask)) = input.flip {
        if mask != 0 && algorithm.is_authenticated() {
            let index = position % sealed.len();
            sealed[index] ^= mask;
            match engine.decrypt(&sealed, &key, None, algorithm, aad) {
                Err(CryptoError::DecryptionFailed { .. }) => {}
                other => panic!("tampering went undetected: {:?}", other.map(|p| p.len())),
            }
        }
    }
});
