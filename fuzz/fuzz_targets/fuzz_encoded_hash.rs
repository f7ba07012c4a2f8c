#![no_main]

use libfuzzer_sys::fuzz_target;
use umbra_crypto::auth::EncodedHash;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Whatever parses must print back to the exact input
    if let Ok(parsed) = EncodedHash::parse(text) {
        assert_eq!(parsed.to_string(), text);
        assert!(parsed.digest_len() > 0);
    }
});
