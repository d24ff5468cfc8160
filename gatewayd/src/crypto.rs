//! Cryptographic utilities for proxy API key generation.

use base64::{engine::general_purpose, Engine as _};
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Generates a proxy API key with 256 bits of entropy: `sk-proxy-{base64url}`.
///
/// Keys are stored hashed (see [`crate::db::models::api_key`]); only the
/// caller ever sees the plaintext value returned here.
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; 32];
    thread_rng().fill(&mut key_bytes);
    format!("sk-proxy-{}", general_purpose::URL_SAFE_NO_PAD.encode(key_bytes))
}

/// Hashes an API key for storage/lookup. SHA-256 is sufficient here, unlike
/// for passwords, because the key itself already carries 256 bits of
/// entropy; there's no low-entropy secret for a slow KDF to protect against
/// brute force.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_key_has_expected_prefix_and_alphabet() {
        let key = generate_api_key();
        assert!(key.starts_with("sk-proxy-"));
        let body = &key["sk-proxy-".len()..];
        assert!(body.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!body.contains('='));
    }

    #[test]
    fn generated_keys_are_unique() {
        let mut keys = HashSet::new();
        for _ in 0..1000 {
            assert!(keys.insert(generate_api_key()), "generated duplicate API key");
        }
    }

    #[test]
    fn hash_is_deterministic_and_distinguishes_keys() {
        let key = generate_api_key();
        assert_eq!(hash_api_key(&key), hash_api_key(&key));
        assert_ne!(hash_api_key(&key), hash_api_key(&generate_api_key()));
    }
}
