//! Enforcement PIN hashing.
//!
//! The PIN is stored as the unsalted SHA-256 hex digest of its UTF-8 bytes
//! under [`PIN_SETTING_KEY`].

use sha2::{Digest, Sha256};

/// Settings key holding the PIN digest.
pub const PIN_SETTING_KEY: &str = "pin_sha256";

/// Lowercase hex SHA-256 digest of `plain`.
pub fn hash_pin(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

/// Compares `plain` against a stored digest.
///
/// Fails closed: a missing or empty digest never matches. The comparison is a
/// case-sensitive string compare against the lowercase digest.
pub fn pin_matches(stored: Option<&str>, plain: &str) -> bool {
    match stored {
        Some(digest) if !digest.is_empty() => digest == hash_pin(plain),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_pin("1234"),
            "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4"
        );
        assert_eq!(hash_pin("1234").len(), 64);
    }

    #[test]
    fn verification_fails_closed_without_digest() {
        assert!(!pin_matches(None, "1234"));
        assert!(!pin_matches(Some(""), ""));
    }

    #[test]
    fn verification_matches_exact_digest() {
        let stored = hash_pin("1234");
        assert!(pin_matches(Some(&stored), "1234"));
        assert!(!pin_matches(Some(&stored), "4321"));
        assert!(!pin_matches(Some(&stored.to_uppercase()), "1234"));
    }
}
