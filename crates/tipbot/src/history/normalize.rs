//! Content normalization and fingerprinting for deduplication.
//!
//! Changing [`normalize`] silently breaks dedup against stored hashes, so any
//! change must bump [`NORMALIZATION_VERSION`]. Hashes are only ever compared
//! against rows of the same version.

use sha2::{Digest, Sha256};

/// Version of the rule implemented by [`normalize`].
pub const NORMALIZATION_VERSION: u32 = 1;

/// Trim, lowercase, and collapse every whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(normalize(text).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_case_and_whitespace() {
        assert_eq!(
            normalize("  Use   list\tcomprehensions\n\nFOR concise Python.  "),
            "use list comprehensions for concise python."
        );
    }

    #[test]
    fn test_normalize_unicode() {
        assert_eq!(normalize("ÄPFEL\u{3000}Über"), "äpfel über");
    }

    #[test]
    fn test_hash_is_normalization_invariant() {
        let a = content_hash("Use list comprehensions for concise Python.");
        let b = content_hash("use  LIST comprehensions\nfor concise python.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("Use generators for concise Python."));
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            content_hash("  ABC "),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
