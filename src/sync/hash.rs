//! Content hashing for change detection.
//!
//! Documents are fingerprinted with SHA256 over their exact bytes. No
//! normalization happens here: a single changed byte yields a new digest,
//! and the change marker in [`super::detect`] covers edits that the byte
//! hash cannot see.

use sha2::{Digest, Sha256};

/// Compute the hex SHA256 digest of a byte slice.
///
/// # Example
///
/// ```ignore
/// let hash = file_digest(b"# Title\n");
/// assert_eq!(hash.len(), 64);
/// ```
#[must_use]
pub fn file_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check if a document has changed since it was last synced.
///
/// Documents without a stored record are never compared; they are added.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: &str) -> bool {
    current_hash != stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_digest_deterministic() {
        let hash1 = file_digest(b"Article URL: https://example.com\n\n# Title\n");
        let hash2 = file_digest(b"Article URL: https://example.com\n\n# Title\n");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_file_digest_known_value() {
        assert_eq!(
            file_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_digest_sensitive_to_whitespace() {
        assert_ne!(file_digest(b"# Title\n"), file_digest(b"# Title\r\n"));
    }

    #[test]
    fn test_has_changed_different_hash() {
        assert!(has_changed("abc123", "xyz789"));
    }

    #[test]
    fn test_has_changed_same_hash() {
        assert!(!has_changed("abc123", "abc123"));
    }
}
