//! Content hashing for drift detection

use xxhash_rust::xxh3::xxh3_64;

/// Stable 16-hex-digit xxh3 hash of a text
pub fn content_hash(text: &str) -> String {
    content_hash_bytes(text.as_bytes())
}

/// Same digest over raw bytes; equal to [`content_hash`] for UTF-8 input
pub fn content_hash_bytes(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = content_hash("fetch(sourcepay)");
        assert_eq!(a, content_hash("fetch(sourcepay)"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, content_hash("fetch(sourcepay) "));
        assert_eq!(a, content_hash_bytes(b"fetch(sourcepay)"));
        assert_eq!(content_hash_bytes(b"caf\xe9").len(), 16);
    }
}
