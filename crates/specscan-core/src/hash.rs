//! Content hashing shared by datasheet producers and the datasheet cache

use sha2::{Digest, Sha256};

/// SHA-256 of `content` as lowercase hex
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(content.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_hash("abc"), content_hash(b"abc".to_vec()));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("x").len(), 64);
    }
}
