//! Content fingerprints used to detect drift between a worker's copy of a
//! managed file and the server's copy.
//!
//! A fingerprint is a SHA-256 digest of the raw bytes, rendered as lowercase
//! hex on the wire. It is only an equality proxy; nothing here relies on it
//! for security. A missing file is fingerprinted as empty content so that
//! "absent" and "empty" compare equal.

use std::fmt;

use sha2::{Digest, Sha256};

/// Digest of a file's contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Compare against a fingerprint reported over the wire.
    pub fn matches(&self, reported: &str) -> bool {
        self.to_hex().eq_ignore_ascii_case(reported)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Fingerprint a byte slice. Total and deterministic.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint(Sha256::digest(bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_fingerprint() {
        let a = fingerprint(b"10.0.0.1 honeypot\n");
        let b = fingerprint(b"10.0.0.1 honeypot\n");
        assert_eq!(a, b);
        assert_ne!(a, fingerprint(b"10.0.0.2 honeypot\n"));
    }

    #[test]
    fn empty_content_has_known_digest() {
        assert_eq!(
            fingerprint(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn matches_is_case_insensitive() {
        let fp = fingerprint(b"new");
        assert!(fp.matches(&fp.to_hex().to_uppercase()));
        assert!(!fp.matches(""));
    }
}
