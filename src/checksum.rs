//! Content hashes for schema payloads and digests for descriptor bundles

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// 128-bit content hash of a schema payload.
///
/// Non-cryptographic: it identifies a payload inside the schema caches and is
/// never used for integrity. Two distinct schemas that share a name and
/// collide on this hash would be confused with each other; that risk is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(u128);

impl ContentHash {
    /// Hash raw payload bytes
    pub fn of(payload: &[u8]) -> Self {
        Self(xxh3_128(payload))
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// SHA256 digest over every descriptor resource a registry loaded.
///
/// Logged when the catalog is built so that callers and evaluators running
/// different descriptor bundles can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleDigest(String);

impl BundleDigest {
    /// Digest a sequence of resources in discovery order
    pub fn of<'a>(resources: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        for resource in resources {
            hasher.update((resource.len() as u64).to_be_bytes());
            hasher.update(resource);
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_consistency() {
        let payload = b"\x01\x0bexample.Foo";
        assert_eq!(ContentHash::of(payload), ContentHash::of(payload));
    }

    #[test]
    fn test_content_hash_different_content() {
        assert_ne!(ContentHash::of(b"one"), ContentHash::of(b"two"));
    }

    #[test]
    fn test_content_hash_display() {
        let hash = ContentHash::of(b"payload");
        assert_eq!(ContentHash::from_u128(hash.as_u128()), hash);
        assert_eq!(hash.to_string().len(), 32);
        assert_eq!(ContentHash::from_u128(0xab).to_string(), format!("{:032x}", 0xab));
    }

    #[test]
    fn test_bundle_digest_is_order_sensitive() {
        let a: &[u8] = b"first";
        let b: &[u8] = b"second";
        assert_eq!(BundleDigest::of([a, b]), BundleDigest::of([a, b]));
        assert_ne!(BundleDigest::of([a, b]), BundleDigest::of([b, a]));
    }
}
