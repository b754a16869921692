//! Content addressing using BLAKE3 hashing.
//!
//! Every artifact written during registration is hashed; the address is kept
//! on the record so loads can detect tampered or truncated files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// BLAKE3 hash and size of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress {
    /// BLAKE3 hash of content (32 bytes), hex encoded on the wire.
    #[serde(with = "hex_hash")]
    hash: [u8; 32],
    /// Content size in bytes.
    size: u64,
}

impl ContentAddress {
    /// Create a content address from raw components.
    #[must_use]
    pub fn new(hash: [u8; 32], size: u64) -> Self {
        Self { hash, size }
    }

    /// Compute content address from bytes.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self {
            hash: *hash.as_bytes(),
            size: data.len() as u64,
        }
    }

    /// Compute content address from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(Self {
            hash: *hasher.finalize().as_bytes(),
            size,
        })
    }

    /// Get the hash as bytes.
    #[must_use]
    pub fn hash_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Get the hash as a hex string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        blake3::Hash::from(self.hash).to_hex().to_string()
    }

    /// Get the content size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Verify that data matches this content address.
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.size && *blake3::hash(data).as_bytes() == self.hash
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blake3:{}:{}", self.hash_hex(), self.size)
    }
}

mod hex_hash {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(hash: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(blake3::Hash::from(*hash).to_hex().as_str())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let hex = String::deserialize(d)?;
        blake3::Hash::from_hex(hex.as_str())
            .map(|h| *h.as_bytes())
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_content_address_from_bytes() {
        let addr = ContentAddress::from_bytes(b"hello world");

        assert_eq!(addr.size(), 11);
        // BLAKE3 hash of "hello world"
        assert_eq!(
            addr.hash_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_content_address_from_reader() {
        let cursor = std::io::Cursor::new(b"hello world");
        let addr = ContentAddress::from_reader(cursor).unwrap();
        assert_eq!(addr, ContentAddress::from_bytes(b"hello world"));
    }

    #[test]
    fn test_content_address_verify() {
        let addr = ContentAddress::from_bytes(b"hello world");

        assert!(addr.verify(b"hello world"));
        assert!(!addr.verify(b"hello world!"));
        assert!(!addr.verify(b"Hello world"));
    }

    #[test]
    fn test_display() {
        let display = ContentAddress::from_bytes(b"test").to_string();
        assert!(display.starts_with("blake3:"));
        assert!(display.ends_with(":4"));
    }

    #[test]
    fn test_serialization_uses_hex() {
        let addr = ContentAddress::from_bytes(b"test data");
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json["hash"], addr.hash_hex());
        let back: ContentAddress = serde_json::from_value(json).unwrap();
        assert_eq!(addr, back);
    }

    proptest! {
        #[test]
        fn prop_content_address_verify_self(data: Vec<u8>) {
            let addr = ContentAddress::from_bytes(&data);
            prop_assert!(addr.verify(&data));
            prop_assert_eq!(addr.size(), data.len() as u64);
        }

        #[test]
        fn prop_different_data_different_hash(data1: Vec<u8>, data2: Vec<u8>) {
            prop_assume!(data1 != data2);
            let addr1 = ContentAddress::from_bytes(&data1);
            let addr2 = ContentAddress::from_bytes(&data2);
            prop_assert_ne!(addr1.hash_bytes(), addr2.hash_bytes());
        }
    }
}
