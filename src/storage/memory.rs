//! In-memory artifact storage, for tests and ephemeral registries.

use super::{clean_remote_path, ArtifactStorage};
use crate::error::{CardexError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Artifact storage held in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

fn under(key: &str, dir: &str) -> bool {
    key == dir || (key.starts_with(dir) && key.as_bytes().get(dir.len()) == Some(&b'/'))
}

impl ArtifactStorage for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn put(&self, bytes: &[u8], remote_path: &str) -> Result<String> {
        let key = clean_remote_path(remote_path)?.to_string();
        self.objects.write().insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    fn get(&self, remote_path: &str) -> Result<Vec<u8>> {
        let key = clean_remote_path(remote_path)?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CardexError::not_found("artifact", remote_path))
    }

    fn exists(&self, remote_path: &str) -> Result<bool> {
        let key = clean_remote_path(remote_path)?;
        Ok(self.objects.read().keys().any(|k| under(k, key)))
    }

    fn remove(&self, remote_path: &str) -> Result<bool> {
        let key = clean_remote_path(remote_path)?;
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|k, _| !under(k, key));
        Ok(objects.len() != before)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read();
        if prefix.trim_matches('/').is_empty() {
            return Ok(objects.keys().cloned().collect());
        }
        let key = clean_remote_path(prefix)?;
        Ok(objects.keys().filter(|k| under(k, key)).cloned().collect())
    }

    fn total_size(&self) -> Result<u64> {
        Ok(self.objects.read().values().map(|v| v.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_list() {
        let storage = MemoryStorage::new();
        storage.put(b"abc", "t/r/n/v1.0.0/a.bin").unwrap();
        storage.put(b"de", "t/r/n/v1.0.0/b.bin").unwrap();
        storage.put(b"f", "t/r/n/v1.0.10/a.bin").unwrap();

        assert_eq!(storage.get("t/r/n/v1.0.0/a.bin").unwrap(), b"abc");
        assert_eq!(
            storage.list("t/r/n/v1.0.0").unwrap(),
            vec!["t/r/n/v1.0.0/a.bin", "t/r/n/v1.0.0/b.bin"]
        );
        assert_eq!(storage.total_size().unwrap(), 6);
    }

    #[test]
    fn test_remove_prefix_does_not_touch_siblings() {
        let storage = MemoryStorage::new();
        storage.put(b"1", "t/v1.0.0/a.bin").unwrap();
        storage.put(b"2", "t/v1.0.0-rc.1/a.bin").unwrap();

        assert!(storage.remove("t/v1.0.0").unwrap());
        assert!(!storage.remove("t/v1.0.0").unwrap());
        assert!(storage.exists("t/v1.0.0-rc.1").unwrap());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get("x.bin").unwrap_err(),
            CardexError::NotFound { .. }
        ));
        assert!(storage.is_empty());
    }
}
