//! Artifact storage for card payloads.
//!
//! The registry only talks to storage through [`ArtifactStorage`], so the
//! backend is chosen when the registry is opened and injected into it.
//! Remote paths are `/`-separated and relative to the backend's root:
//!
//! ```text
//! {table}/{repository}/{name}/v{version}/{artifact}.{suffix}
//! ```

mod content_address;
mod local;
mod memory;

pub use content_address::ContentAddress;
pub use local::LocalStorage;
pub use memory::MemoryStorage;

use crate::error::{CardexError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Byte-blob storage addressed by relative path.
pub trait ArtifactStorage: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Write bytes at `remote_path`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    fn put(&self, bytes: &[u8], remote_path: &str) -> Result<String>;

    /// Read the bytes stored at `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if nothing is stored there.
    fn get(&self, remote_path: &str) -> Result<Vec<u8>>;

    /// Check whether a file or directory exists at `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the backend fails.
    fn exists(&self, remote_path: &str) -> Result<bool>;

    /// Remove a file, or a whole tree when `remote_path` is a directory.
    /// Returns `false` if nothing was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or deletion fails.
    fn remove(&self, remote_path: &str) -> Result<bool>;

    /// List files at or below `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Total size of all stored bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn total_size(&self) -> Result<u64>;

    /// Upload a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the write fails.
    fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        let data = fs::read(local_path)?;
        self.put(&data, remote_path)
    }

    /// Download to a local file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or the local write fails.
    fn download(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf> {
        let data = self.get(remote_path)?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local_path, data)?;
        Ok(local_path.to_path_buf())
    }
}

/// Reject empty, absolute, and `.`/`..` paths; trim surrounding slashes.
pub(crate) fn clean_remote_path(remote_path: &str) -> Result<&str> {
    let trimmed = remote_path.trim_matches('/');
    let invalid = remote_path.starts_with('/')
        || trimmed
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(CardexError::storage(remote_path, "invalid remote path"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_remote_path() {
        assert_eq!(clean_remote_path("a/b/c.bin").unwrap(), "a/b/c.bin");
        assert_eq!(clean_remote_path("a/b/").unwrap(), "a/b");
        assert!(clean_remote_path("").is_err());
        assert!(clean_remote_path("/etc/passwd").is_err());
        assert!(clean_remote_path("a/../b").is_err());
        assert!(clean_remote_path("a//b").is_err());
    }
}
