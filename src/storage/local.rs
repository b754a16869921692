//! Filesystem artifact storage.

use super::{clean_remote_path, ArtifactStorage};
use crate::error::{CardexError, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".tmp";

/// Artifact storage rooted at a local directory.
///
/// ```text
/// artifacts/
/// └── model_registry/
///     └── risk/
///         └── fraud/
///             └── v1.0.0/
///                 └── model.onnx
/// ```
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create storage at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open existing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CardexError::NotInitialized(root));
        }
        Ok(Self { root })
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for a remote path.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote path is invalid.
    pub fn local_path(&self, remote_path: &str) -> Result<PathBuf> {
        let clean = clean_remote_path(remote_path)?;
        Ok(clean.split('/').fold(self.root.clone(), |p, part| p.join(part)))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect(&entry.path(), out)?;
            } else if file_type.is_file() && !is_temp(&entry.path()) {
                out.push(entry.path());
            }
        }
        Ok(())
    }

    fn remote_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        parts.map(|p| p.join("/"))
    }

    /// Drop empty directories between `path` and the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
}

impl ArtifactStorage for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn put(&self, bytes: &[u8], remote_path: &str) -> Result<String> {
        let path = self.local_path(remote_path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CardexError::storage(remote_path, "missing file name"))?;
        let temp_path = path.with_file_name(format!(".{file_name}{TEMP_SUFFIX}"));

        let write = || -> io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            {
                let mut writer = BufWriter::new(File::create(&temp_path)?);
                writer.write_all(bytes)?;
                writer.flush()?;
            }
            fs::rename(&temp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(CardexError::storage(remote_path, e));
        }

        tracing::trace!(target: "cardex::storage", path = %path.display(), size = bytes.len(), "Wrote artifact");
        Ok(clean_remote_path(remote_path)?.to_string())
    }

    fn get(&self, remote_path: &str) -> Result<Vec<u8>> {
        let path = self.local_path(remote_path)?;
        if !path.is_file() {
            return Err(CardexError::not_found("artifact", remote_path));
        }
        fs::read(&path).map_err(|e| CardexError::storage(remote_path, e))
    }

    fn exists(&self, remote_path: &str) -> Result<bool> {
        Ok(self.local_path(remote_path)?.exists())
    }

    fn remove(&self, remote_path: &str) -> Result<bool> {
        let path = self.local_path(remote_path)?;
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else if path.is_file() {
            fs::remove_file(&path)
        } else {
            return Ok(false);
        };
        removed.map_err(|e| CardexError::storage(remote_path, e))?;
        self.prune_empty_parents(&path);
        Ok(true)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = if prefix.trim_matches('/').is_empty() {
            self.root.clone()
        } else {
            self.local_path(prefix)?
        };

        let mut files = Vec::new();
        if start.is_file() {
            files.push(start);
        } else if start.is_dir() {
            self.collect(&start, &mut files)
                .map_err(|e| CardexError::storage(prefix, e))?;
        }

        let mut remote: Vec<String> = files.iter().filter_map(|p| self.remote_of(p)).collect();
        remote.sort();
        Ok(remote)
    }

    fn total_size(&self) -> Result<u64> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            self.collect(&self.root, &mut files)?;
        }
        let mut total = 0u64;
        for file in files {
            total += fs::metadata(file)?.len();
        }
        Ok(total)
    }
}
