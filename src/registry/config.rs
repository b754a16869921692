//! Registry configuration.

use super::database::DEFAULT_LIST_LIMIT;
use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default registry location.
pub const HOME_ENV: &str = "CARDEX_HOME";

/// Configuration for a cardex registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Base path for the registry.
    pub base_path: PathBuf,
    /// Root directory for artifact storage.
    pub storage_root: PathBuf,
    /// Row cap for listings with no filter.
    pub default_list_limit: usize,
}

/// On-disk `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    storage_root: Option<PathBuf>,
    default_list_limit: Option<usize>,
}

impl RegistryConfig {
    /// Create a new config with the given base path.
    #[must_use]
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        Self {
            storage_root: base_path.join("artifacts"),
            base_path,
            default_list_limit: DEFAULT_LIST_LIMIT,
        }
    }

    /// Load config for `base_path`, applying `config.toml` if present.
    ///
    /// A relative `storage_root` is resolved against the base path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let mut config = Self::new(base_path);
        let path = config.config_path();
        if !path.exists() {
            return Ok(config);
        }

        let file: ConfigFile = toml::from_str(&fs::read_to_string(&path)?)?;
        if let Some(root) = file.storage_root {
            config.storage_root = if root.is_absolute() {
                root
            } else {
                config.base_path.join(root)
            };
        }
        if let Some(limit) = file.default_list_limit {
            config.default_list_limit = limit;
        }
        tracing::debug!(target: "cardex::config", path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Set the storage root.
    #[must_use]
    pub fn with_storage_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.storage_root = root.as_ref().to_path_buf();
        self
    }

    /// Set the default list limit.
    #[must_use]
    pub fn with_default_list_limit(mut self, limit: usize) -> Self {
        self.default_list_limit = limit;
        self
    }

    /// Get the database path.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("registry.db")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join("config.toml")
    }

    /// Default base path: `$CARDEX_HOME`, else `~/.cardex`.
    #[must_use]
    pub fn default_base_path() -> PathBuf {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        std::env::var("HOME")
            .map_or_else(|_| PathBuf::from("."), PathBuf::from)
            .join(".cardex")
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Self::default_base_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let config = RegistryConfig::new("/tmp/reg");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/reg/registry.db"));
        assert_eq!(config.storage_root, PathBuf::from("/tmp/reg/artifacts"));
        assert_eq!(config.config_path(), PathBuf::from("/tmp/reg/config.toml"));
        assert_eq!(config.default_list_limit, 25);
    }

    #[test]
    fn test_load_without_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            RegistryConfig::load(dir.path()).unwrap(),
            RegistryConfig::new(dir.path())
        );
    }

    #[test]
    fn test_load_with_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "storage_root = \"blobs\"\ndefault_list_limit = 10\n",
        )
        .unwrap();

        let config = RegistryConfig::load(dir.path()).unwrap();
        assert_eq!(config.storage_root, dir.path().join("blobs"));
        assert_eq!(config.default_list_limit, 10);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "storage = \"s3\"\n").unwrap();
        assert!(matches!(
            RegistryConfig::load(dir.path()).unwrap_err(),
            crate::error::CardexError::TomlDeserialize(_)
        ));
    }
}
