//! Card registry: record store, artifact storage and the registration
//! transaction that ties them together.
//!
//! Registration moves through four states:
//!
//! ```text
//! Validating -> Allocating -> Persisting -> Committed
//!      \             \             \
//!       +-------------+-------------+----> Aborted
//! ```
//!
//! The record is inserted only after every artifact has been written, so a
//! storage failure never leaves a committed row behind.

mod config;
mod database;

pub use config::{RegistryConfig, HOME_ENV};
pub use database::{CardFilter, RegistryDb, DEFAULT_LIST_LIMIT};

use crate::card::{
    artifact_dir, normalize_identifier, Card, CardRecord, CardType, StoredArtifact,
};
use crate::error::{CardexError, Result};
use crate::storage::{ArtifactStorage, ContentAddress, LocalStorage};
use crate::version::{allocate, SemVer, VersionRequest};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Outcome of [`Registry::register_card`].
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// A new record was committed.
    Registered(CardRecord),
    /// The card already carried a uid and version; nothing was written.
    AlreadyRegistered,
}

impl Registration {
    /// The committed record, if one was written.
    #[must_use]
    pub fn record(&self) -> Option<&CardRecord> {
        match self {
            Self::Registered(record) => Some(record),
            Self::AlreadyRegistered => None,
        }
    }
}

/// Registration transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Normalizing and checking the card.
    Validating,
    /// Choosing the version.
    Allocating,
    /// Writing artifacts.
    Persisting,
    /// Record inserted.
    Committed,
    /// Failed; the error is returned to the caller.
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::Allocating => "allocating",
            Self::Persisting => "persisting",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Identity of a version line: card type, name, repository.
type LineKey = (CardType, String, String);

/// The card registry.
pub struct Registry {
    config: RegistryConfig,
    db: RegistryDb,
    storage: Box<dyn ArtifactStorage>,
    /// Serializes allocate-then-insert per version line.
    lines: Mutex<HashMap<LineKey, Arc<Mutex<()>>>>,
    /// Last timestamp handed out, in microseconds.
    clock: AtomicI64,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create or open a registry at the default location (`~/.cardex`).
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn open_default() -> Result<Self> {
        Self::open(RegistryConfig::load(RegistryConfig::default_base_path())?)
    }

    /// Create or open a registry with local artifact storage.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        let storage = LocalStorage::new(&config.storage_root)?;
        Self::with_storage(config, Box::new(storage))
    }

    /// Open a registry that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotInitialized`] if there is no database at the
    /// configured path.
    pub fn open_existing(config: RegistryConfig) -> Result<Self> {
        if !config.db_path().exists() {
            return Err(CardexError::NotInitialized(config.base_path));
        }
        let storage = LocalStorage::open(&config.storage_root)?;
        Self::with_storage(config, Box::new(storage))
    }

    /// Create or open a registry with an injected storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn with_storage(config: RegistryConfig, storage: Box<dyn ArtifactStorage>) -> Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        let db = RegistryDb::open(config.db_path())?.with_default_limit(config.default_list_limit);
        tracing::debug!(
            target: "cardex::registry",
            base = %config.base_path.display(),
            storage = storage.kind(),
            "Opened registry"
        );
        Ok(Self {
            config,
            db,
            storage,
            lines: Mutex::new(HashMap::new()),
            clock: AtomicI64::new(0),
        })
    }

    /// Get the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the artifact storage backend.
    #[must_use]
    pub fn storage(&self) -> &dyn ArtifactStorage {
        self.storage.as_ref()
    }

    // ==================== Registration ====================

    /// Register a card, assigning its version and uid.
    ///
    /// On success the card is updated in place with the assigned uid and
    /// version. A card that already carries both is left untouched and
    /// [`Registration::AlreadyRegistered`] is returned.
    ///
    /// # Errors
    ///
    /// Returns the first validation, allocation, storage or store error; no
    /// record is committed in that case.
    pub fn register_card(&self, card: &mut Card, request: &VersionRequest) -> Result<Registration> {
        if card.is_registered() {
            tracing::info!(
                target: "cardex::registry",
                card_type = %card.card_type,
                uid = card.uid.as_deref().unwrap_or_default(),
                "Card already registered, skipping"
            );
            return Ok(Registration::AlreadyRegistered);
        }

        let mut state = TransactionState::Validating;
        match self.register_inner(card, request, &mut state) {
            Ok(record) => Ok(Registration::Registered(record)),
            Err(e) => {
                tracing::warn!(
                    target: "cardex::registry",
                    card_type = %card.card_type,
                    name = %card.name,
                    repository = %card.repository,
                    failed_in = %state,
                    state = %TransactionState::Aborted,
                    error = %e,
                    "Registration aborted"
                );
                Err(e)
            }
        }
    }

    fn register_inner(
        &self,
        card: &mut Card,
        request: &VersionRequest,
        state: &mut TransactionState,
    ) -> Result<CardRecord> {
        let card_type = card.card_type;
        let (name, repository) = self.validate(card)?;

        *state = TransactionState::Allocating;
        log_state(card_type, &name, &repository, *state);
        self.with_line(card_type, &name, &repository, || {
            self.allocate_and_commit(card, request, state, &name, &repository)
        })
    }

    fn allocate_and_commit(
        &self,
        card: &mut Card,
        request: &VersionRequest,
        state: &mut TransactionState,
        name: &str,
        repository: &str,
    ) -> Result<CardRecord> {
        let card_type = card.card_type;
        let existing = self.db.get_versions(card_type, name, repository, None)?;
        let version = allocate(name, repository, request, card.version.as_ref(), &existing)?;

        *state = TransactionState::Persisting;
        log_state(card_type, name, repository, *state);
        let uid = card.uid.clone().unwrap_or_else(new_uid);
        let uri = artifact_dir(card_type, repository, name, &version);
        let artifacts = self.persist_artifacts(card, &uri)?;

        let record = CardRecord {
            uid,
            card_type,
            name: name.to_string(),
            repository: repository.to_string(),
            contact: card.contact.trim().to_string(),
            version,
            tags: card.tags.clone(),
            timestamp: self.next_timestamp(),
            details: card.details.clone(),
            uri,
            artifacts,
        };
        self.db.insert(&record)?;

        *state = TransactionState::Committed;
        record.apply_to(card);
        tracing::info!(
            target: "cardex::registry",
            card_type = %card_type,
            name = %record.name,
            repository = %record.repository,
            version = %record.version,
            uid = %record.uid,
            state = %state,
            "Registered card"
        );
        Ok(record)
    }

    /// Replace an existing record's metadata and artifacts in place.
    ///
    /// The uid, name, repository, version and insertion time are kept;
    /// artifacts are rewritten under the existing version directory and
    /// previously stored artifacts not supplied again are retained. An
    /// artifact supplied with a new suffix replaces its old file.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has the card's uid, and
    /// a validation error if the card has no uid or asks for another version.
    pub fn update_card(&self, card: &Card) -> Result<CardRecord> {
        let uid = card
            .uid
            .as_deref()
            .ok_or_else(|| CardexError::Validation("cannot update a card without a uid".to_string()))?;
        let existing = self.db.get(card.card_type, uid)?;
        if let Some(version) = card.version.as_ref().filter(|v| **v != existing.version) {
            return Err(CardexError::Validation(format!(
                "cannot change version of {uid} from {} to {version}",
                existing.version
            )));
        }
        self.validate_contents(card)?;

        let mut artifacts = existing.artifacts.clone();
        let mut replaced = Vec::new();
        for (name, stored) in self.persist_artifacts(card, &existing.uri)? {
            let path = stored.path.clone();
            if let Some(old) = artifacts.insert(name, stored) {
                if old.path != path {
                    replaced.push(old.path);
                }
            }
        }

        let record = CardRecord {
            contact: card.contact.trim().to_string(),
            tags: card.tags.clone(),
            details: card.details.clone(),
            artifacts,
            ..existing
        };
        self.db.update(&record)?;
        // Files renamed by a new suffix are no longer referenced.
        for path in &replaced {
            self.storage.remove(path)?;
        }
        tracing::info!(
            target: "cardex::registry",
            card_type = %record.card_type,
            uid = %record.uid,
            version = %record.version,
            replaced = replaced.len(),
            "Updated card"
        );
        Ok(record)
    }

    /// Normalize name and repository, then check the rest of the card.
    fn validate(&self, card: &mut Card) -> Result<(String, String)> {
        let name = normalize_identifier("name", &card.name)?;
        let repository = normalize_identifier("repository", &card.repository)?;
        card.name.clone_from(&name);
        card.repository.clone_from(&repository);
        self.validate_contents(card)?;
        log_state(card.card_type, &name, &repository, TransactionState::Validating);
        Ok((name, repository))
    }

    fn validate_contents(&self, card: &Card) -> Result<()> {
        if card.contact.trim().is_empty() {
            return Err(CardexError::Validation("contact must not be empty".to_string()));
        }
        if card.details.card_type() != card.card_type {
            return Err(CardexError::Validation(format!(
                "{} card cannot carry {} details",
                card.card_type,
                card.details.card_type()
            )));
        }

        let mut seen = Vec::with_capacity(card.artifacts.len());
        for artifact in &card.artifacts {
            validate_artifact_part("artifact name", &artifact.name)?;
            validate_artifact_part("artifact suffix", &artifact.suffix)?;
            if seen.contains(&artifact.name.as_str()) {
                return Err(CardexError::Validation(format!(
                    "duplicate artifact '{}'",
                    artifact.name
                )));
            }
            seen.push(artifact.name.as_str());
        }

        for (referenced_type, uid) in card.details.references() {
            if !self.db.contains(referenced_type, uid)? {
                return Err(CardexError::Validation(format!(
                    "{} card references unknown {referenced_type} card '{uid}'",
                    card.card_type
                )));
            }
        }
        Ok(())
    }

    fn persist_artifacts(&self, card: &Card, dir: &str) -> Result<BTreeMap<String, StoredArtifact>> {
        let mut stored = BTreeMap::new();
        for artifact in &card.artifacts {
            let path = self
                .storage
                .put(&artifact.bytes, &format!("{dir}/{}", artifact.file_name()))?;
            let content = ContentAddress::from_bytes(&artifact.bytes);
            tracing::debug!(
                target: "cardex::registry",
                path = %path,
                content = %content,
                "Persisted artifact"
            );
            stored.insert(artifact.name.clone(), StoredArtifact { path, content });
        }
        Ok(stored)
    }

    // ==================== Loading ====================

    /// Load a record by uid.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has this uid.
    pub fn load_card(&self, card_type: CardType, uid: &str) -> Result<CardRecord> {
        self.db.get(card_type, uid)
    }

    /// Find the most recent record for a name and repository, optionally
    /// restricted by a version query.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if nothing matches.
    pub fn find_card(
        &self,
        card_type: CardType,
        name: &str,
        repository: &str,
        version: Option<&str>,
    ) -> Result<CardRecord> {
        let mut filter = CardFilter::new().name(name).repository(repository).limit(1);
        if let Some(query) = version {
            filter = filter.version(query)?;
        }
        self.list_cards(card_type, &filter)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                let id = match version {
                    Some(v) => format!("{repository}/{name}:{v}"),
                    None => format!("{repository}/{name}"),
                };
                CardexError::not_found(card_type.table(), id)
            })
    }

    /// Read an artifact of a record, verifying its content address.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] for an unknown artifact and
    /// [`CardexError::HashMismatch`] if the stored bytes changed.
    pub fn load_artifact(&self, record: &CardRecord, name: &str) -> Result<Vec<u8>> {
        let stored = stored_artifact(record, name)?;
        let data = self.storage.get(&stored.path)?;
        if !stored.content.verify(&data) {
            return Err(CardexError::HashMismatch {
                expected: stored.content.hash_hex(),
                actual: ContentAddress::from_bytes(&data).hash_hex(),
            });
        }
        Ok(data)
    }

    /// Download one artifact, or all of them, into `dest_dir`.
    ///
    /// Each file is verified after it lands; a file that fails verification
    /// is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an artifact is unknown, cannot be written or fails
    /// verification.
    pub fn download_artifacts(
        &self,
        record: &CardRecord,
        artifact: Option<&str>,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let selected: Vec<&StoredArtifact> = match artifact {
            Some(name) => vec![stored_artifact(record, name)?],
            None => record.artifacts.values().collect(),
        };

        let mut written = Vec::with_capacity(selected.len());
        for stored in selected {
            let file_name = stored.path.rsplit('/').next().unwrap_or_default();
            let local = self.storage.download(&stored.path, &dest_dir.join(file_name))?;
            let actual = ContentAddress::from_reader(File::open(&local)?)?;
            if actual != stored.content {
                let _ = fs::remove_file(&local);
                return Err(CardexError::HashMismatch {
                    expected: stored.content.hash_hex(),
                    actual: actual.hash_hex(),
                });
            }
            written.push(local);
        }
        Ok(written)
    }

    /// List records, most recent first. Name and repository filters are
    /// normalized before matching.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_cards(&self, card_type: CardType, filter: &CardFilter) -> Result<Vec<CardRecord>> {
        let mut filter = filter.clone();
        if let Some(name) = filter.name.take() {
            filter.name = Some(normalize_identifier("name", &name)?);
        }
        if let Some(repository) = filter.repository.take() {
            filter.repository = Some(normalize_identifier("repository", &repository)?);
        }
        self.db.list(card_type, &filter)
    }

    /// Versions of a card line, most recent first, optionally restricted to
    /// a partial-version prefix such as `"1"` or `"1.2"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is malformed or the query fails.
    pub fn get_versions(
        &self,
        card_type: CardType,
        name: &str,
        repository: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<SemVer>> {
        let name = normalize_identifier("name", name)?;
        let repository = normalize_identifier("repository", repository)?;
        let prefix = prefix.map(SemVer::parse).transpose()?;
        self.db
            .get_versions(card_type, &name, &repository, prefix.as_ref())
    }

    /// Distinct `(repository, name)` lines of a card type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_names(&self, card_type: CardType) -> Result<Vec<(String, String)>> {
        self.db.list_names(card_type)
    }

    // ==================== Deletion ====================

    /// Delete a record and its artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has this uid.
    pub fn delete_card(&self, card_type: CardType, uid: &str) -> Result<CardRecord> {
        let record = self.db.get(card_type, uid)?;
        let removed = self.with_line(card_type, &record.name, &record.repository, || {
            self.db.delete(card_type, uid)?;
            self.storage.remove(&record.uri)
        })?;
        tracing::info!(
            target: "cardex::registry",
            card_type = %card_type,
            uid,
            version = %record.version,
            artifacts_removed = removed,
            "Deleted card"
        );
        Ok(record)
    }

    // ==================== Utility ====================

    /// Get storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if querying fails.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let mut cards = BTreeMap::new();
        for card_type in CardType::all() {
            cards.insert(*card_type, self.db.count(*card_type)?);
        }
        Ok(StorageStats {
            total_size_bytes: self.storage.total_size()?,
            artifact_count: self.storage.list("")?.len(),
            cards,
        })
    }

    /// Run `f` holding the lock of one version line. The line's entry is
    /// dropped from the table once nobody else is waiting on it.
    fn with_line<T>(
        &self,
        card_type: CardType,
        name: &str,
        repository: &str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let key: LineKey = (card_type, name.to_string(), repository.to_string());
        let line = Arc::clone(self.lines.lock().entry(key.clone()).or_default());
        let result = {
            let _guard = line.lock();
            f()
        };

        let mut lines = self.lines.lock();
        // One reference in the table, one here.
        if Arc::strong_count(&line) == 2 {
            lines.remove(&key);
        }
        result
    }

    /// Wall-clock microseconds, strictly increasing across calls.
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.clock.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Storage statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total size of all stored artifacts in bytes.
    pub total_size_bytes: u64,
    /// Number of stored artifact files.
    pub artifact_count: usize,
    /// Registered records per card type.
    pub cards: BTreeMap<CardType, usize>,
}

impl StorageStats {
    /// Registered records across all card types.
    #[must_use]
    pub fn total_cards(&self) -> usize {
        self.cards.values().sum()
    }
}

fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn stored_artifact<'a>(record: &'a CardRecord, name: &str) -> Result<&'a StoredArtifact> {
    record
        .artifacts
        .get(name)
        .ok_or_else(|| CardexError::not_found("artifact", format!("{record}/{name}")))
}

fn validate_artifact_part(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CardexError::Validation(format!(
            "{field} '{value}' may only contain [0-9A-Za-z-_.] and must not start with '.'"
        )))
    }
}

fn log_state(card_type: CardType, name: &str, repository: &str, state: TransactionState) {
    tracing::debug!(
        target: "cardex::registry",
        card_type = %card_type,
        name,
        repository,
        state = %state,
        "Registration state"
    );
}
