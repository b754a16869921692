//! Cards: metadata records describing registered artifacts.
//!
//! A [`Card`] is what callers submit for registration; a [`CardRecord`] is
//! the row the registry persists once a version and uid have been assigned.

mod details;

pub use details::{
    AuditDetails, CardDetails, DataDetails, ModelDetails, PipelineDetails, ProjectDetails,
    RunDetails,
};

use crate::error::{CardexError, Result};
use crate::storage::ContentAddress;
use crate::version::SemVer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The kind of artifact a card describes. Each kind has its own registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// Datasets.
    Data,
    /// Trained models.
    Model,
    /// Experiment runs.
    Run,
    /// Pipelines.
    Pipeline,
    /// Audits of data and models.
    Audit,
    /// Projects grouping other cards.
    Project,
}

impl CardType {
    /// All card types.
    #[must_use]
    pub fn all() -> &'static [CardType] {
        &[
            CardType::Data,
            CardType::Model,
            CardType::Run,
            CardType::Pipeline,
            CardType::Audit,
            CardType::Project,
        ]
    }

    /// Registry table backing this card type.
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            Self::Data => "data_registry",
            Self::Model => "model_registry",
            Self::Run => "run_registry",
            Self::Pipeline => "pipeline_registry",
            Self::Audit => "audit_registry",
            Self::Project => "project_registry",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Model => write!(f, "model"),
            Self::Run => write!(f, "run"),
            Self::Pipeline => write!(f, "pipeline"),
            Self::Audit => write!(f, "audit"),
            Self::Project => write!(f, "project"),
        }
    }
}

impl FromStr for CardType {
    type Err = CardexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "data" | "datacard" => Ok(Self::Data),
            "model" | "modelcard" => Ok(Self::Model),
            "run" | "runcard" => Ok(Self::Run),
            "pipeline" | "pipelinecard" => Ok(Self::Pipeline),
            "audit" | "auditcard" => Ok(Self::Audit),
            "project" | "projectcard" => Ok(Self::Project),
            _ => Err(CardexError::Validation(format!("unknown card type: {s}"))),
        }
    }
}

/// Normalize a card name or repository.
///
/// Lowercases, strips every character other than alphanumerics, `-` and
/// `_`, then turns underscores into hyphens.
///
/// # Errors
///
/// Returns a validation error if nothing is left after normalization.
pub fn normalize_identifier(field: &str, value: &str) -> Result<String> {
    let normalized: String = value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .map(|c| if c == '_' { '-' } else { c })
        .collect();
    if normalized.is_empty() {
        return Err(CardexError::Validation(format!(
            "{field} must contain at least one alphanumeric character, got '{value}'"
        )));
    }
    Ok(normalized)
}

/// Directory holding one version's artifacts:
/// `{table}/{repository}/{name}/v{version}`.
#[must_use]
pub fn artifact_dir(card_type: CardType, repository: &str, name: &str, version: &SemVer) -> String {
    format!("{}/{repository}/{name}/v{version}", card_type.table())
}

/// Bytes to persist alongside a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Artifact name, unique within the card (e.g. `model`, `sample-data`).
    pub name: String,
    /// File suffix (e.g. `onnx`, `parquet`).
    pub suffix: String,
    /// Payload.
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Create an artifact.
    #[must_use]
    pub fn new(name: impl Into<String>, suffix: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
            bytes: bytes.into(),
        }
    }

    /// File name inside the version directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.suffix)
    }
}

/// Where an artifact was persisted and what it hashed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Remote path relative to the storage root.
    pub path: String,
    /// BLAKE3 content address of the bytes written.
    pub content: ContentAddress,
}

/// A card submitted for registration.
#[derive(Debug, Clone)]
pub struct Card {
    /// Card type.
    pub card_type: CardType,
    /// Card name.
    pub name: String,
    /// Owning repository.
    pub repository: String,
    /// Contact for the card owner.
    pub contact: String,
    /// Requested version before registration; assigned version afterwards.
    pub version: Option<SemVer>,
    /// Uid, set once registered.
    pub uid: Option<String>,
    /// Free-form tags.
    pub tags: BTreeMap<String, String>,
    /// Card-type-specific fields.
    pub details: CardDetails,
    /// Payloads to persist.
    pub artifacts: Vec<Artifact>,
}

impl Card {
    /// Create a card with empty details for its type.
    #[must_use]
    pub fn new(
        card_type: CardType,
        name: impl Into<String>,
        repository: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        Self {
            card_type,
            name: name.into(),
            repository: repository.into(),
            contact: contact.into(),
            version: None,
            uid: None,
            tags: BTreeMap::new(),
            details: CardDetails::empty(card_type),
            artifacts: Vec::new(),
        }
    }

    /// Start building a card.
    #[must_use]
    pub fn builder(card_type: CardType) -> CardBuilder {
        CardBuilder::new(card_type)
    }

    /// True once the card carries both a uid and a version.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.uid.is_some() && self.version.is_some()
    }

    /// Add or replace an artifact by name.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.retain(|a| a.name != artifact.name);
        self.artifacts.push(artifact);
    }
}

/// Builder for [`Card`].
#[derive(Debug)]
pub struct CardBuilder {
    card: Card,
}

impl CardBuilder {
    /// Create a builder for a card type.
    #[must_use]
    pub fn new(card_type: CardType) -> Self {
        Self {
            card: Card::new(card_type, "", "", ""),
        }
    }

    /// Set the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.card.name = name.into();
        self
    }

    /// Set the repository.
    #[must_use]
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.card.repository = repository.into();
        self
    }

    /// Set the contact.
    #[must_use]
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.card.contact = contact.into();
        self
    }

    /// Request an explicit (possibly partial) version.
    #[must_use]
    pub fn version(mut self, version: SemVer) -> Self {
        self.card.version = Some(version);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.card.tags.insert(key.into(), value.into());
        self
    }

    /// Set card-type-specific fields.
    #[must_use]
    pub fn details(mut self, details: CardDetails) -> Self {
        self.card.details = details;
        self
    }

    /// Attach an artifact.
    #[must_use]
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.card.add_artifact(artifact);
        self
    }

    /// Build the card.
    #[must_use]
    pub fn build(self) -> Card {
        self.card
    }
}

/// A persisted registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Globally unique id, assigned once.
    pub uid: String,
    /// Card type (selects the table).
    pub card_type: CardType,
    /// Normalized name.
    pub name: String,
    /// Normalized repository.
    pub repository: String,
    /// Contact for the card owner.
    pub contact: String,
    /// Assigned version.
    pub version: SemVer,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Insertion time in microseconds since the Unix epoch.
    pub timestamp: i64,
    /// Card-type-specific fields.
    pub details: CardDetails,
    /// Artifact directory relative to the storage root.
    pub uri: String,
    /// Persisted artifacts by name.
    #[serde(default)]
    pub artifacts: BTreeMap<String, StoredArtifact>,
}

impl CardRecord {
    /// Insertion time as a UTC datetime.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp)
    }

    /// Rebuild the card this record was registered from, without artifact bytes.
    #[must_use]
    pub fn to_card(&self) -> Card {
        Card {
            card_type: self.card_type,
            name: self.name.clone(),
            repository: self.repository.clone(),
            contact: self.contact.clone(),
            version: Some(self.version.clone()),
            uid: Some(self.uid.clone()),
            tags: self.tags.clone(),
            details: self.details.clone(),
            artifacts: Vec::new(),
        }
    }

    /// Copy the registered identity back onto a card.
    pub fn apply_to(&self, card: &mut Card) {
        card.uid = Some(self.uid.clone());
        card.version = Some(self.version.clone());
        card.name.clone_from(&self.name);
        card.repository.clone_from(&self.repository);
    }
}

impl fmt::Display for CardRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.card_type, self.repository, self.name, self.version
        )
    }
}
