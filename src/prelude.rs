//! Convenient re-exports for common usage.
//!
//! ```
//! use cardex::prelude::*;
//! ```

// Core types
pub use crate::error::{CardexError, Result};
pub use crate::registry::{CardFilter, Registration, Registry, RegistryConfig, StorageStats};

// Card types
pub use crate::card::{
    Artifact, AuditDetails, Card, CardDetails, CardRecord, CardType, DataDetails, ModelDetails,
    PipelineDetails, ProjectDetails, RunDetails, StoredArtifact,
};

// Version types
pub use crate::version::{SemVer, VersionIncrement, VersionQuery, VersionRequest};

// Storage types
pub use crate::storage::{ArtifactStorage, ContentAddress, LocalStorage, MemoryStorage};
