// Clippy configuration for cardex crate
// Component counts are at most 3, so `usize as u8` cannot truncate
#![allow(clippy::cast_possible_truncation)]
// `map_or(true, ..)` stays while the MSRV predates `Option::is_none_or`
#![allow(clippy::unnecessary_map_or)]
// CLI handlers pass registry errors through unchanged
#![allow(clippy::missing_errors_doc)]
// Type names that repeat their module name (card::CardType, version::VersionQuery)
#![allow(clippy::module_name_repetitions)]

//! Cardex: versioned registry for ML cards
//!
//! Cardex records metadata "cards" for data, models, runs, pipelines,
//! audits and projects. Every card belongs to a `(repository, name)` line
//! and receives a strictly ordered semantic version when it is registered;
//! its artifacts are written under a path derived from that version and
//! the registry row is committed only after the artifacts are stored.
//!
//! # Quick Start
//!
//! ```no_run
//! use cardex::prelude::*;
//!
//! // Open or create the registry
//! let registry = Registry::open_default()?;
//!
//! // Register a data card
//! let mut card = Card::builder(CardType::Data)
//!     .name("transactions")
//!     .repository("risk")
//!     .contact("ml-team@example.com")
//!     .artifact(Artifact::new("data", "parquet", std::fs::read("transactions.parquet")?))
//!     .build();
//!
//! registry.register_card(&mut card, &VersionRequest::new(VersionIncrement::Minor))?;
//! println!("Registered version {}", card.version.unwrap_or_default());
//!
//! // Load the latest record back
//! let record = registry.find_card(CardType::Data, "transactions", "risk", None)?;
//! let bytes = registry.load_artifact(&record, "data")?;
//! # Ok::<(), cardex::error::CardexError>(())
//! ```
//!
//! # Versioning
//!
//! - Numeric bumps (`major`, `minor`, `patch`) start from the most recent
//!   version of the line, or from a partial explicit version such as `"1"`.
//! - A line made only of prereleases is promoted to its release on the next
//!   numeric registration.
//! - Prerelease (`-rc.N`) and build (`+build.N`) channels keep their own
//!   counters and need a full explicit version.
//!
//! # Storage
//!
//! Artifacts live under `{table}/{repository}/{name}/v{version}/` in an
//! injected [`storage::ArtifactStorage`] backend and are verified against
//! their BLAKE3 hash when loaded.
//!
//! Registry metadata is stored in `SQLite` at `~/.cardex/registry.db`.

pub mod card;
pub mod cli;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod storage;
pub mod version;

pub use error::{CardexError, Result};
pub use registry::{Registry, RegistryConfig, StorageStats};
