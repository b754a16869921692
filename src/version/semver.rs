//! Semantic versions for registry cards.
//!
//! Versions follow `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`. Prerelease and
//! build labels carry a named channel with an optional monotonic counter
//! (`rc.2`, `build.14`), or a free-form identifier such as `git.abc123`.
//!
//! A version parsed from fewer than three numeric components (`"1"`,
//! `"1.2"`) is *partial*. Partial versions are only meaningful as search
//! prefixes or allocation bases and must be finalized before they are
//! persisted.

use crate::error::{CardexError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::VersionIncrement;

/// A prerelease or build label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    /// Channel name (e.g. `rc`, `build`, `git.abc123`).
    pub tag: String,
    /// Counter within the channel, if the label ends in a numeric component.
    pub number: Option<u64>,
}

impl Label {
    /// Create a label from its parts.
    #[must_use]
    pub fn new(tag: impl Into<String>, number: Option<u64>) -> Self {
        Self {
            tag: tag.into(),
            number,
        }
    }

    /// Parse a label; a trailing all-digit dot component becomes the counter.
    ///
    /// # Errors
    ///
    /// Returns an error for empty labels, empty dot components, or characters
    /// outside `[0-9A-Za-z-.]`.
    pub fn parse(s: &str) -> Result<Self> {
        validate_identifier(s)?;
        match s.rsplit_once('.') {
            Some((tag, counter)) if counter.bytes().all(|b| b.is_ascii_digit()) => {
                let number = counter.parse::<u64>().map_err(|_| {
                    CardexError::InvalidVersion(format!("label counter out of range in '{s}'"))
                })?;
                Ok(Self::new(tag, Some(number)))
            }
            _ => Ok(Self::new(s, None)),
        }
    }

    /// Next label on `tag`: the counter advances when the channel matches,
    /// otherwise the channel restarts at 1.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::VersionConflict`] if the counter is exhausted.
    pub fn bumped(&self, tag: &str) -> Result<Self> {
        if self.tag != tag {
            return Ok(Self::new(tag, Some(1)));
        }
        let number = match self.number {
            Some(n) => next_component(n, tag)?,
            None => 1,
        };
        Ok(Self::new(tag, Some(number)))
    }
}

fn next_component(value: u64, what: &str) -> Result<u64> {
    value
        .checked_add(1)
        .ok_or_else(|| CardexError::VersionConflict(format!("{what} counter exhausted at {value}")))
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(n) = self.number {
            write!(f, ".{n}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag
            .cmp(&other.tag)
            .then_with(|| self.number.cmp(&other.number))
    }
}

/// Check that a label or tag is a well-formed dot-separated identifier.
pub(crate) fn validate_identifier(s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(CardexError::InvalidVersion("empty label".to_string()));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(CardexError::InvalidVersion(format!(
            "label '{s}' may only contain [0-9A-Za-z-.]"
        )));
    }
    if s.split('.').any(str::is_empty) {
        return Err(CardexError::InvalidVersion(format!(
            "label '{s}' has an empty identifier"
        )));
    }
    Ok(())
}

/// Semantic version of a registered card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
    /// Prerelease label (e.g. `rc.1`).
    pub prerelease: Option<Label>,
    /// Build label (e.g. `build.3`).
    pub build: Option<Label>,
    /// Number of numeric components present in the source string.
    components: u8,
}

impl SemVer {
    /// Create a full version with no labels.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
            components: 3,
        }
    }

    /// Version 1.0.0, the first version of every card line.
    #[must_use]
    pub fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    /// Set the prerelease label.
    #[must_use]
    pub fn with_prerelease(mut self, label: Label) -> Self {
        self.prerelease = Some(label);
        self
    }

    /// Set the build label.
    #[must_use]
    pub fn with_build(mut self, label: Label) -> Self {
        self.build = Some(label);
        self
    }

    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid (possibly partial) version.
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// True iff all three numeric components were given.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.components >= 3
    }

    /// Number of numeric components given in the source string (1..=3).
    #[must_use]
    pub fn components(&self) -> u8 {
        self.components
    }

    /// True if this version carries a prerelease label.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Pad missing minor/patch components with zero.
    #[must_use]
    pub fn finalize_partial(&self) -> Self {
        Self {
            components: 3,
            ..self.clone()
        }
    }

    /// The official release of this version's core: labels dropped, padded.
    #[must_use]
    pub fn finalize(&self) -> Self {
        Self::new(self.major, self.minor, self.patch)
    }

    /// True if both versions share `major.minor.patch`.
    #[must_use]
    pub fn same_core(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }

    /// True if the numeric components of `self` start with those of `prefix`.
    ///
    /// `1` is a prefix of `1.4.2` but not of `10.0.0`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &Self) -> bool {
        let ours = [self.major, self.minor, self.patch];
        let theirs = [prefix.major, prefix.minor, prefix.patch];
        let n = usize::from(prefix.components.min(3));
        ours[..n] == theirs[..n]
    }

    /// Produce the next version for an increment.
    ///
    /// Numeric bumps drop both labels. `Pre` keeps the core and advances the
    /// prerelease counter for its channel; `Build` advances the build counter
    /// and leaves the prerelease untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::VersionConflict`] if the component or counter
    /// being advanced is already at `u64::MAX`.
    pub fn bump(&self, increment: &VersionIncrement) -> Result<Self> {
        let base = self.finalize_partial();
        let version = match increment {
            VersionIncrement::Major => Self::new(next_component(base.major, "major")?, 0, 0),
            VersionIncrement::Minor => {
                Self::new(base.major, next_component(base.minor, "minor")?, 0)
            }
            VersionIncrement::Patch => Self::new(
                base.major,
                base.minor,
                next_component(base.patch, "patch")?,
            ),
            VersionIncrement::Pre(tag) => {
                let label = match base.prerelease {
                    Some(ref label) => label.bumped(tag)?,
                    None => Label::new(tag.as_str(), Some(1)),
                };
                Self {
                    prerelease: Some(label),
                    build: None,
                    ..base
                }
            }
            VersionIncrement::Build(tag) => {
                let label = match base.build {
                    Some(ref label) => label.bumped(tag)?,
                    None => Label::new(tag.as_str(), Some(1)),
                };
                Self {
                    build: Some(label),
                    ..base
                }
            }
            VersionIncrement::PreBuild { pre, build } => base
                .bump(&VersionIncrement::Pre(pre.clone()))?
                .bump(&VersionIncrement::Build(build.clone()))?,
        };
        Ok(version)
    }

    /// Semver precedence: build metadata is ignored.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl Default for SemVer {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if self.components >= 2 {
            write!(f, ".{}", self.minor)?;
        }
        if self.components >= 3 {
            write!(f, ".{}", self.patch)?;
        }
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{pre}")?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = CardexError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CardexError::InvalidVersion("empty version string".to_string()));
        }

        // Build metadata first (after +), then prerelease (after the first -)
        let (rest, build) = match s.split_once('+') {
            Some((v, b)) => (v, Some(Label::parse(b)?)),
            None => (s, None),
        };
        let (core, prerelease) = match rest.split_once('-') {
            Some((v, p)) => (v, Some(Label::parse(p)?)),
            None => (rest, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(CardexError::InvalidVersion(format!(
                "expected at most MAJOR.MINOR.PATCH, got '{s}'"
            )));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CardexError::InvalidVersion(format!(
                    "invalid numeric component '{part}' in '{s}'"
                )));
            }
            *slot = part.parse::<u64>().map_err(|_| {
                CardexError::InvalidVersion(format!("component '{part}' out of range in '{s}'"))
            })?;
        }

        if parts.len() < 3 && (prerelease.is_some() || build.is_some()) {
            return Err(CardexError::InvalidVersion(format!(
                "prerelease or build labels require a full MAJOR.MINOR.PATCH, got '{s}'"
            )));
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            prerelease,
            build,
            // parts.len() is 1..=3 here
            components: parts.len() as u8,
        })
    }
}

impl TryFrom<String> for SemVer {
    type Error = CardexError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SemVer> for String {
    fn from(v: SemVer) -> Self {
        v.to_string()
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemVer {
    /// Precedence first; build and component count only break ties so the
    /// order stays consistent with `Eq`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_precedence(other)
            .then_with(|| self.build.cmp(&other.build))
            .then_with(|| self.components.cmp(&other.components))
    }
}
