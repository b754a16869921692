//! Versioning for registry cards.
//!
//! Provides the [`SemVer`] value type, the pure version [`allocate`]
//! algorithm used during registration, and [`VersionQuery`] matching for
//! listing cards by partial or wildcard versions.

mod allocator;
mod query;
mod semver;

pub use allocator::allocate;
pub use query::VersionQuery;
pub use semver::{Label, SemVer};

use crate::error::{CardexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default prerelease channel.
pub const DEFAULT_PRE_TAG: &str = "rc";

/// Default build channel.
pub const DEFAULT_BUILD_TAG: &str = "build";

/// How the next version of a card line is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionIncrement {
    /// Breaking change: `(major + 1).0.0`.
    Major,
    /// Backward compatible change: `major.(minor + 1).0`.
    Minor,
    /// Fix: `major.minor.(patch + 1)`.
    Patch,
    /// Next prerelease on the given channel.
    Pre(String),
    /// Next build on the given channel.
    Build(String),
    /// Next prerelease, then next build.
    PreBuild {
        /// Prerelease channel.
        pre: String,
        /// Build channel.
        build: String,
    },
}

impl VersionIncrement {
    /// Build an increment from a kind name and optional channel tags.
    ///
    /// Kinds are `major`, `minor`, `patch`, `pre`, `build` and `pre_build`;
    /// missing tags fall back to [`DEFAULT_PRE_TAG`] / [`DEFAULT_BUILD_TAG`].
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown kind or a malformed tag.
    pub fn from_parts(kind: &str, pre_tag: Option<&str>, build_tag: Option<&str>) -> Result<Self> {
        let pre = pre_tag.unwrap_or(DEFAULT_PRE_TAG).to_string();
        let build = build_tag.unwrap_or(DEFAULT_BUILD_TAG).to_string();
        let increment = match kind.to_lowercase().replace('-', "_").as_str() {
            "major" => Self::Major,
            "minor" => Self::Minor,
            "patch" => Self::Patch,
            "pre" | "prerelease" => Self::Pre(pre),
            "build" => Self::Build(build),
            "pre_build" => Self::PreBuild { pre, build },
            other => {
                return Err(CardexError::Validation(format!(
                    "unknown version increment '{other}' (expected major, minor, patch, pre, build or pre_build)"
                )))
            }
        };
        increment.validate()?;
        Ok(increment)
    }

    /// True for `Pre`, `Build` and `PreBuild`, which need an explicit base.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        matches!(self, Self::Pre(_) | Self::Build(_) | Self::PreBuild { .. })
    }

    /// True when the increment produces a prerelease.
    #[must_use]
    pub fn creates_prerelease(&self) -> bool {
        matches!(self, Self::Pre(_) | Self::PreBuild { .. })
    }

    /// Check that channel tags are well-formed identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if a tag is empty or contains illegal characters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Major | Self::Minor | Self::Patch => Ok(()),
            Self::Pre(tag) | Self::Build(tag) => semver::validate_identifier(tag),
            Self::PreBuild { pre, build } => {
                semver::validate_identifier(pre)?;
                semver::validate_identifier(build)
            }
        }
    }
}

impl fmt::Display for VersionIncrement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
            Self::Pre(tag) => write!(f, "pre({tag})"),
            Self::Build(tag) => write!(f, "build({tag})"),
            Self::PreBuild { pre, build } => write!(f, "pre_build({pre}, {build})"),
        }
    }
}

/// A version request attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequest {
    /// Increment to apply.
    pub increment: VersionIncrement,
    /// Build label appended verbatim to major/minor/patch results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_tag: Option<String>,
}

impl VersionRequest {
    /// Request a plain increment.
    #[must_use]
    pub fn new(increment: VersionIncrement) -> Self {
        Self {
            increment,
            build_tag: None,
        }
    }

    /// Attach a build label to a numeric bump.
    #[must_use]
    pub fn with_build_tag(mut self, tag: impl Into<String>) -> Self {
        self.build_tag = Some(tag.into());
        self
    }

    /// The parsed build label, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is malformed.
    pub fn build_label(&self) -> Result<Option<Label>> {
        self.build_tag.as_deref().map(Label::parse).transpose()
    }
}

impl Default for VersionRequest {
    fn default() -> Self {
        Self::new(VersionIncrement::Minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_defaults() {
        assert_eq!(
            VersionIncrement::from_parts("pre", None, None).unwrap(),
            VersionIncrement::Pre("rc".to_string())
        );
        assert_eq!(
            VersionIncrement::from_parts("build", None, Some("nightly")).unwrap(),
            VersionIncrement::Build("nightly".to_string())
        );
        assert_eq!(
            VersionIncrement::from_parts("pre-build", Some("beta"), None).unwrap(),
            VersionIncrement::PreBuild {
                pre: "beta".to_string(),
                build: "build".to_string(),
            }
        );
        assert_eq!(
            VersionIncrement::from_parts("MAJOR", None, None).unwrap(),
            VersionIncrement::Major
        );
    }

    #[test]
    fn test_from_parts_rejects_unknown_kind() {
        let err = VersionIncrement::from_parts("huge", None, None).unwrap_err();
        assert!(matches!(err, CardexError::Validation(_)));
    }

    #[test]
    fn test_from_parts_rejects_bad_tag() {
        assert!(VersionIncrement::from_parts("pre", Some("rc 1"), None).is_err());
        assert!(VersionIncrement::from_parts("build", None, Some("")).is_err());
    }

    #[test]
    fn test_increment_kinds() {
        assert!(!VersionIncrement::Minor.is_tagged());
        assert!(VersionIncrement::Build("b".to_string()).is_tagged());
        assert!(!VersionIncrement::Build("b".to_string()).creates_prerelease());
        assert!(VersionIncrement::Pre("rc".to_string()).creates_prerelease());
    }

    #[test]
    fn test_request_build_label() {
        let request = VersionRequest::new(VersionIncrement::Patch).with_build_tag("git.abc123");
        assert_eq!(
            request.build_label().unwrap(),
            Some(Label::new("git.abc123", None))
        );
        assert_eq!(VersionRequest::default().build_label().unwrap(), None);
    }
}
