//! Version filters for listing cards.
//!
//! ```text
//! 1.2.3     exact
//! 1 / 1.2   numeric prefix (partial version)
//! 1.*       any version with major 1
//! ^1.2.0    same major, at least 1.2.0
//! ~1.2.0    same major.minor, at least 1.2.0
//! ```

use super::SemVer;
use crate::error::{CardexError, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed version filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionQuery {
    /// Matches every version (`*`).
    Any,
    /// Matches one version exactly, build label included.
    Exact(SemVer),
    /// Matches versions whose numeric components start with the prefix.
    Prefix(SemVer),
    /// Caret range.
    Caret(SemVer),
    /// Tilde range.
    Tilde(SemVer),
}

impl VersionQuery {
    /// Parse a version filter.
    ///
    /// # Errors
    ///
    /// Returns a validation error if more than one wildcard marker is present
    /// or a `*` is not the final component, and a version error if the
    /// remaining version text is malformed.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let markers = s.chars().filter(|c| matches!(c, '*' | '^' | '~')).count();
        if markers > 1 {
            return Err(CardexError::Validation(format!(
                "version query '{s}' may contain only one of '*', '^' or '~'"
            )));
        }

        if let Some(rest) = s.strip_prefix('^') {
            return Ok(Self::Caret(SemVer::parse(rest)?.finalize_partial()));
        }
        if let Some(rest) = s.strip_prefix('~') {
            return Ok(Self::Tilde(SemVer::parse(rest)?.finalize_partial()));
        }
        if s == "*" {
            return Ok(Self::Any);
        }
        if s.contains('*') {
            let base = s.strip_suffix(".*").ok_or_else(|| {
                CardexError::Validation(format!(
                    "wildcard '*' must be the last component in '{s}'"
                ))
            })?;
            return Ok(Self::Prefix(SemVer::parse(base)?));
        }

        let version = SemVer::parse(s)?;
        if version.is_full() {
            Ok(Self::Exact(version))
        } else {
            Ok(Self::Prefix(version))
        }
    }

    /// Check whether a stored version satisfies this filter.
    #[must_use]
    pub fn matches(&self, version: &SemVer) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => version == exact,
            Self::Prefix(prefix) => version.has_prefix(prefix),
            Self::Caret(base) => {
                let same_line = if base.major > 0 {
                    version.major == base.major
                } else {
                    version.major == 0 && version.minor == base.minor
                };
                same_line && version.cmp_precedence(base) != Ordering::Less
            }
            Self::Tilde(base) => {
                version.major == base.major
                    && version.minor == base.minor
                    && version.cmp_precedence(base) != Ordering::Less
            }
        }
    }
}

impl fmt::Display for VersionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) | Self::Prefix(v) => write!(f, "{v}"),
            Self::Caret(v) => write!(f, "^{v}"),
            Self::Tilde(v) => write!(f, "~{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemVer {
        s.parse().unwrap()
    }

    fn q(s: &str) -> VersionQuery {
        VersionQuery::parse(s).unwrap()
    }

    #[test]
    fn test_exact() {
        let query = q("1.2.3");
        assert!(query.matches(&v("1.2.3")));
        assert!(!query.matches(&v("1.2.3-rc.1")));
        assert!(!query.matches(&v("1.2.4")));
    }

    #[test]
    fn test_partial_prefix() {
        let query = q("1");
        assert!(matches!(query, VersionQuery::Prefix(_)));
        assert!(query.matches(&v("1.0.0")));
        assert!(query.matches(&v("1.9.3-rc.1")));
        assert!(!query.matches(&v("10.0.0")));
        assert!(!query.matches(&v("2.0.0")));
    }

    #[test]
    fn test_star() {
        assert_eq!(q("*"), VersionQuery::Any);
        let query = q("1.*");
        assert!(query.matches(&v("1.4.0")));
        assert!(!query.matches(&v("2.0.0")));
        let query = q("1.2.*");
        assert!(query.matches(&v("1.2.7")));
        assert!(!query.matches(&v("1.3.0")));
    }

    #[test]
    fn test_caret() {
        let query = q("^1.2.0");
        assert!(query.matches(&v("1.2.0")));
        assert!(query.matches(&v("1.9.0")));
        assert!(!query.matches(&v("1.1.9")));
        assert!(!query.matches(&v("2.0.0")));

        let query = q("^0.3");
        assert!(query.matches(&v("0.3.5")));
        assert!(!query.matches(&v("0.4.0")));
    }

    #[test]
    fn test_tilde() {
        let query = q("~1.2.3");
        assert!(query.matches(&v("1.2.3")));
        assert!(query.matches(&v("1.2.9")));
        assert!(!query.matches(&v("1.3.0")));
        assert!(!query.matches(&v("1.2.2")));
    }

    #[test]
    fn test_multiple_markers_rejected() {
        for bad in ["^~1.0.0", "^1.*", "~1.*", "*.*"] {
            let err = VersionQuery::parse(bad).unwrap_err();
            assert!(matches!(err, CardexError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn test_star_must_be_last() {
        assert!(matches!(
            VersionQuery::parse("*.1").unwrap_err(),
            CardexError::Validation(_)
        ));
    }

    #[test]
    fn test_malformed_wildcards_rejected() {
        for bad in ["1..*", "1...*", ".*", "1*"] {
            assert!(VersionQuery::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(q("^1.2").to_string(), "^1.2.0");
        assert_eq!(q("1.*").to_string(), "1");
        assert_eq!(q("*").to_string(), "*");
    }
}
