//! Version allocation for card registration.
//!
//! [`allocate`] is pure: the caller supplies every version already stored
//! for the `(name, repository)` pair, ordered most recent first, and gets
//! back the exact version to persist.

use super::{Label, SemVer, VersionIncrement, VersionRequest};
use crate::error::{CardexError, Result};
use std::cmp::Ordering;

const ALREADY_EXISTS: &str = "Version combination already exists";
const CANDIDATE_FOR_OFFICIAL: &str =
    "Cannot create a release candidate for an existing official version";
const TAG_WITHOUT_VERSION: &str = "Cannot set pre-release or build tag without a version";
const TAG_WITHOUT_FULL_VERSION: &str =
    "Cannot set pre-release or build tag without a full major.minor.patch specified";

/// Determine the version to assign to a new card.
///
/// Rules, in order:
///
/// 1. `Pre`/`Build`/`PreBuild` need a full `explicit` version. The most
///    recent stored version sharing its core is bumped until the result is
///    unused. A prerelease may not be cut for a core that already has an
///    official release.
/// 2. A full `explicit` version with a numeric increment is returned as is,
///    unless it already exists.
/// 3. With no history and no explicit version the answer is `1.0.0`.
/// 4. Otherwise the most recent stored version (restricted to the partial
///    `explicit` prefix, if any) is the base. A prerelease line with no
///    official release is promoted to its release without a numeric bump;
///    anything else is bumped until it no longer collides.
///
/// The request's build tag is appended to major/minor/patch results.
///
/// # Errors
///
/// Returns [`CardexError::Validation`] for an invalid increment/explicit
/// combination and [`CardexError::VersionConflict`] for collisions.
pub fn allocate(
    name: &str,
    repository: &str,
    request: &VersionRequest,
    explicit: Option<&SemVer>,
    existing: &[SemVer],
) -> Result<SemVer> {
    request.increment.validate()?;
    let build_label = request.build_label()?;

    let version = if request.increment.is_tagged() {
        allocate_tagged(&request.increment, explicit, existing)?
    } else {
        match explicit {
            Some(explicit) if explicit.is_full() => {
                allocate_explicit(explicit, build_label, existing)?
            }
            partial => with_build(
                allocate_numeric(&request.increment, partial, existing)?,
                build_label,
            ),
        }
    };

    tracing::debug!(
        target: "cardex::version",
        name,
        repository,
        increment = %request.increment,
        explicit = ?explicit.map(ToString::to_string),
        existing = existing.len(),
        allocated = %version,
        "Allocated version"
    );
    Ok(version)
}

fn allocate_tagged(
    increment: &VersionIncrement,
    explicit: Option<&SemVer>,
    existing: &[SemVer],
) -> Result<SemVer> {
    let explicit =
        explicit.ok_or_else(|| CardexError::Validation(TAG_WITHOUT_VERSION.to_string()))?;
    if !explicit.is_full() {
        return Err(CardexError::Validation(TAG_WITHOUT_FULL_VERSION.to_string()));
    }

    let same_core: Vec<&SemVer> = existing.iter().filter(|v| v.same_core(explicit)).collect();
    if increment.creates_prerelease() && same_core.iter().any(|v| !v.is_prerelease()) {
        return Err(CardexError::VersionConflict(CANDIDATE_FOR_OFFICIAL.to_string()));
    }

    // A build on an explicit prerelease stays on that prerelease.
    let base = same_core
        .into_iter()
        .find(|v| {
            !matches!(increment, VersionIncrement::Build(_))
                || explicit.prerelease.is_none()
                || v.prerelease == explicit.prerelease
        })
        .unwrap_or(explicit);

    let mut version = base.bump(increment)?;
    while existing.contains(&version) {
        version = version.bump(increment)?;
    }
    Ok(version)
}

fn allocate_explicit(
    explicit: &SemVer,
    build_label: Option<Label>,
    existing: &[SemVer],
) -> Result<SemVer> {
    let mut version = explicit.clone();
    if version.build.is_none() {
        version.build = build_label;
    }

    if existing.contains(&version) {
        return Err(CardexError::VersionConflict(ALREADY_EXISTS.to_string()));
    }
    if version.is_prerelease()
        && existing
            .iter()
            .any(|v| v.same_core(&version) && !v.is_prerelease())
    {
        return Err(CardexError::VersionConflict(CANDIDATE_FOR_OFFICIAL.to_string()));
    }
    Ok(version)
}

fn allocate_numeric(
    increment: &VersionIncrement,
    partial: Option<&SemVer>,
    existing: &[SemVer],
) -> Result<SemVer> {
    let latest = match partial {
        Some(prefix) => existing.iter().find(|v| v.has_prefix(prefix)),
        None => existing.first(),
    };

    let Some(latest) = latest else {
        return Ok(partial.map_or_else(SemVer::initial, SemVer::finalize_partial));
    };

    if latest.is_prerelease()
        && existing
            .iter()
            .filter(|v| v.same_core(latest))
            .all(SemVer::is_prerelease)
    {
        return Ok(latest.finalize());
    }

    let mut version = latest.bump(increment)?;
    while existing
        .iter()
        .any(|v| v.cmp_precedence(&version) == Ordering::Equal)
    {
        version = version.bump(increment)?;
    }
    Ok(version)
}

fn with_build(mut version: SemVer, build_label: Option<Label>) -> SemVer {
    if build_label.is_some() {
        version.build = build_label;
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> SemVer {
        s.parse().unwrap()
    }

    fn history(versions: &[&str]) -> Vec<SemVer> {
        versions.iter().map(|s| v(s)).collect()
    }

    fn request(increment: VersionIncrement) -> VersionRequest {
        VersionRequest::new(increment)
    }

    fn pre(tag: &str) -> VersionIncrement {
        VersionIncrement::Pre(tag.to_string())
    }

    fn run(req: &VersionRequest, explicit: Option<&str>, existing: &[SemVer]) -> Result<SemVer> {
        let explicit = explicit.map(v);
        allocate("model", "repo", req, explicit.as_ref(), existing)
    }

    /// Mimic the store's most-recent-first ordering.
    fn most_recent_first(versions: &mut [SemVer]) {
        versions.sort_by(|a, b| b.cmp(a));
    }

    #[test]
    fn test_empty_history_starts_at_one() {
        let version = run(&request(VersionIncrement::Minor), None, &[]).unwrap();
        assert_eq!(version, SemVer::new(1, 0, 0));
        let version = run(&request(VersionIncrement::Major), None, &[]).unwrap();
        assert_eq!(version, SemVer::new(1, 0, 0));
    }

    #[test]
    fn test_basic_minor_bumps() {
        let mut existing = Vec::new();
        let mut assigned = Vec::new();
        for _ in 0..3 {
            let version = run(&request(VersionIncrement::Minor), None, &existing).unwrap();
            assigned.push(version.to_string());
            existing.insert(0, version);
        }
        assert_eq!(assigned, ["1.0.0", "1.1.0", "1.2.0"]);
    }

    #[test]
    fn test_numeric_bumps_from_latest() {
        let existing = history(&["1.2.3", "1.2.2", "1.0.0"]);
        assert_eq!(run(&request(VersionIncrement::Major), None, &existing).unwrap(), v("2.0.0"));
        assert_eq!(run(&request(VersionIncrement::Minor), None, &existing).unwrap(), v("1.3.0"));
        assert_eq!(run(&request(VersionIncrement::Patch), None, &existing).unwrap(), v("1.2.4"));
    }

    #[test]
    fn test_explicit_full_version_collision() {
        let existing = history(&["1.0.0"]);
        let err = run(&request(VersionIncrement::Minor), Some("1.0.0"), &existing).unwrap_err();
        match err {
            CardexError::VersionConflict(msg) => assert_eq!(msg, ALREADY_EXISTS),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_explicit_full_version_returned_unchanged() {
        let existing = history(&["1.0.0"]);
        let version = run(&request(VersionIncrement::Minor), Some("3.1.4"), &existing).unwrap();
        assert_eq!(version, v("3.1.4"));
    }

    #[test]
    fn test_explicit_prerelease_for_official_rejected() {
        let existing = history(&["1.0.0"]);
        let err = run(&request(VersionIncrement::Patch), Some("1.0.0-rc.3"), &existing).unwrap_err();
        match err {
            CardexError::VersionConflict(msg) => assert_eq!(msg, CANDIDATE_FOR_OFFICIAL),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prerelease_promotion() {
        let existing = history(&["1.0.0-rc.2", "1.0.0-rc.1"]);
        let version = run(&request(VersionIncrement::Minor), None, &existing).unwrap();
        assert_eq!(version.to_string(), "1.0.0");
    }

    #[test]
    fn test_prerelease_with_existing_official_bumps() {
        let existing = history(&["1.0.0", "1.0.0-rc.3"]);
        let version = run(&request(VersionIncrement::Minor), None, &existing).unwrap();
        assert_eq!(version.to_string(), "1.1.0");
    }

    #[test]
    fn test_pre_then_official_collision_scenario() {
        let mut existing: Vec<SemVer> = Vec::new();

        let first = run(&request(pre("rc")), Some("1.0.0"), &existing).unwrap();
        assert_eq!(first.to_string(), "1.0.0-rc.1");
        existing.push(first);
        most_recent_first(&mut existing);

        let second = run(&request(pre("rc")), Some("1.0.0"), &existing).unwrap();
        assert_eq!(second.to_string(), "1.0.0-rc.2");
        existing.push(second);
        most_recent_first(&mut existing);

        let official = run(&request(VersionIncrement::Minor), None, &existing).unwrap();
        assert_eq!(official.to_string(), "1.0.0");
        existing.push(official);
        most_recent_first(&mut existing);

        let err = run(&request(VersionIncrement::Minor), Some("1.0.0"), &existing).unwrap_err();
        assert!(
            matches!(err, CardexError::VersionConflict(ref msg) if msg == ALREADY_EXISTS),
            "unexpected error: {err}"
        );

        let err = run(&request(pre("rc")), Some("1.0.0"), &existing).unwrap_err();
        assert!(
            matches!(err, CardexError::VersionConflict(ref msg) if msg == CANDIDATE_FOR_OFFICIAL),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_build_tag_independent_of_bump() {
        let existing = history(&["1.0.0"]);
        let req = request(VersionIncrement::Patch).with_build_tag("git.abc123");
        let version = run(&req, None, &existing).unwrap();
        assert_eq!(version.to_string(), "1.0.1+git.abc123");
    }

    #[test]
    fn test_build_increment_counts_per_core() {
        let req = request(VersionIncrement::Build("build".to_string()));
        let existing = history(&["1.0.0"]);
        assert_eq!(run(&req, Some("1.0.0"), &existing).unwrap().to_string(), "1.0.0+build.1");

        let existing = history(&["1.0.0+build.2", "1.0.0+build.1", "1.0.0"]);
        assert_eq!(run(&req, Some("1.0.0"), &existing).unwrap().to_string(), "1.0.0+build.3");
    }

    #[test]
    fn test_build_on_explicit_prerelease() {
        let req = request(VersionIncrement::Build("build".to_string()));
        let existing = history(&["1.0.0-rc.2", "1.0.0-rc.1+build.1", "1.0.0-rc.1"]);
        let version = run(&req, Some("1.0.0-rc.1"), &existing).unwrap();
        assert_eq!(version.to_string(), "1.0.0-rc.1+build.2");
    }

    #[test]
    fn test_pre_build_increment() {
        let req = request(VersionIncrement::PreBuild {
            pre: "rc".to_string(),
            build: "build".to_string(),
        });
        let version = run(&req, Some("2.0.0"), &[]).unwrap();
        assert_eq!(version.to_string(), "2.0.0-rc.1+build.1");
    }

    #[test]
    fn test_tagged_increment_requires_version() {
        let err = run(&request(pre("rc")), None, &[]).unwrap_err();
        assert!(matches!(err, CardexError::Validation(ref msg) if msg == TAG_WITHOUT_VERSION));

        let err = run(&request(pre("rc")), Some("1.2"), &[]).unwrap_err();
        assert!(matches!(err, CardexError::Validation(ref msg) if msg == TAG_WITHOUT_FULL_VERSION));
    }

    #[test]
    fn test_partial_explicit_version() {
        assert_eq!(run(&request(VersionIncrement::Minor), Some("2"), &[]).unwrap(), v("2.0.0"));

        let existing = history(&["2.3.0", "1.4.0", "1.2.0"]);
        assert_eq!(
            run(&request(VersionIncrement::Minor), Some("1"), &existing).unwrap(),
            v("1.5.0")
        );
        assert_eq!(
            run(&request(VersionIncrement::Patch), Some("1.2"), &existing).unwrap(),
            v("1.2.1")
        );
        assert_eq!(
            run(&request(VersionIncrement::Patch), Some("10"), &existing).unwrap(),
            v("10.0.0")
        );
    }

    #[test]
    fn test_numeric_bump_skips_collisions() {
        // Latest by recency is 1.0.0 but 1.1.0 is already taken.
        let existing = history(&["1.0.0", "1.1.0"]);
        let version = run(&request(VersionIncrement::Minor), None, &existing).unwrap();
        assert_eq!(version, v("1.2.0"));
    }

    #[test]
    fn test_exhausted_counter_is_an_error() {
        let existing = history(&["1.0.0-rc.18446744073709551615"]);
        let err = run(&request(pre("rc")), Some("1.0.0"), &existing).unwrap_err();
        assert!(matches!(err, CardexError::VersionConflict(_)));

        let existing = history(&["1.0.0+build.18446744073709551615"]);
        let build = request(VersionIncrement::Build("build".to_string()));
        assert!(run(&build, Some("1.0.0"), &existing).is_err());

        let existing = history(&["1.0.18446744073709551615"]);
        assert!(run(&request(VersionIncrement::Patch), None, &existing).is_err());
    }

    #[test]
    fn test_invalid_build_tag_rejected() {
        let req = request(VersionIncrement::Patch).with_build_tag("not valid");
        assert!(run(&req, None, &[]).is_err());
    }

    fn numeric_increment() -> impl Strategy<Value = VersionIncrement> {
        prop_oneof![
            Just(VersionIncrement::Major),
            Just(VersionIncrement::Minor),
            Just(VersionIncrement::Patch),
        ]
    }

    proptest! {
        #[test]
        fn prop_allocation_strictly_increasing(increments in proptest::collection::vec(numeric_increment(), 1..30)) {
            let mut existing: Vec<SemVer> = Vec::new();
            let mut previous: Option<SemVer> = None;
            for increment in increments {
                let version = run(&request(increment), None, &existing).unwrap();
                prop_assert!(!existing.contains(&version));
                if let Some(prev) = &previous {
                    prop_assert!(version > *prev);
                }
                previous = Some(version.clone());
                existing.push(version);
                most_recent_first(&mut existing);
            }
        }
    }
}
