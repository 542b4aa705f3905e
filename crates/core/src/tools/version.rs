//! Cache key normalization and version equivalence.
//!
//! A bundle is identified by its release tag, but users usually ask for a CLI
//! version. Cache keys combine the two so that the same build always lands on
//! the same key regardless of how it was requested.

use semver::Version;

/// Prefix shared by all bundle release tags.
pub const BUNDLE_TAG_PREFIX: &str = "codeql-bundle-";

const MARKER_PREFIX: &str = "cli-version-";
const MARKER_SUFFIX: &str = ".txt";

/// Name of the release asset that records which CLI version a bundle ships.
#[must_use]
pub fn cli_version_marker(cli_version: &str) -> String {
    format!("{MARKER_PREFIX}{cli_version}{MARKER_SUFFIX}")
}

/// Extract the CLI version from a marker asset name.
#[must_use]
pub fn cli_version_from_marker(asset_name: &str) -> Option<String> {
    let version = asset_name
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    Version::parse(version).ok().map(|_| version.to_string())
}

/// The date part of a bundle tag, made safe to use as a semver prerelease identifier.
///
/// Characters outside `[0-9A-Za-z-]` become `-`. A purely numeric result with a
/// leading zero is prefixed with `t`, since semver forbids such identifiers.
#[must_use]
pub fn tag_date(tag_name: &str) -> String {
    let raw = tag_name.strip_prefix(BUNDLE_TAG_PREFIX).unwrap_or(tag_name);
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.is_empty() {
        return "unknown".to_string();
    }
    let numeric = sanitized.bytes().all(|b| b.is_ascii_digit());
    if numeric && sanitized.len() > 1 && sanitized.starts_with('0') {
        format!("t{sanitized}")
    } else {
        sanitized
    }
}

/// Whether `version` is a plain `major.minor.patch` release.
#[must_use]
pub fn is_plain_release(version: &str) -> bool {
    Version::parse(version).is_ok_and(|v| v.pre.is_empty() && v.build.is_empty())
}

/// The cache key for a bundle.
///
/// `{cli_version}-{tag_date}` when the CLI version is a plain release, otherwise
/// `0.0.0-{tag_date}`.
#[must_use]
pub fn normalized_cache_version(cli_version: Option<&str>, tag_name: &str) -> String {
    let date = tag_date(tag_name);
    match cli_version {
        Some(version) if is_plain_release(version) => format!("{version}-{date}"),
        _ => format!("0.0.0-{date}"),
    }
}

/// How a cached key relates to a requested CLI version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Equivalence {
    /// The cached entry provides the requested version.
    Equivalent,
    /// The cached entry is a `0.0.0-{date}` build; it is equivalent only if the
    /// release with this tag date carries the requested version's marker.
    IfMarkerMatches { tag_date: String },
    /// Unrelated.
    Different,
}

/// Decide whether the cached key `cached` satisfies a request for `version`.
///
/// A plain release also matches keys dated by a `YYYYMMDD` tag or by its own
/// `v{version}` tag. Any other suffix is a different build.
#[must_use]
pub fn equivalence(cached: &str, version: &str) -> Equivalence {
    if cached == version || same_precedence(cached, version) {
        return Equivalence::Equivalent;
    }
    if let Some(rest) = cached.strip_prefix(version)
        && let Some(date) = rest.strip_prefix('-')
        && (is_tag_date(date) || date == tag_date(&format!("v{version}")))
        && is_plain_release(version)
    {
        return Equivalence::Equivalent;
    }
    if let Some(date) = cached.strip_prefix("0.0.0-")
        && !date.is_empty()
    {
        return Equivalence::IfMarkerMatches {
            tag_date: date.to_string(),
        };
    }
    Equivalence::Different
}

/// A `YYYYMMDD` bundle tag date.
fn is_tag_date(s: &str) -> bool {
    s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Semver precedence equality, ignoring build metadata.
fn same_precedence(a: &str, b: &str) -> bool {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp_precedence(&b).is_eq(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_cache_version() {
        let tag = "codeql-bundle-20200610";
        assert_eq!(
            normalized_cache_version(Some("2.10.0"), tag),
            "2.10.0-20200610"
        );
        assert_eq!(
            normalized_cache_version(Some("2.10.0-pre"), tag),
            "0.0.0-20200610"
        );
        assert_eq!(
            normalized_cache_version(Some("2.10.0+202006100101"), tag),
            "0.0.0-20200610"
        );
        assert_eq!(normalized_cache_version(None, tag), "0.0.0-20200610");
    }

    #[test]
    fn test_normalized_keys_are_valid_semver() {
        for tag in [
            "codeql-bundle-20200610",
            "codeql-bundle-v2.12.4",
            "codeql-bundle-0123",
            "codeql-bundle-",
            "some_other.tag",
        ] {
            let key = normalized_cache_version(Some("2.12.4"), tag);
            assert!(Version::parse(&key).is_ok(), "{key} from {tag}");
            let key = normalized_cache_version(None, tag);
            assert!(Version::parse(&key).is_ok(), "{key} from {tag}");
        }
    }

    #[test]
    fn test_tag_date_sanitizing() {
        assert_eq!(tag_date("codeql-bundle-20230203"), "20230203");
        assert_eq!(tag_date("codeql-bundle-v2.12.4"), "v2-12-4");
        assert_eq!(tag_date("codeql-bundle-0123"), "t0123");
        assert_eq!(tag_date("codeql-bundle-0"), "0");
        assert_eq!(tag_date("nightly_1"), "nightly-1");
    }

    #[test]
    fn test_distinct_tags_give_distinct_keys() {
        let a = normalized_cache_version(Some("2.12.4"), "codeql-bundle-20230101");
        let b = normalized_cache_version(Some("2.12.4"), "codeql-bundle-20230102");
        assert_ne!(a, b);
    }

    #[test]
    fn test_marker_round_trip() {
        assert_eq!(cli_version_marker("2.12.2"), "cli-version-2.12.2.txt");
        assert_eq!(
            cli_version_from_marker("cli-version-2.12.2.txt").as_deref(),
            Some("2.12.2")
        );
        assert_eq!(cli_version_from_marker("cli-version-bogus.txt"), None);
        assert_eq!(cli_version_from_marker("codeql-bundle.tar.gz"), None);
    }

    #[test]
    fn test_equivalence_exact_and_dated() {
        assert_eq!(equivalence("2.12.4", "2.12.4"), Equivalence::Equivalent);
        assert_eq!(
            equivalence("2.12.4-20230101", "2.12.4"),
            Equivalence::Equivalent
        );
        assert_eq!(equivalence("2.12.40-20230101", "2.12.4"), Equivalence::Different);
        assert_eq!(equivalence("2.12.3-20230101", "2.12.4"), Equivalence::Different);
        assert_eq!(
            equivalence(
                &normalized_cache_version(Some("2.12.4"), "codeql-bundle-v2.12.4"),
                "2.12.4"
            ),
            Equivalence::Equivalent
        );
    }

    #[test]
    fn test_equivalence_prerelease_key_is_not_a_dated_release() {
        assert_eq!(equivalence("2.12.4-pre", "2.12.4"), Equivalence::Different);
        assert_eq!(equivalence("2.12.4-rc1", "2.12.4"), Equivalence::Different);
        assert_eq!(equivalence("2.12.4-2023010", "2.12.4"), Equivalence::Different);
        assert_eq!(
            equivalence("2.12.4-20230101-1", "2.12.4"),
            Equivalence::Different
        );
    }

    #[test]
    fn test_equivalence_ignores_build_metadata() {
        assert_eq!(
            equivalence("2.12.4+build.5", "2.12.4"),
            Equivalence::Equivalent
        );
        assert_eq!(
            equivalence("2.12.4", "2.12.4+20230101"),
            Equivalence::Equivalent
        );
        assert_eq!(
            equivalence("2.12.4-pre", "2.12.4"),
            Equivalence::Different
        );
    }

    #[test]
    fn test_equivalence_dated_prerelease_requests_are_not_expanded() {
        // A request for a prerelease never matches a dated plain-release key.
        assert_eq!(
            equivalence("2.12.4-pre-20230101", "2.12.4-pre"),
            Equivalence::Different
        );
    }

    #[test]
    fn test_equivalence_zero_version_needs_marker() {
        assert_eq!(
            equivalence("0.0.0-20230101", "2.12.4"),
            Equivalence::IfMarkerMatches {
                tag_date: "20230101".into()
            }
        );
        assert_eq!(equivalence("0.0.0", "2.12.4"), Equivalence::Different);
    }
}
