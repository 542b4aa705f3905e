//! Pack specification parsing.
//!
//! A pack specification looks like `scope/name[@version-range][:path]`. Parsing
//! only checks that the specification is well formed; whether the pack exists is
//! decided by the toolchain when it downloads packs.

use std::sync::LazyLock;

use regex::Regex;
use semver::VersionReq;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// `scope/name`, each component lowercase alphanumeric with internal dashes.
static PACK_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    let component = "[a-z0-9](?:[a-z0-9-]*[a-z0-9])?";
    Regex::new(&format!("^{component}/{component}$")).expect("pack identifier regex is valid")
});

/// A parsed pack specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSpecification {
    /// `scope/name`.
    pub name: String,
    /// Semver range, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Path inside the pack, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PackSpecification {
    /// Parse and validate a pack specification.
    ///
    /// `config_file` is only used for error reporting.
    pub fn parse(spec: &str, config_file: Option<&str>) -> Result<Self> {
        let spec = spec.trim();
        let invalid = || Error::invalid_pack(spec, config_file);

        let at = spec.find('@');
        let colon = match at {
            Some(at) => spec[at..].find(':').map(|i| at + i),
            None => spec.find(':'),
        };

        let name_end = [at, colon]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(spec.len());
        let name = spec[..name_end].trim();

        // An empty range after `@` means no range.
        let version = at
            .map(|at| spec[at + 1..colon.unwrap_or(spec.len())].trim())
            .filter(|version| !version.is_empty());
        let path = colon.map(|colon| spec[colon + 1..].trim());

        if !PACK_IDENTIFIER.is_match(name) {
            return Err(invalid());
        }
        if let Some(version) = version
            && !is_valid_version_range(version)
        {
            return Err(invalid());
        }
        if let Some(path) = path
            && !is_normalized_relative_path(path)
        {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(String::from),
            path: path.map(String::from),
        })
    }

    /// Whether this pack is the given `scope/name`.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }
}

impl std::fmt::Display for PackSpecification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        if let Some(path) = &self.path {
            write!(f, ":{path}")?;
        }
        Ok(())
    }
}

/// Parse a pack specification and return its canonical string form.
pub fn validate_pack_specification(spec: &str, config_file: Option<&str>) -> Result<String> {
    PackSpecification::parse(spec, config_file).map(|p| p.to_string())
}

/// Whether `range` is a valid semver range.
///
/// Accepts npm-style syntax: space separated comparators, `||` alternatives and
/// `a - b` hyphen ranges in addition to what [`VersionReq`] parses directly.
fn is_valid_version_range(range: &str) -> bool {
    if range.is_empty() {
        return false;
    }
    range.split("||").all(|alternative| {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            return false;
        }
        if VersionReq::parse(alternative).is_ok() {
            return true;
        }
        if let Some((low, high)) = alternative.split_once(" - ") {
            return VersionReq::parse(&format!(">={}, <={}", low.trim(), high.trim())).is_ok();
        }
        let comparators: Vec<&str> = alternative.split_whitespace().collect();
        VersionReq::parse(&comparators.join(", ")).is_ok()
    })
}

/// Whether `path` is relative and already in normal form.
///
/// Rejects absolute paths, drive prefixes, backslashes, and `.`, `..` or empty
/// segments, so the path means the same thing on every platform.
fn is_normalized_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    if path.len() >= 2 && path.as_bytes()[1] == b':' {
        return false;
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(spec: &str) -> Result<PackSpecification> {
        PackSpecification::parse(spec, None)
    }

    #[test]
    fn test_parse_full_spec() {
        let pack = parse("a/b@1.2.3:subdir").unwrap();
        assert_eq!(pack.name, "a/b");
        assert_eq!(pack.version.as_deref(), Some("1.2.3"));
        assert_eq!(pack.path.as_deref(), Some("subdir"));
    }

    #[test]
    fn test_parse_name_only_and_partial_forms() {
        assert_eq!(
            parse("codeql/java-queries").unwrap(),
            PackSpecification {
                name: "codeql/java-queries".into(),
                version: None,
                path: None,
            }
        );
        let pack = parse("a/b:some/path").unwrap();
        assert_eq!(pack.version, None);
        assert_eq!(pack.path.as_deref(), Some("some/path"));

        let pack = parse(" a/b @ ~0.4.0 ").unwrap();
        assert_eq!(pack.name, "a/b");
        assert_eq!(pack.version.as_deref(), Some("~0.4.0"));
    }

    #[test]
    fn test_parse_version_ranges() {
        for spec in [
            "a/b@1.2.3",
            "a/b@~1.2.3",
            "a/b@^1.2.3",
            "a/b@*",
            "a/b@>=1.0.0 <2.0.0",
            "a/b@1.0.0 - 2.0.0",
            "a/b@1.x || >=2.5.0",
        ] {
            assert!(parse(spec).is_ok(), "{spec} should be valid");
        }
        for spec in ["a/b@not-a-version", "a/b@1.2.3 ||", "a/b@@1"] {
            assert!(parse(spec).is_err(), "{spec} should be invalid");
        }
    }

    #[test]
    fn test_parse_empty_version_means_any() {
        let pack = parse("a/b@").unwrap();
        assert_eq!(pack.version, None);
        assert_eq!(pack.to_string(), "a/b");

        let pack = parse("a/b @ :x/y").unwrap();
        assert_eq!(pack.version, None);
        assert_eq!(pack.path.as_deref(), Some("x/y"));
        assert_eq!(
            validate_pack_specification("a/b@:x/y", None).unwrap(),
            "a/b:x/y"
        );
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for spec in [
            "",
            "a",
            "a/b/c",
            "-a/b",
            "a-/b",
            "a/-b",
            "A/b",
            "a_b/c",
            "@1.2.3",
            "a/b:path@1.2.3",
        ] {
            assert!(parse(spec).is_err(), "{spec} should be invalid");
        }
        assert!(parse("a-b/c-d").is_ok());
        assert!(parse("0/9").is_ok());
    }

    #[test]
    fn test_parse_rejects_non_normal_paths() {
        for spec in [
            "a/b:/abs/path",
            "a/b:",
            "a/b:../escape",
            "a/b:x/../y",
            "a/b:./x",
            "a/b:x//y",
            "a/b:x\\y",
            "a/b:C:/windows",
        ] {
            assert!(parse(spec).is_err(), "{spec} should be invalid");
        }
        assert!(parse("a/b:x/y/").is_ok());
        assert!(parse("a/b:x/y/z.qls").is_ok());
    }

    #[test]
    fn test_error_names_config_file() {
        let err = PackSpecification::parse("a/b:/abs", Some("codeql.yml")).unwrap_err();
        assert!(matches!(err, Error::InvalidPackSpec { .. }));
        assert!(err.to_string().contains("codeql.yml"));
        assert!(err.to_string().contains("a/b:/abs"));
    }

    #[test]
    fn test_display_round_trips_canonical_form() {
        assert_eq!(
            validate_pack_specification(" a/b @ 1.2.3 : x/y ", None).unwrap(),
            "a/b@1.2.3:x/y"
        );
        assert_eq!(validate_pack_specification("a/b", None).unwrap(), "a/b");
    }
}
