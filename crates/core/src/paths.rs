//! Validation of `paths` and `paths-ignore` filter entries.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::property_error;
use crate::{Error, Result};

/// `**` is only allowed when immediately preceded and followed by a slash,
/// or at the start or end of the pattern.
static PATH_STARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".*(?:\*\*[^/].*|\*\*$|[^/]\*\*.*)").expect("path stars regex is valid")
});

/// Filter pattern characters that are matched literally rather than as patterns.
static FILTER_PATTERN_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*[?+\[\]!].*").expect("filter pattern regex is valid"));

/// Validate a path filter entry, sanitising it where possible.
///
/// Leading slashes and a trailing `/**` are stripped. Empty
/// results, misplaced `**` and backslashes are rejected. Unsupported filter
/// characters only produce a warning.
pub fn validate_and_sanitise_path(
    original: &str,
    property: &str,
    config_file: Option<&str>,
) -> Result<String> {
    let mut path = original.trim_start_matches('/');
    if let Some(stripped) = path.strip_suffix("/**") {
        path = stripped;
    }

    if path.is_empty() {
        return Err(Error::property(
            config_file,
            property,
            &format!(
                "\"{original}\" is not an invalid path. It is not necessary to include it, \
                 and it is not allowed to exclude it."
            ),
        ));
    }

    if PATH_STARS.is_match(path) {
        return Err(Error::property(
            config_file,
            property,
            &format!(
                "\"{original}\" contains an invalid \"**\" wildcard. They must be immediately \
                 preceded and followed by a slash as in \"/**/\", or come at the start or end."
            ),
        ));
    }

    if FILTER_PATTERN_CHARACTERS.is_match(path) {
        warn!(
            "{}",
            property_error(
                config_file,
                property,
                &format!(
                    "\"{original}\" contains an unsupported character. The filter pattern \
                     characters ?, +, [, ], ! are not supported and will be matched literally."
                ),
            )
        );
    }

    if path.contains('\\') {
        return Err(Error::property(
            config_file,
            property,
            &format!(
                "\"{original}\" contains an \"\\\" character. These are not allowed in filters. \
                 If running on windows we recommend using \"/\" instead for path filters."
            ),
        ));
    }

    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitise(path: &str) -> Result<String> {
        validate_and_sanitise_path(path, "paths", Some("codeql.yml"))
    }

    #[test]
    fn test_valid_paths_unchanged() {
        for path in ["foo", "foo/", "foo/bar", "**/foo", "foo/**/bar", "foo/**/"] {
            assert_eq!(sanitise(path).unwrap(), path);
        }
    }

    #[test]
    fn test_leading_slashes_and_trailing_stars_stripped() {
        assert_eq!(sanitise("/foo").unwrap(), "foo");
        assert_eq!(sanitise("///foo/bar").unwrap(), "foo/bar");
        assert_eq!(sanitise("foo/**").unwrap(), "foo");
        assert_eq!(sanitise("/src/**").unwrap(), "src");
    }

    #[test]
    fn test_empty_after_sanitising_rejected() {
        for path in ["/", "//", "///"] {
            let err = sanitise(path).unwrap_err();
            assert!(err.to_string().contains("is not an invalid path"), "{path}");
        }
    }

    #[test]
    fn test_misplaced_double_star_rejected() {
        for path in ["foo**bar", "foo**", "**foo", "foo/**bar", "foo**/bar"] {
            let err = sanitise(path).unwrap_err();
            assert!(err.to_string().contains("invalid \"**\" wildcard"), "{path}");
        }
    }

    #[test]
    fn test_backslash_rejected() {
        let err = sanitise("foo\\bar").unwrap_err();
        assert!(err.to_string().contains("\"\\\" character"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_unsupported_characters_warn_only() {
        assert_eq!(sanitise("foo?").unwrap(), "foo?");
        assert_eq!(sanitise("foo[bar]").unwrap(), "foo[bar]");
        assert_eq!(sanitise("!foo").unwrap(), "!foo");
    }

    #[test]
    fn test_error_names_property_and_file() {
        let err = validate_and_sanitise_path("a**b", "paths-ignore", None).unwrap_err();
        assert!(err.to_string().starts_with("The workflow property \"paths-ignore\""));
    }
}
