//! Languages the toolchain can analyse.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A language supported by the analysis toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// `cpp`.
    Cpp,
    /// `csharp`.
    Csharp,
    /// `go`.
    Go,
    /// `java`.
    Java,
    /// `javascript`.
    Javascript,
    /// `python`.
    Python,
    /// `ruby`.
    Ruby,
    /// `swift`.
    Swift,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Self; 8] = [
        Self::Cpp,
        Self::Csharp,
        Self::Go,
        Self::Java,
        Self::Javascript,
        Self::Python,
        Self::Ruby,
        Self::Swift,
    ];

    /// Parse a language name or alias, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpp" | "c" | "c++" => Some(Self::Cpp),
            "csharp" | "c#" => Some(Self::Csharp),
            "go" => Some(Self::Go),
            "java" | "kotlin" => Some(Self::Java),
            "javascript" | "typescript" => Some(Self::Javascript),
            "python" => Some(Self::Python),
            "ruby" => Some(Self::Ruby),
            "swift" => Some(Self::Swift),
            _ => None,
        }
    }

    /// The identifier the toolchain uses for this language.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Csharp => "csharp",
            Self::Go => "go",
            Self::Java => "java",
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Ruby => "ruby",
            Self::Swift => "swift",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a list of language tokens.
///
/// Duplicates are removed keeping first occurrence. Every unrecognised token is
/// collected and reported in a single error.
pub fn parse_languages<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Language>> {
    let mut parsed = Vec::new();
    let mut unknown = Vec::new();
    for token in tokens {
        let token = token.as_ref();
        match Language::parse(token) {
            Some(language) if !parsed.contains(&language) => parsed.push(language),
            Some(_) => {}
            None => unknown.push(token.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(Error::user(unknown_languages_error(&unknown)));
    }
    Ok(parsed)
}

/// Message used when no languages could be determined.
#[must_use]
pub fn no_languages_error() -> String {
    "Did not detect any languages to analyze. Please update input in workflow or check that \
     the repository's detected languages are correct."
        .to_string()
}

/// Message used when some languages are not recognised.
#[must_use]
pub fn unknown_languages_error(languages: &[String]) -> String {
    format!(
        "Did not recognise the following languages: {}",
        languages.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_names() {
        for language in Language::ALL {
            assert_eq!(Language::parse(language.as_str()), Some(language));
        }
    }

    #[test]
    fn test_parse_aliases_case_insensitive() {
        assert_eq!(Language::parse("C++"), Some(Language::Cpp));
        assert_eq!(Language::parse("c"), Some(Language::Cpp));
        assert_eq!(Language::parse("C#"), Some(Language::Csharp));
        assert_eq!(Language::parse("TypeScript"), Some(Language::Javascript));
        assert_eq!(Language::parse("JavaScript"), Some(Language::Javascript));
        assert_eq!(Language::parse("Kotlin"), Some(Language::Java));
        assert_eq!(Language::parse(" python "), Some(Language::Python));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Language::parse("Unknown"), None);
        assert_eq!(Language::parse("HTML"), None);
        assert_eq!(Language::parse(""), None);
    }

    #[test]
    fn test_parse_languages_dedupes_in_order() {
        let langs = parse_languages(&["typescript", "python", "javascript"]).unwrap();
        assert_eq!(langs, vec![Language::Javascript, Language::Python]);
    }

    #[test]
    fn test_parse_languages_reports_all_unknown() {
        let err = parse_languages(&["rust", "python", "cobol"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Did not recognise the following languages: rust, cobol"
        );
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Language::Csharp).unwrap();
        assert_eq!(json, "\"csharp\"");
        let lang: Language = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(lang, Language::Javascript);
    }
}
