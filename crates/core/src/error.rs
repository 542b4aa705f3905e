//! Error types for toolchain acquisition and configuration building.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for codeql-init operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring the toolchain or building the scan configuration.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The user supplied an invalid input or configuration file.
    #[error("{message}")]
    #[diagnostic(
        code(codeql_init::user_configuration),
        help("Check the workflow inputs and the configuration file")
    )]
    UserConfiguration {
        /// The error message, naming the offending property or input
        message: String,
    },

    /// A pack specification failed to parse.
    #[error("{}", invalid_pack_message(.spec, .config_file.as_deref()))]
    #[diagnostic(
        code(codeql_init::invalid_pack_spec),
        help("Packs must look like scope/name[@version-range][:relative/path]")
    )]
    InvalidPackSpec {
        /// The offending pack string
        spec: String,
        /// The configuration file the pack came from, if any
        config_file: Option<String>,
    },

    /// The requested toolchain cannot be resolved to something usable.
    #[error("{message}")]
    #[diagnostic(code(codeql_init::resolution))]
    Resolution {
        /// The error message
        message: String,
    },

    /// A release or tag does not exist.
    #[error("Not found: {what}")]
    #[diagnostic(
        code(codeql_init::not_found),
        help("Check that the requested tools version or tag exists")
    )]
    NotFound {
        /// Description of what was not found
        what: String,
    },

    /// A network, API, or process failure.
    #[error("{message}")]
    #[diagnostic(code(codeql_init::infrastructure))]
    Infrastructure {
        /// The error message
        message: String,
    },

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(codeql_init::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(codeql_init::json))]
    Json(#[from] serde_json::Error),

    /// Wrapped YAML error.
    #[error("YAML error: {0}")]
    #[diagnostic(code(codeql_init::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

fn invalid_pack_message(spec: &str, config_file: Option<&str>) -> String {
    match config_file {
        Some(file) if !file.is_empty() => property_error(
            Some(file),
            "packs",
            &format!("\"{spec}\" is not a valid pack"),
        ),
        _ => format!("\"{spec}\" is not a valid pack"),
    }
}

/// Formats a property error the same way for workflow inputs and configuration files.
///
/// A `None` configuration file means the property came from a workflow input.
#[must_use]
pub fn property_error(config_file: Option<&str>, property: &str, error: &str) -> String {
    match config_file {
        None => format!("The workflow property \"{property}\" is invalid: {error}"),
        Some(file) => format!(
            "The configuration file \"{file}\" is invalid: property \"{property}\" {error}"
        ),
    }
}

impl Error {
    /// Create a user configuration error.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::UserConfiguration {
            message: message.into(),
        }
    }

    /// Create a user configuration error for a specific property.
    #[must_use]
    pub fn property(config_file: Option<&str>, property: &str, error: &str) -> Self {
        Self::user(property_error(config_file, property, error))
    }

    /// Create an invalid pack specification error.
    #[must_use]
    pub fn invalid_pack(spec: impl Into<String>, config_file: Option<&str>) -> Self {
        Self::InvalidPackSpec {
            spec: spec.into(),
            config_file: config_file.map(String::from),
        }
    }

    /// Create a resolution error.
    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an infrastructure error.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    /// Whether the error is attributable to user input rather than the environment.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::UserConfiguration { .. } | Self::InvalidPackSpec { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_error_workflow() {
        assert_eq!(
            property_error(None, "queries", "must be an array"),
            "The workflow property \"queries\" is invalid: must be an array"
        );
    }

    #[test]
    fn test_property_error_config_file() {
        assert_eq!(
            property_error(Some("codeql.yml"), "paths", "must be an array"),
            "The configuration file \"codeql.yml\" is invalid: property \"paths\" must be an array"
        );
    }

    #[test]
    fn test_invalid_pack_names_config_file() {
        let err = Error::invalid_pack("a/b@x", Some("codeql.yml"));
        let msg = err.to_string();
        assert!(msg.contains("codeql.yml"));
        assert!(msg.contains("\"a/b@x\" is not a valid pack"));

        let err = Error::invalid_pack("a/b@x", None);
        assert_eq!(err.to_string(), "\"a/b@x\" is not a valid pack");
    }

    #[test]
    fn test_user_error_classification() {
        assert!(Error::user("bad").is_user_error());
        assert!(Error::invalid_pack("x", None).is_user_error());
        assert!(!Error::resolution("old").is_user_error());
        assert!(!Error::not_found("tag").is_user_error());
        assert!(!Error::infrastructure("502").is_user_error());
    }
}
