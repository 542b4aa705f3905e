//! Locating, loading and validating the configuration file.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::host::{RemoteFile, RepositoryHost};
use crate::paths::validate_and_sanitise_path;
use crate::{Error, Result};

static REMOTE_CONFIG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<owner>[^/]+)/(?P<repo>[^/]+)/(?P<path>[^@]+)@(?P<ref>.*)$")
        .expect("remote config regex is valid")
});

const NAME_PROPERTY: &str = "name";
const DISABLE_DEFAULT_QUERIES_PROPERTY: &str = "disable-default-queries";
const QUERIES_PROPERTY: &str = "queries";
const QUERIES_USES_PROPERTY: &str = "uses";
const PATHS_IGNORE_PROPERTY: &str = "paths-ignore";
const PATHS_PROPERTY: &str = "paths";
const PACKS_PROPERTY: &str = "packs";
const THREAT_MODELS_PROPERTY: &str = "threat-models";

/// Where the configuration file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// A file inside the workspace, already resolved against it.
    Local(PathBuf),
    /// `owner/repo/path@ref` in a hosted repository.
    Remote(RemoteFile),
}

impl ConfigLocation {
    /// Interpret the `config-file` input.
    ///
    /// Inputs starting with `./` or without an `@` are local paths relative to
    /// the workspace. Everything else must be a remote reference.
    pub fn parse(input: &str, workspace: &Path) -> Result<Self> {
        if input.starts_with("./") || !input.contains('@') {
            return Ok(Self::Local(normalize(&workspace.join(input))));
        }
        let captures = REMOTE_CONFIG.captures(input).ok_or_else(|| {
            Error::user(format!(
                "The configuration file \"{input}\" is not a supported remote file reference. \
                 Expected format <owner>/<repository>/<file-path>@<ref>"
            ))
        })?;
        Ok(Self::Remote(RemoteFile {
            owner: captures["owner"].to_string(),
            repo: captures["repo"].to_string(),
            path: captures["path"].to_string(),
            reference: captures["ref"].to_string(),
        }))
    }

    /// Name used for the file in error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(file) => file.to_string(),
        }
    }

    /// Read and parse the configuration file.
    pub async fn load(&self, workspace: &Path, host: &dyn RepositoryHost) -> Result<FileConfig> {
        let contents = match self {
            Self::Local(path) => {
                let workspace = normalize(workspace);
                if !path.starts_with(&workspace) {
                    return Err(Error::user(format!(
                        "The configuration file \"{}\" is outside of the workspace",
                        path.display()
                    )));
                }
                if !path.exists() {
                    return Err(Error::user(format!(
                        "The configuration file \"{}\" does not exist",
                        path.display()
                    )));
                }
                tokio::fs::read_to_string(path).await?
            }
            Self::Remote(file) => host.file_contents(file).await?,
        };
        debug!(config_file = %self.display_name(), "Loaded configuration file");
        FileConfig::parse(&contents, self.display_name())
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// A parsed configuration file, with typed accessors that validate each property.
#[derive(Debug, Clone, PartialEq)]
pub struct FileConfig {
    name: Option<String>,
    raw: Map<String, Value>,
}

impl FileConfig {
    /// An empty configuration, used when no file was given.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            name: None,
            raw: Map::new(),
        }
    }

    /// Parse YAML contents. `name` identifies the file in error messages.
    pub fn parse(contents: &str, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value: Value = if contents.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(contents)?
        };
        let raw = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(Error::user(format!(
                    "The configuration file \"{name}\" could not be read"
                )));
            }
        };
        let config = Self {
            name: Some(name),
            raw,
        };
        config.validate_name()?;
        Ok(config)
    }

    /// The file name for error messages, `None` when there is no file.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The parsed contents as JSON.
    #[must_use]
    pub fn original_input(&self) -> Value {
        Value::Object(self.raw.clone())
    }

    /// The raw value of a property.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.raw.get(property)
    }

    /// The raw `packs` property.
    #[must_use]
    pub fn packs(&self) -> Option<&Value> {
        self.get(PACKS_PROPERTY)
    }

    fn invalid(&self, property: &str, error: &str) -> Error {
        Error::property(self.file_name(), property, error)
    }

    fn validate_name(&self) -> Result<()> {
        match self.get(NAME_PROPERTY) {
            None => Ok(()),
            Some(Value::String(name)) if !name.is_empty() => Ok(()),
            Some(_) => Err(self.invalid(NAME_PROPERTY, "must be a non-empty string")),
        }
    }

    /// `disable-default-queries`, defaulting to `false`.
    pub fn disable_default_queries(&self) -> Result<bool> {
        match self.get(DISABLE_DEFAULT_QUERIES_PROPERTY) {
            None => Ok(false),
            Some(Value::Bool(disable)) => Ok(*disable),
            Some(_) => Err(self.invalid(DISABLE_DEFAULT_QUERIES_PROPERTY, "must be a boolean")),
        }
    }

    /// The `uses` value of every `queries` entry.
    pub fn query_uses(&self) -> Result<Vec<String>> {
        let Some(queries) = self.get(QUERIES_PROPERTY) else {
            return Ok(Vec::new());
        };
        let Value::Array(queries) = queries else {
            return Err(self.invalid(QUERIES_PROPERTY, "must be an array"));
        };
        queries
            .iter()
            .map(|query| match query.get(QUERIES_USES_PROPERTY) {
                Some(Value::String(uses)) => Ok(uses.clone()),
                _ => Err(self.invalid(
                    QUERIES_PROPERTY,
                    "must be an array, with each entry having a 'uses' property",
                )),
            })
            .collect()
    }

    /// Whether the file declares `queries`.
    #[must_use]
    pub fn has_queries(&self) -> bool {
        self.raw.contains_key(QUERIES_PROPERTY)
    }

    /// Sanitised `paths-ignore` entries.
    pub fn paths_ignore(&self) -> Result<Vec<String>> {
        self.path_filters(PATHS_IGNORE_PROPERTY)
    }

    /// Sanitised `paths` entries.
    pub fn paths(&self) -> Result<Vec<String>> {
        self.path_filters(PATHS_PROPERTY)
    }

    fn path_filters(&self, property: &str) -> Result<Vec<String>> {
        let Some(value) = self.get(property) else {
            return Ok(Vec::new());
        };
        let invalid = || self.invalid(property, "must be an array of non-empty strings");
        let Value::Array(entries) = value else {
            return Err(invalid());
        };
        entries
            .iter()
            .map(|entry| match entry {
                Value::String(path) if !path.is_empty() => {
                    validate_and_sanitise_path(path, property, self.file_name())
                }
                _ => Err(invalid()),
            })
            .collect()
    }

    /// `threat-models` entries.
    pub fn threat_models(&self) -> Result<Vec<String>> {
        let Some(value) = self.get(THREAT_MODELS_PROPERTY) else {
            return Ok(Vec::new());
        };
        let invalid = || self.invalid(THREAT_MODELS_PROPERTY, "must be an array of non-empty strings");
        let Value::Array(entries) = value else {
            return Err(invalid());
        };
        entries
            .iter()
            .map(|entry| match entry {
                Value::String(model) if !model.is_empty() => Ok(model.clone()),
                _ => Err(invalid()),
            })
            .collect()
    }
}
