//! The merged scan configuration and its persistence.
//!
//! [`ConfigBuilder`] produces a [`ScanConfig`] once per run and writes it to
//! `{tempDir}/config`. Later steps read it back with [`load`].

mod builder;
mod file;
mod queries;
mod registries;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::augment::{AugmentationProperties, Packs};
use crate::language::Language;

pub use builder::{ConfigBuilder, ConfigInputs};
pub use file::{ConfigLocation, FileConfig};
pub use queries::{BuiltinSuite, QueryUses, query_is_disabled, validate_resolved_queries};
pub use registries::{RegistriesSetup, RegistryConfig, generate_registries, parse_registries};

/// Default name of the debug artifact.
pub const DEFAULT_DEBUG_ARTIFACT_NAME: &str = "debug-artifacts";

/// Default name of the database inside the debug artifact.
pub const DEFAULT_DEBUG_DATABASE_NAME: &str = "db";

/// Queries from a custom location, resolved against `search_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomQueries {
    /// Extra pack search path the queries resolve against.
    pub search_path: PathBuf,
    /// Resolved query files.
    pub queries: Vec<String>,
}

/// Queries to run for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageQueries {
    /// Queries shipped with the toolchain.
    pub builtin: Vec<String>,
    /// Queries from workspace paths or other repositories.
    pub custom: Vec<CustomQueries>,
}

impl LanguageQueries {
    /// Whether any query was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builtin.is_empty() && self.custom.is_empty()
    }
}

/// Queries to run, by language.
pub type QueriesByLanguage = BTreeMap<Language, LanguageQueries>;

/// The final configuration handed to the analysis toolchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Languages to analyse, in order of preference.
    pub languages: Vec<Language>,
    /// Queries to run, by language.
    pub queries: QueriesByLanguage,
    /// Packs to run, by language.
    pub packs: Packs,
    /// Path patterns excluded from analysis.
    pub paths_ignore: Vec<String>,
    /// Path patterns analysis is limited to.
    pub paths: Vec<String>,
    /// The parsed configuration file, or an empty object.
    pub original_user_input: serde_json::Value,
    /// Directory holding this configuration.
    pub temp_dir: PathBuf,
    /// The `codeql` executable.
    #[serde(rename = "codeQLCmd")]
    pub codeql_cmd: PathBuf,
    /// Where databases are created.
    pub db_location: PathBuf,
    /// Upload debug artifacts.
    pub debug_mode: bool,
    /// Name of the debug artifact.
    pub debug_artifact_name: String,
    /// Name of the database in the debug artifact.
    pub debug_database_name: String,
    /// How workflow inputs modified the configuration file.
    pub augmentation_properties: AugmentationProperties,
}

impl ScanConfig {
    /// Whether the language has queries or packs to run.
    #[must_use]
    pub fn has_queries_for(&self, language: Language) -> bool {
        let has_queries = self.queries.get(&language).is_some_and(|q| !q.is_empty());
        let has_packs = self.packs.get(&language).is_some_and(|p| !p.is_empty());
        has_queries || has_packs
    }
}

/// Where the parsed configuration is stored.
#[must_use]
pub fn config_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join("config")
}

/// Where the configuration for toolchains that parse it themselves is written.
#[must_use]
pub fn user_config_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join("user-config.yaml")
}

/// The database location, defaulting to `{tempDir}/codeql_databases`.
#[must_use]
pub fn db_location_or_default(db_location: Option<&Path>, temp_dir: &Path) -> PathBuf {
    db_location.map_or_else(|| temp_dir.join("codeql_databases"), Path::to_path_buf)
}

/// Persist the configuration to `{tempDir}/config`.
pub fn save(config: &ScanConfig) -> Result<PathBuf> {
    let path = config_path(&config.temp_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string(config)?;
    std::fs::write(&path, &contents)?;
    debug!(path = %path.display(), config = %contents, "Saved config");
    Ok(path)
}

/// Read the configuration saved in `temp_dir`, if there is one.
pub fn load(temp_dir: &Path) -> Result<Option<ScanConfig>> {
    let path = config_path(temp_dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    debug!(path = %path.display(), config = %contents, "Loaded config");
    Ok(Some(serde_json::from_str(&contents)?))
}
