//! The analysis toolchain as seen by configuration building.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{EnvOverlay, Result};

/// First CLI version able to parse the scan configuration itself.
pub const CODEQL_VERSION_CONFIG_FILES: &str = "2.11.6";

/// First CLI version shipping the `security-experimental` suite.
pub const CODEQL_VERSION_SECURITY_EXPERIMENTAL_SUITE: &str = "2.12.1";

/// First CLI version supporting pack downloads from custom registries.
pub const CODEQL_VERSION_GHES_PACK_DOWNLOAD: &str = "2.10.4";

/// First CLI version that can run ML-powered queries on Windows.
pub const CODEQL_VERSION_ML_POWERED_QUERIES_WINDOWS: &str = "2.9.0";

/// Output of resolving a set of query specifiers.
///
/// Each map is keyed by query path; values carry whatever metadata the
/// toolchain reported and are not interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedQueries {
    /// Queries declaring exactly one language.
    #[serde(default)]
    pub by_language: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    /// Queries without a language.
    #[serde(default)]
    pub no_declared_language: BTreeMap<String, serde_json::Value>,
    /// Queries declaring several languages.
    #[serde(default)]
    pub multiple_declared_languages: BTreeMap<String, serde_json::Value>,
}

/// A pack fetched by [`Toolchain::pack_download`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedPack {
    /// `scope/name`.
    pub name: String,
    /// Resolved version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Output of [`Toolchain::pack_download`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackDownloadOutput {
    /// Every pack that was fetched.
    #[serde(default)]
    pub packs: Vec<DownloadedPack>,
}

/// Subcommands of the analysis toolchain used while building the configuration.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Path to the toolchain executable.
    fn path(&self) -> &Path;

    /// The CLI version, e.g. `2.12.4`.
    async fn version(&self) -> Result<String>;

    /// Languages the toolchain has extractors for, mapped to extractor locations.
    async fn resolve_languages(&self) -> Result<BTreeMap<String, Vec<PathBuf>>>;

    /// Resolve query specifiers (suites, files, directories) to individual queries.
    async fn resolve_queries(
        &self,
        queries: &[String],
        extra_search_path: Option<&Path>,
    ) -> Result<ResolvedQueries>;

    /// Download the given packs.
    ///
    /// `env` is applied to the spawned process only.
    async fn pack_download(
        &self,
        packs: &[String],
        qlconfig_file: Option<&Path>,
        env: &EnvOverlay,
    ) -> Result<PackDownloadOutput>;
}

/// Whether `version` is at least `minimum`. Unparseable versions compare as older.
#[must_use]
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    match (Version::parse(version), Version::parse(minimum)) {
        (Ok(version), Ok(minimum)) => version >= minimum,
        _ => false,
    }
}

/// Whether the toolchain's CLI version is at least `minimum`.
pub async fn toolchain_version_at_least(toolchain: &dyn Toolchain, minimum: &str) -> Result<bool> {
    Ok(version_at_least(&toolchain.version().await?, minimum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("2.11.6", CODEQL_VERSION_CONFIG_FILES));
        assert!(version_at_least("2.12.0", CODEQL_VERSION_CONFIG_FILES));
        assert!(!version_at_least("2.11.5", CODEQL_VERSION_CONFIG_FILES));
        assert!(!version_at_least("2.11.6-pre", CODEQL_VERSION_CONFIG_FILES));
        assert!(!version_at_least("garbage", CODEQL_VERSION_CONFIG_FILES));
    }

    #[test]
    fn test_resolved_queries_camel_case() {
        let json = r#"{
            "byLanguage": {"javascript": {"/q/a.ql": {}}},
            "noDeclaredLanguage": {},
            "multipleDeclaredLanguages": {"/q/b.ql": {}}
        }"#;
        let resolved: ResolvedQueries = serde_json::from_str(json).unwrap();
        assert!(resolved.by_language["javascript"].contains_key("/q/a.ql"));
        assert!(resolved.no_declared_language.is_empty());
        assert_eq!(resolved.multiple_declared_languages.len(), 1);
    }

    #[test]
    fn test_pack_download_output_missing_version() {
        let output: PackDownloadOutput =
            serde_json::from_str(r#"{"packs": [{"name": "a/b"}]}"#).unwrap();
        assert_eq!(output.packs[0].version, None);
    }
}
