//! Query selection: parsing `uses` entries and resolving them through the toolchain.

use std::path::Path;

use tracing::{debug, warn};

use super::{CustomQueries, QueriesByLanguage};
use crate::error::property_error;
use crate::host::{RepositoryHost, RepositoryNwo};
use crate::language::Language;
use crate::toolchain::{ResolvedQueries, Toolchain};
use crate::{Error, Result};

const QUERY_USES_PROPERTY: &str = "queries.uses";

/// Built-in queries that are never run, as path suffixes per language.
const DISABLED_BUILTIN_QUERIES: &[(Language, &[&str])] = &[(
    Language::Csharp,
    &[
        "ql/src/Security Features/CWE-937/VulnerablePackage.ql",
        "ql/src/Security Features/CWE-451/MissingXFrameOptions.ql",
    ],
)];

/// Whether a resolved built-in query is on the disabled list.
#[must_use]
pub fn query_is_disabled(language: Language, query: &str) -> bool {
    DISABLED_BUILTIN_QUERIES
        .iter()
        .filter(|(lang, _)| *lang == language)
        .flat_map(|(_, suffixes)| suffixes.iter())
        .any(|suffix| query.ends_with(suffix))
}

/// A query suite shipped with the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinSuite {
    /// `security-experimental`.
    SecurityExperimental,
    /// `security-extended`.
    SecurityExtended,
    /// `security-and-quality`.
    SecurityAndQuality,
}

impl BuiltinSuite {
    /// All suites that may be named in `uses`.
    pub const ALL: [Self; 3] = [
        Self::SecurityExperimental,
        Self::SecurityExtended,
        Self::SecurityAndQuality,
    ];

    /// Parse a suite name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|suite| suite.as_str() == s)
    }

    /// The suite name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SecurityExperimental => "security-experimental",
            Self::SecurityExtended => "security-extended",
            Self::SecurityAndQuality => "security-and-quality",
        }
    }

    /// The suite file for a language.
    #[must_use]
    pub fn suite_file(self, language: Language) -> String {
        format!("{language}-{}.qls", self.as_str())
    }
}

impl std::fmt::Display for BuiltinSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `uses` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryUses {
    /// A suite shipped with the toolchain.
    BuiltinSuite(BuiltinSuite),
    /// A path relative to the workspace, without the leading `./`.
    Local(String),
    /// Queries in another repository.
    Remote {
        /// `owner/repo`.
        repository: RepositoryNwo,
        /// Directory or file inside the repository.
        path: Option<String>,
        /// Git ref to check out.
        reference: String,
    },
}

fn query_uses_invalid(config_file: Option<&str>, found: Option<&str>) -> Error {
    let suites = BuiltinSuite::ALL.map(BuiltinSuite::as_str).join(" or ");
    let mut message = format!(
        "must be a built-in suite ({suites}), a relative path, or be of the form \"owner/repo[/path]@ref\""
    );
    if let Some(found) = found {
        message.push_str(&format!("\n Found: {found}"));
    }
    Error::user(property_error(config_file, QUERY_USES_PROPERTY, &message))
}

impl QueryUses {
    /// Parse a `uses` value.
    ///
    /// `./path` is local, a bare word is a built-in suite, and anything else
    /// must be `owner/repo[/path]@ref`.
    pub fn parse(uses: &str, config_file: Option<&str>) -> Result<Self> {
        let uses = uses.trim();
        if uses.is_empty() {
            return Err(query_uses_invalid(config_file, None));
        }
        if let Some(local) = uses.strip_prefix("./") {
            return Ok(Self::Local(local.to_string()));
        }
        if !uses.contains('/') && !uses.contains('@') {
            return BuiltinSuite::parse(uses)
                .map(Self::BuiltinSuite)
                .ok_or_else(|| query_uses_invalid(config_file, Some(uses)));
        }

        let invalid = || query_uses_invalid(config_file, Some(uses));
        let mut parts = uses.split('@');
        let (Some(location), Some(reference), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let segments: Vec<&str> = location.split('/').collect();
        let [owner, repo, rest @ ..] = segments.as_slice() else {
            return Err(invalid());
        };
        if owner.trim().is_empty() || repo.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self::Remote {
            repository: RepositoryNwo {
                owner: (*owner).to_string(),
                repo: (*repo).to_string(),
            },
            path: (!rest.is_empty()).then(|| rest.join("/")),
            reference: reference.to_string(),
        })
    }
}

/// Reject custom queries whose language is missing or ambiguous.
///
/// All offending queries are reported in one error.
pub fn validate_resolved_queries(resolved: &ResolvedQueries) -> Result<()> {
    let mut problems = Vec::new();
    if !resolved.no_declared_language.is_empty() {
        problems.push(format!(
            "The following queries do not declare a language. Their qlpack.yml files are either \
             missing or is invalid.\n{}",
            resolved
                .no_declared_language
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    if !resolved.multiple_declared_languages.is_empty() {
        problems.push(format!(
            "The following queries declare multiple languages. Their qlpack.yml files are either \
             missing or is invalid.\n{}",
            resolved
                .multiple_declared_languages
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::user(problems.join("\n")))
    }
}

/// Resolve `to_resolve` and record the results.
///
/// Without a search path the queries are built-in: they land in `builtin` and
/// are not validated. With one they are custom and must each declare exactly
/// one language.
pub(crate) async fn run_resolve_queries(
    toolchain: &dyn Toolchain,
    result: &mut QueriesByLanguage,
    to_resolve: &[String],
    extra_search_path: Option<&Path>,
) -> Result<()> {
    debug!(queries = ?to_resolve, search_path = ?extra_search_path, "Resolving queries");
    let resolved = toolchain.resolve_queries(to_resolve, extra_search_path).await?;
    if extra_search_path.is_some() {
        validate_resolved_queries(&resolved)?;
    }

    for (language, query_paths) in resolved.by_language {
        let Some(language) = Language::parse(&language) else {
            warn!(language = %language, "Ignoring queries for unsupported language");
            continue;
        };
        let queries: Vec<String> = query_paths
            .into_keys()
            .filter(|query| !query_is_disabled(language, query))
            .collect();
        let entry = result.entry(language).or_default();
        match extra_search_path {
            Some(search_path) => entry.custom.push(CustomQueries {
                search_path: search_path.to_path_buf(),
                queries,
            }),
            None => entry.builtin.extend(queries),
        }
    }
    Ok(())
}

/// The default code scanning suite of every language.
pub(crate) async fn add_default_queries(
    toolchain: &dyn Toolchain,
    languages: &[Language],
    result: &mut QueriesByLanguage,
) -> Result<()> {
    let suites: Vec<String> = languages
        .iter()
        .map(|language| format!("{language}-code-scanning.qls"))
        .collect();
    run_resolve_queries(toolchain, result, &suites, None).await
}

/// Queries at a path inside the workspace.
///
/// The path must exist and, after resolving symlinks, stay inside the workspace.
pub(crate) async fn add_local_queries(
    toolchain: &dyn Toolchain,
    result: &mut QueriesByLanguage,
    local_path: &str,
    workspace: &Path,
    config_file: Option<&str>,
) -> Result<()> {
    let absolute = workspace.join(local_path);
    if !absolute.exists() {
        return Err(Error::property(
            config_file,
            QUERY_USES_PROPERTY,
            &format!("is invalid as the local path \"{local_path}\" does not exist in the repository"),
        ));
    }
    let absolute = tokio::fs::canonicalize(&absolute).await?;
    let root = tokio::fs::canonicalize(workspace).await?;
    if !absolute.starts_with(&root) {
        return Err(Error::property(
            config_file,
            QUERY_USES_PROPERTY,
            &format!("is invalid as the local path \"{local_path}\" is outside of the repository"),
        ));
    }
    run_resolve_queries(
        toolchain,
        result,
        &[absolute.display().to_string()],
        Some(workspace),
    )
    .await
}

/// Queries from a checkout of another repository.
pub(crate) async fn add_remote_queries(
    toolchain: &dyn Toolchain,
    host: &dyn RepositoryHost,
    result: &mut QueriesByLanguage,
    repository: &RepositoryNwo,
    path: Option<&str>,
    reference: &str,
    temp_dir: &Path,
) -> Result<()> {
    let checkout = host.checkout(repository, reference, temp_dir).await?;
    let query_path = path.map_or_else(|| checkout.clone(), |path| checkout.join(path));
    run_resolve_queries(
        toolchain,
        result,
        &[query_path.display().to_string()],
        Some(&checkout),
    )
    .await
}
