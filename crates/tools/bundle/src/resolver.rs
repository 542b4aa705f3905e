//! Deciding which bundle to use and whether it is already cached.

use std::path::{Path, PathBuf};

use codeql_init_core::{Error, Result};
use codeql_init_core::tools::version::{Equivalence, equivalence, tag_date};
use codeql_init_core::tools::{
    DefaultVersion, DeploymentVariant, ToolVersionTag, normalized_cache_version,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::TOOL_NAME;
use crate::cache::{ToolCache, is_pinned};
use crate::extract::is_tar_gz;
use crate::locator::BundleLocator;

/// The `tools` input, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolsInput {
    /// The newest bundle release.
    Latest,
    /// A bundle archive URL.
    Url(String),
    /// A bundle archive on local disk.
    LocalBundle(PathBuf),
    /// A CLI version such as `2.12.0`.
    Version(String),
}

impl ToolsInput {
    /// Parse the raw input. Missing and blank inputs mean "use the default".
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("latest") {
            return Some(Self::Latest);
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Some(Self::Url(raw.to_string()));
        }
        let path = Path::new(raw);
        if is_tar_gz(path) && path.is_file() {
            return Some(Self::LocalBundle(path.to_path_buf()));
        }
        Some(Self::Version(raw.to_string()))
    }
}

/// Where a bundle is downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// A URL given directly.
    Url(String),
    /// A release tag, located through the [`BundleLocator`].
    Tag(String),
}

/// What the acquirer has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPlan {
    /// A complete cache entry satisfies the request.
    UseToolcache {
        /// Key of the matching entry.
        cache_version: String,
        /// The CLI version if known, otherwise the cache key.
        tool_version: String,
    },
    /// Fetch the bundle and install it under the tag's cache key.
    Download {
        /// Where to fetch from.
        source: BundleSource,
        /// Tag the entry is installed under.
        tag: ToolVersionTag,
    },
    /// Extract a local archive.
    Local {
        /// Path to the archive.
        archive: PathBuf,
        /// Tag derived from the archive name.
        tag: ToolVersionTag,
    },
}

impl ResolvedPlan {
    fn use_toolcache(cache_version: &str, cli_version: Option<&str>) -> Self {
        Self::UseToolcache {
            cache_version: cache_version.to_string(),
            tool_version: cli_version.unwrap_or(cache_version).to_string(),
        }
    }
}

/// Maps the `tools` input onto a [`ResolvedPlan`].
pub struct VersionResolver<'a> {
    cache: &'a ToolCache,
    locator: &'a BundleLocator<'a>,
    default: &'a DefaultVersion,
}

impl<'a> VersionResolver<'a> {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        cache: &'a ToolCache,
        locator: &'a BundleLocator<'a>,
        default: &'a DefaultVersion,
    ) -> Self {
        Self {
            cache,
            locator,
            default,
        }
    }

    /// Decide how to obtain the bundle for `input`.
    pub async fn resolve(&self, input: Option<&ToolsInput>) -> Result<ResolvedPlan> {
        let plan = match input {
            Some(ToolsInput::Url(url)) => self.resolve_url(url).await?,
            Some(ToolsInput::Latest) => self.resolve_latest().await?,
            Some(ToolsInput::Version(version)) => self.resolve_version(version).await?,
            Some(ToolsInput::LocalBundle(archive)) => ResolvedPlan::Local {
                archive: archive.clone(),
                tag: ToolVersionTag::new(local_tag_name(archive)),
            },
            None => self.resolve_default().await?,
        };
        debug!(?plan, "Resolved tools input");
        Ok(plan)
    }

    async fn resolve_url(&self, url: &str) -> Result<ResolvedPlan> {
        let tag_name = tag_from_url(url);
        let mut tag = ToolVersionTag::new(&tag_name);
        if self.locator.is_canonical_download(url)
            && let Some(cli_version) = self.locator.cli_version_for_tag(&tag_name).await?
        {
            tag = tag.with_cli_version(cli_version);
        }
        info!(url, tag = %tag.tag_name, cli_version = ?tag.cli_version, "Using bundle from URL");
        Ok(ResolvedPlan::Download {
            source: BundleSource::Url(url.to_string()),
            tag,
        })
    }

    async fn resolve_latest(&self) -> Result<ResolvedPlan> {
        let tag = self.locator.latest().await?;
        let cache_version = normalized_cache_version(tag.cli_version.as_deref(), &tag.tag_name);
        if self.cache.find(TOOL_NAME, &cache_version).is_some() {
            return Ok(ResolvedPlan::use_toolcache(&cache_version, tag.cli_version.as_deref()));
        }
        Ok(ResolvedPlan::Download {
            source: BundleSource::Tag(tag.tag_name.clone()),
            tag,
        })
    }

    async fn resolve_version(&self, version: &str) -> Result<ResolvedPlan> {
        if let Some(cached) = self.find_equivalent(version, None).await? {
            return Ok(ResolvedPlan::use_toolcache(&cached, Some(version)));
        }
        let tag = self.locator.find_release_for_cli_version(version).await?;
        info!(version, tag = %tag.tag_name, "Found bundle release for CLI version");
        Ok(ResolvedPlan::Download {
            source: BundleSource::Tag(tag.tag_name.clone()),
            tag,
        })
    }

    async fn resolve_default(&self) -> Result<ResolvedPlan> {
        let default = self.default;
        let cache_version = normalized_cache_version(Some(&default.cli_version), &default.tag_name);
        let cached = match self.cache.find(TOOL_NAME, &cache_version) {
            Some(_) => Some(cache_version),
            None => {
                self.find_equivalent(&default.cli_version, Some(&default.tag_name))
                    .await?
            }
        };
        if let Some(cached) = cached {
            return Ok(ResolvedPlan::use_toolcache(&cached, Some(&default.cli_version)));
        }
        if let Some(pinned) = self.pinned_enterprise_bundle() {
            info!(cache_version = %pinned, default = %default.cli_version, "Cached pinned bundle overrides the default");
            return Ok(ResolvedPlan::use_toolcache(&pinned, None));
        }
        Ok(ResolvedPlan::Download {
            source: BundleSource::Tag(default.tag_name.clone()),
            tag: ToolVersionTag::new(&default.tag_name).with_cli_version(&default.cli_version),
        })
    }

    /// On enterprise deployments, the only cached bundle when the instance pinned it.
    fn pinned_enterprise_bundle(&self) -> Option<String> {
        if self.locator.variant() == DeploymentVariant::Dotcom {
            return None;
        }
        let [only] = <[String; 1]>::try_from(self.cache.find_all_versions(TOOL_NAME)).ok()?;
        let dir = self.cache.find(TOOL_NAME, &only)?;
        is_pinned(&dir).then_some(only)
    }

    /// A cached key providing CLI `version`, newest first.
    ///
    /// `0.0.0-{date}` entries need the releases API to confirm which CLI they
    /// ship, unless `known_tag` already has that date.
    async fn find_equivalent(
        &self,
        version: &str,
        known_tag: Option<&str>,
    ) -> Result<Option<String>> {
        let mut unconfirmed = Vec::new();
        for cached in self.cache.find_all_versions(TOOL_NAME).into_iter().rev() {
            match equivalence(&cached, version) {
                Equivalence::Equivalent => return Ok(Some(cached)),
                Equivalence::IfMarkerMatches { tag_date: date } => {
                    if known_tag.is_some_and(|tag| tag_date(tag) == date) {
                        return Ok(Some(cached));
                    }
                    unconfirmed.push((cached, date));
                }
                Equivalence::Different => {}
            }
        }
        if unconfirmed.is_empty() || !self.locator.variant().uses_releases_api() {
            return Ok(None);
        }

        let release = match self.locator.find_release_for_cli_version(version).await {
            Ok(release) => release,
            Err(Error::NotFound { .. }) => {
                debug!(version, "No release carries a marker for this version");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let release_date = tag_date(&release.tag_name);
        Ok(unconfirmed
            .into_iter()
            .find(|(_, date)| *date == release_date)
            .map(|(cached, _)| cached))
    }
}

/// The release tag in a bundle URL.
///
/// Taken from `/releases/download/<tag>/` when present, otherwise from a path
/// segment naming a bundle, otherwise derived from the URL itself.
#[must_use]
pub fn tag_from_url(url: &str) -> String {
    if let Some((_, rest)) = url.split_once("/releases/download/")
        && let Some(tag) = rest.split('/').next()
        && !tag.is_empty()
    {
        return tag.to_string();
    }
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(segment) = without_query.split('/').find(|segment| {
        segment.starts_with(codeql_init_core::tools::version::BUNDLE_TAG_PREFIX)
            && !segment.ends_with(".tar.gz")
            && !segment.ends_with(".tgz")
    }) {
        return segment.to_string();
    }
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("url-{}", &digest[..12])
}

fn local_tag_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".tgz"))
        .unwrap_or(name);
    format!("local-{stem}")
}
