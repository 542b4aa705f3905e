//! Bundle acquisition: resolve, check the cache, and fetch on a miss.

use std::path::{Path, PathBuf};
use std::time::Instant;

use codeql_init_core::tools::{
    DefaultVersion, Platform, ToolHandle, ToolSource, ToolVersionTag, normalized_cache_version,
};
use codeql_init_core::{Error, Result};
use tracing::{debug, info};

use crate::TOOL_NAME;
use crate::api::ReleaseApi;
use crate::cache::{ToolCache, is_pinned};
use crate::extract::{compute_file_sha256, extract_tar_gz};
use crate::locator::BundleLocator;
use crate::resolver::{BundleSource, ResolvedPlan, ToolsInput, VersionResolver};

/// Steps of an acquisition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Mapping the input onto a plan.
    Resolve,
    /// Looking for a matching tool cache entry.
    CacheCheck,
    /// Finding the download URL for a release tag.
    Locate,
    /// Fetching the archive.
    Download,
    /// Unpacking into the staging directory.
    Extract,
    /// Moving the staged bundle into the tool cache.
    Install,
    /// The toolchain is ready.
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::CacheCheck => "cache-check",
            Self::Locate => "locate",
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Install => "install",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// The result of an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredBundle {
    /// The installed toolchain.
    pub handle: ToolHandle,
    /// Key of the tool cache entry holding the bundle.
    pub cache_version: String,
    /// Whether this is the platform default bundle.
    pub is_default_bundle: bool,
    /// Whether the bundle is pinned by the instance.
    pub pinned: bool,
}

/// Drives a bundle from the `tools` input to an installed [`ToolHandle`].
pub struct Acquirer<'a> {
    api: &'a dyn ReleaseApi,
    locator: &'a BundleLocator<'a>,
    cache: &'a ToolCache,
    default: &'a DefaultVersion,
    platform: Platform,
    temp_dir: PathBuf,
}

impl<'a> Acquirer<'a> {
    /// Create an acquirer. Downloaded archives are written to `temp_dir`.
    #[must_use]
    pub fn new(
        api: &'a dyn ReleaseApi,
        locator: &'a BundleLocator<'a>,
        cache: &'a ToolCache,
        default: &'a DefaultVersion,
        platform: Platform,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            locator,
            cache,
            default,
            platform,
            temp_dir: temp_dir.into(),
        }
    }

    /// Acquire the bundle requested by `input`.
    pub async fn acquire(&self, input: Option<&ToolsInput>) -> Result<AcquiredBundle> {
        enter(Stage::Resolve);
        let plan = VersionResolver::new(self.cache, self.locator, self.default)
            .resolve(input)
            .await?;

        enter(Stage::CacheCheck);
        let acquired = match plan {
            ResolvedPlan::UseToolcache {
                cache_version,
                tool_version,
            } => {
                let dir = self.cache.find(TOOL_NAME, &cache_version).ok_or_else(|| {
                    Error::not_found(format!("tool cache entry {cache_version}"))
                })?;
                info!(version = %tool_version, cache_version = %cache_version, "Using bundle from tool cache");
                AcquiredBundle {
                    handle: ToolHandle {
                        path: self.executable(&dir)?,
                        version: tool_version,
                        source: ToolSource::Toolcache,
                        download_duration_ms: None,
                    },
                    is_default_bundle: cache_version == self.default_cache_version(),
                    pinned: is_pinned(&dir),
                    cache_version,
                }
            }
            ResolvedPlan::Download { source, tag } => self.download(source, tag).await?,
            ResolvedPlan::Local { archive, tag } => self.install_local(&archive, &tag).await?,
        };

        enter(Stage::Done);
        info!(
            path = %acquired.handle.path.display(),
            version = %acquired.handle.version,
            source = %acquired.handle.source,
            "Bundle ready"
        );
        Ok(acquired)
    }

    async fn download(&self, source: BundleSource, tag: ToolVersionTag) -> Result<AcquiredBundle> {
        enter(Stage::Locate);
        let (url, tag) = match source {
            BundleSource::Url(url) => (url, tag),
            BundleSource::Tag(tag_name) => {
                let located = self.locator.locate(&tag_name).await?;
                let tag = match (tag.cli_version, located.tag.cli_version) {
                    (Some(cli_version), _) | (None, Some(cli_version)) => {
                        ToolVersionTag::new(tag_name).with_cli_version(cli_version)
                    }
                    (None, None) => ToolVersionTag::new(tag_name),
                };
                (located.url, tag)
            }
        };
        let cache_version = normalized_cache_version(tag.cli_version.as_deref(), &tag.tag_name);

        enter(Stage::Download);
        info!(%url, tag = %tag.tag_name, "Downloading bundle");
        let started = Instant::now();
        let data = self.api.download(&url).await?;
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let archive = self.temp_dir.join(format!("{cache_version}.tar.gz"));
        tokio::fs::write(&archive, &data).await?;
        let sha256 = compute_file_sha256(&archive).await?;
        info!(%sha256, bytes = data.len(), "Downloaded bundle");

        let installed = self.extract_and_install(&archive, &cache_version).await;
        tokio::fs::remove_file(&archive).await?;
        let (dir, path) = installed?;
        let download_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let pinned = is_pinned(&dir);
        info!(%cache_version, pinned, "Classified downloaded bundle");

        Ok(AcquiredBundle {
            handle: ToolHandle {
                path,
                version: tag.cli_version.clone().unwrap_or_else(|| cache_version.clone()),
                source: ToolSource::Download,
                download_duration_ms: Some(download_duration_ms),
            },
            is_default_bundle: BundleLocator::is_default_bundle(&tag.tag_name, self.default),
            pinned,
            cache_version,
        })
    }

    async fn install_local(&self, archive: &Path, tag: &ToolVersionTag) -> Result<AcquiredBundle> {
        let cache_version = normalized_cache_version(None, &tag.tag_name);
        info!(archive = %archive.display(), %cache_version, "Using local bundle");
        let (dir, path) = self.extract_and_install(archive, &cache_version).await?;
        Ok(AcquiredBundle {
            handle: ToolHandle {
                path,
                version: cache_version.clone(),
                source: ToolSource::Local,
                download_duration_ms: None,
            },
            is_default_bundle: false,
            pinned: is_pinned(&dir),
            cache_version,
        })
    }

    /// Extract `archive` into staging and install it once it holds an executable.
    ///
    /// Returns the cache entry and the executable inside it. Nothing is left in
    /// the cache when extraction or the executable check fails.
    async fn extract_and_install(
        &self,
        archive: &Path,
        cache_version: &str,
    ) -> Result<(PathBuf, PathBuf)> {
        enter(Stage::Extract);
        let staging = self.cache.staging_dir(TOOL_NAME, cache_version);
        let source = archive.to_path_buf();
        let dest = staging.clone();
        let staged = tokio::task::spawn_blocking(move || extract_tar_gz(&source, &dest))
            .await
            .map_err(|e| Error::infrastructure(format!("Extraction task failed: {e}")))
            .and_then(|extracted| extracted)
            .and_then(|()| self.executable(&staging).map(|_| ()));
        if let Err(e) = staged {
            if staging.exists() {
                debug!(?staging, "Removing rejected staging directory");
                tokio::fs::remove_dir_all(&staging).await?;
            }
            return Err(e);
        }

        enter(Stage::Install);
        let dir = self.cache.install(TOOL_NAME, cache_version, &staging)?;
        let path = self.executable(&dir)?;
        Ok((dir, path))
    }

    fn executable(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("codeql").join(self.platform.executable_name());
        if !path.is_file() {
            return Err(Error::resolution(format!(
                "Bundle at {} does not contain {}",
                dir.display(),
                Path::new("codeql").join(self.platform.executable_name()).display()
            )));
        }
        Ok(path)
    }

    fn default_cache_version(&self) -> String {
        normalized_cache_version(Some(&self.default.cli_version), &self.default.tag_name)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Acquisition stage");
}
