//! Finding where a bundle can be downloaded from.

use codeql_init_core::tools::version::{
    BUNDLE_TAG_PREFIX, cli_version_from_marker, cli_version_marker,
};
use codeql_init_core::tools::{DefaultVersion, DeploymentVariant, Platform, ToolVersionTag};
use codeql_init_core::{Error, Result};
use tracing::{debug, info};

use crate::api::{Release, ReleaseApi, ReleaseSource};

/// Platform-agnostic bundle asset, used when no platform bundle is published.
pub const GENERIC_BUNDLE_ASSET: &str = "codeql-bundle.tar.gz";

/// A bundle ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBundle {
    /// Where to download the asset.
    pub url: String,
    /// The selected asset.
    pub asset_name: String,
    /// The release tag, with its CLI version when a marker asset names one.
    pub tag: ToolVersionTag,
}

/// Resolves bundle tags to download URLs on the configured deployment.
pub struct BundleLocator<'a> {
    api: &'a dyn ReleaseApi,
    variant: DeploymentVariant,
    platform: Platform,
    sources: Vec<ReleaseSource>,
}

impl<'a> BundleLocator<'a> {
    /// Create a locator for github.com.
    #[must_use]
    pub fn new(api: &'a dyn ReleaseApi, platform: Platform) -> Self {
        Self {
            api,
            variant: DeploymentVariant::Dotcom,
            platform,
            sources: vec![ReleaseSource::dotcom()],
        }
    }

    /// Create a locator for an enterprise server.
    ///
    /// `mirror` is the instance's copy of the action repository; it is tried
    /// before the canonical repository on github.com.
    #[must_use]
    pub fn ghes(api: &'a dyn ReleaseApi, platform: Platform, mirror: ReleaseSource) -> Self {
        Self {
            api,
            variant: DeploymentVariant::Ghes,
            platform,
            sources: vec![mirror, ReleaseSource::dotcom()],
        }
    }

    /// Create a locator for an isolated enterprise deployment.
    #[must_use]
    pub fn ghae(api: &'a dyn ReleaseApi, platform: Platform) -> Self {
        Self {
            api,
            variant: DeploymentVariant::Ghae,
            platform,
            sources: Vec::new(),
        }
    }

    /// The deployment variant.
    #[must_use]
    pub fn variant(&self) -> DeploymentVariant {
        self.variant
    }

    /// Whether `url` downloads a release of one of the locator's repositories.
    ///
    /// Only such bundles have their CLI version looked up through marker assets.
    #[must_use]
    pub fn is_canonical_download(&self, url: &str) -> bool {
        self.variant.uses_releases_api()
            && self
                .sources
                .iter()
                .any(|source| source.is_release_download(url))
    }

    /// Whether `tag` is the platform default bundle.
    #[must_use]
    pub fn is_default_bundle(tag: &str, default: &DefaultVersion) -> bool {
        tag == default.tag_name
    }

    /// Resolve `tag` to a download URL.
    pub async fn locate(&self, tag: &str) -> Result<LocatedBundle> {
        if self.variant == DeploymentVariant::Ghae {
            return self.locate_enterprise(tag).await;
        }

        let mut release_without_asset = None;
        for source in &self.sources {
            let Some(release) = self.api.release_by_tag(source, tag).await? else {
                debug!(%source, tag, "Release not found");
                continue;
            };
            let asset = self
                .select_asset(|name| release.asset(name).is_some())
                .and_then(|name| release.asset(name));
            if let Some(asset) = asset {
                info!(%source, tag, asset = %asset.name, "Located bundle");
                return Ok(LocatedBundle {
                    url: asset.browser_download_url.clone(),
                    asset_name: asset.name.clone(),
                    tag: tag_of(&release),
                });
            }
            release_without_asset = Some(source.to_string());
        }

        match release_without_asset {
            Some(source) => Err(self.no_asset_error(tag, &source)),
            None => Err(Error::not_found(format!("bundle release {tag}"))),
        }
    }

    async fn locate_enterprise(&self, tag: &str) -> Result<LocatedBundle> {
        let bundle = self
            .api
            .enterprise_find(tag)
            .await?
            .ok_or_else(|| Error::not_found(format!("bundle release {tag}")))?;
        let asset_name = self
            .select_asset(|name| bundle.asset_id(name).is_some())
            .ok_or_else(|| self.no_asset_error(tag, "the enterprise endpoint"))?;
        let asset_id = bundle
            .asset_id(asset_name)
            .ok_or_else(|| self.no_asset_error(tag, "the enterprise endpoint"))?;
        let url = self.api.enterprise_download(&asset_id).await?;
        info!(tag, asset = asset_name, asset_id, "Located bundle on the enterprise endpoint");
        Ok(LocatedBundle {
            url,
            asset_name: asset_name.to_string(),
            tag: ToolVersionTag::new(tag),
        })
    }

    fn select_asset(&self, exists: impl Fn(&str) -> bool) -> Option<&'static str> {
        [self.platform.bundle_asset_name(), GENERIC_BUNDLE_ASSET]
            .into_iter()
            .find(|name| exists(name))
    }

    fn no_asset_error(&self, tag: &str, source: &str) -> Error {
        Error::resolution(format!(
            "Release {tag} in {source} has no bundle for {} (expected {} or {GENERIC_BUNDLE_ASSET})",
            self.platform,
            self.platform.bundle_asset_name()
        ))
    }

    /// The CLI version shipped by `tag`, from its marker asset.
    pub async fn cli_version_for_tag(&self, tag: &str) -> Result<Option<String>> {
        for source in &self.sources {
            if let Some(release) = self.api.release_by_tag(source, tag).await? {
                return Ok(tag_of(&release).cli_version);
            }
        }
        Ok(None)
    }

    /// The newest bundle release.
    pub async fn latest(&self) -> Result<ToolVersionTag> {
        self.releases()
            .await?
            .iter()
            .find(|release| release.tag_name.starts_with(BUNDLE_TAG_PREFIX))
            .map(tag_of)
            .ok_or_else(|| Error::not_found("bundle releases"))
    }

    /// The bundle release shipping CLI `version`, identified by its marker asset.
    pub async fn find_release_for_cli_version(&self, version: &str) -> Result<ToolVersionTag> {
        let marker = cli_version_marker(version);
        self.releases()
            .await?
            .iter()
            .find(|release| release.asset(&marker).is_some())
            .map(tag_of)
            .ok_or_else(|| Error::not_found(format!("bundle release for CLI version {version}")))
    }

    async fn releases(&self) -> Result<Vec<Release>> {
        if !self.variant.uses_releases_api() {
            return Err(Error::resolution(format!(
                "Listing bundle releases is not supported on {}; request a bundle tag or URL instead",
                self.variant
            )));
        }
        for source in &self.sources {
            let releases = self.api.list_releases(source).await?;
            if !releases.is_empty() {
                return Ok(releases);
            }
        }
        Ok(Vec::new())
    }
}

fn tag_of(release: &Release) -> ToolVersionTag {
    let tag = ToolVersionTag::new(&release.tag_name);
    match release
        .assets
        .iter()
        .find_map(|asset| cli_version_from_marker(&asset.name))
    {
        Some(cli_version) => tag.with_cli_version(cli_version),
        None => tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReleaseAsset;

    fn release(tag: &str, assets: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            assets: assets
                .iter()
                .map(|name| ReleaseAsset {
                    name: (*name).to_string(),
                    browser_download_url: format!("https://example.com/{tag}/{name}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_tag_of_reads_marker() {
        let tag = tag_of(&release(
            "codeql-bundle-20230101",
            &["codeql-bundle.tar.gz", "cli-version-2.12.0.txt"],
        ));
        assert_eq!(tag.cli_version.as_deref(), Some("2.12.0"));

        let tag = tag_of(&release("codeql-bundle-20230101", &["codeql-bundle.tar.gz"]));
        assert_eq!(tag.cli_version, None);
    }

    struct NoReleases;

    #[async_trait::async_trait]
    impl ReleaseApi for NoReleases {
        async fn release_by_tag(&self, _: &ReleaseSource, _: &str) -> Result<Option<Release>> {
            Ok(None)
        }
        async fn list_releases(&self, _: &ReleaseSource) -> Result<Vec<Release>> {
            Ok(Vec::new())
        }
        async fn enterprise_find(&self, _: &str) -> Result<Option<crate::EnterpriseBundle>> {
            Ok(None)
        }
        async fn enterprise_download(&self, id: &str) -> Result<String> {
            Err(Error::not_found(id.to_string()))
        }
        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            Err(Error::not_found(url.to_string()))
        }
    }

    #[test]
    fn test_canonical_download_includes_instance_mirror() {
        let platform = Platform::new(
            codeql_init_core::tools::Os::Linux,
            codeql_init_core::tools::Arch::X64,
        );
        let mirror = ReleaseSource::new(
            "https://ghe.example.com/api/v3",
            "https://ghe.example.com",
            "github/codeql-action",
        );
        let dotcom = "https://github.com/github/codeql-action/releases/download/codeql-bundle-20230101/codeql-bundle.tar.gz";
        let mirrored = "https://ghe.example.com/github/codeql-action/releases/download/codeql-bundle-20230101/codeql-bundle.tar.gz";
        let elsewhere = "https://ghe.example.com/octo/bundles/releases/download/codeql-bundle-20230101/codeql-bundle.tar.gz";

        let ghes = BundleLocator::ghes(&NoReleases, platform, mirror);
        assert!(ghes.is_canonical_download(dotcom));
        assert!(ghes.is_canonical_download(mirrored));
        assert!(!ghes.is_canonical_download(elsewhere));

        let dotcom_locator = BundleLocator::new(&NoReleases, platform);
        assert!(dotcom_locator.is_canonical_download(dotcom));
        assert!(!dotcom_locator.is_canonical_download(mirrored));

        assert!(!BundleLocator::ghae(&NoReleases, platform).is_canonical_download(mirrored));
    }

    #[test]
    fn test_is_default_bundle() {
        let default = DefaultVersion {
            cli_version: "2.12.0".into(),
            tag_name: "codeql-bundle-20230101".into(),
            variant: DeploymentVariant::Dotcom,
        };
        assert!(BundleLocator::is_default_bundle("codeql-bundle-20230101", &default));
        assert!(!BundleLocator::is_default_bundle("codeql-bundle-20230102", &default));
    }
}
