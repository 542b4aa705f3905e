//! Release metadata and the HTTP API that serves it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use codeql_init_core::{Error, Result};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

/// Public API of github.com.
pub const DOTCOM_API_URL: &str = "https://api.github.com";

/// Web root of github.com.
pub const DOTCOM_SERVER_URL: &str = "https://github.com";

/// Repository publishing the canonical bundle releases.
pub const CANONICAL_REPOSITORY: &str = "github/codeql-action";

/// Release metadata from the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Git tag of the release.
    pub tag_name: String,
    /// Files attached to the release.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Find an asset by exact name.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Release asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
}

/// Bundle assets known to the enterprise endpoint, by asset name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnterpriseBundle {
    /// Asset ids by asset name.
    #[serde(default)]
    pub assets: BTreeMap<String, serde_json::Value>,
}

impl EnterpriseBundle {
    /// The asset id for `name`. Ids may be served as numbers or strings.
    #[must_use]
    pub fn asset_id(&self, name: &str) -> Option<String> {
        match self.assets.get(name)? {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnterpriseDownload {
    url: String,
}

/// A repository publishing bundle releases, and the API serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    /// REST API root of the instance.
    pub api_url: String,
    /// Web root of the instance, where release assets are downloaded from.
    pub server_url: String,
    /// `owner/repo` publishing the releases.
    pub repository: String,
}

impl ReleaseSource {
    /// A repository on the instance at `api_url` / `server_url`.
    #[must_use]
    pub fn new(
        api_url: impl Into<String>,
        server_url: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
        }
    }

    /// The canonical repository on github.com.
    #[must_use]
    pub fn dotcom() -> Self {
        Self::new(DOTCOM_API_URL, DOTCOM_SERVER_URL, CANONICAL_REPOSITORY)
    }

    /// Whether `url` is a release asset download from this repository.
    #[must_use]
    pub fn is_release_download(&self, url: &str) -> bool {
        url.starts_with(&format!(
            "{}/{}/releases/download/",
            self.server_url, self.repository
        ))
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repository)
    }
}

impl std::fmt::Display for ReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.repository, self.api_url)
    }
}

/// Access to bundle releases.
#[async_trait]
pub trait ReleaseApi: Send + Sync {
    /// The release with `tag`, or `None` if there is none.
    async fn release_by_tag(&self, source: &ReleaseSource, tag: &str) -> Result<Option<Release>>;

    /// All releases of the repository, newest first.
    async fn list_releases(&self, source: &ReleaseSource) -> Result<Vec<Release>>;

    /// Look up a bundle tag on the enterprise endpoint, or `None` if unknown.
    async fn enterprise_find(&self, tag: &str) -> Result<Option<EnterpriseBundle>>;

    /// Exchange an enterprise asset id for a download URL.
    async fn enterprise_download(&self, asset_id: &str) -> Result<String>;

    /// Fetch the bytes at `url`.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Releases requested per page when listing.
const RELEASES_PER_PAGE: usize = 100;

/// Scheme, host and port of a URL.
type Origin = (String, String, Option<u16>);

fn origin(url: &str) -> Option<Origin> {
    let url = Url::parse(url).ok()?;
    Some((
        url.scheme().to_string(),
        url.host_str()?.to_ascii_lowercase(),
        url.port_or_known_default(),
    ))
}

/// [`ReleaseApi`] backed by the GitHub REST API.
pub struct GitHubReleaseApi {
    client: Client,
    api_url: String,
    instance: Vec<Origin>,
    token: Option<String>,
}

impl GitHubReleaseApi {
    /// Create a client for the instance at `api_url` / `server_url`.
    ///
    /// The token is only sent to that instance.
    pub fn new(
        api_url: impl Into<String>,
        server_url: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent("codeql-init")
            .build()
            .map_err(|e| Error::infrastructure(format!("Failed to create HTTP client: {e}")))?;
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let instance = [origin(&api_url), origin(&server_url.into())]
            .into_iter()
            .flatten()
            .collect();
        Ok(Self {
            client,
            api_url,
            instance,
            token,
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token
            && origin(url).is_some_and(|origin| self.instance.contains(&origin))
        {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!(%url, "Fetching release metadata");
        let response = self
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::infrastructure(format!("Failed to fetch {url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::infrastructure(format!(
                "Request to {url} failed (HTTP {})",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| Error::infrastructure(format!("Failed to parse response from {url}: {e}")))
    }

    fn enterprise_url(&self, path: &str) -> String {
        format!("{}/enterprise/code-scanning/codeql-bundle/{path}", self.api_url)
    }
}

#[async_trait]
impl ReleaseApi for GitHubReleaseApi {
    async fn release_by_tag(&self, source: &ReleaseSource, tag: &str) -> Result<Option<Release>> {
        self.get_json(&format!("{}/tags/{tag}", source.releases_url()))
            .await
    }

    async fn list_releases(&self, source: &ReleaseSource) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}?per_page={RELEASES_PER_PAGE}&page={page}",
                source.releases_url()
            );
            let batch: Vec<Release> = self.get_json(&url).await?.unwrap_or_default();
            let last = batch.len() < RELEASES_PER_PAGE;
            releases.extend(batch);
            if last {
                break;
            }
        }
        debug!(%source, count = releases.len(), "Listed releases");
        Ok(releases)
    }

    async fn enterprise_find(&self, tag: &str) -> Result<Option<EnterpriseBundle>> {
        self.get_json(&self.enterprise_url(&format!("find/{tag}")))
            .await
    }

    async fn enterprise_download(&self, asset_id: &str) -> Result<String> {
        let url = self.enterprise_url(&format!("download/{asset_id}"));
        let download: EnterpriseDownload = self
            .get_json(&url)
            .await?
            .ok_or_else(|| Error::not_found(format!("bundle asset {asset_id}")))?;
        Ok(download.url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "Downloading bundle");
        let response = self
            .get(url)
            .header("Accept", "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::infrastructure(format!("Failed to download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::infrastructure(format!(
                "Failed to download {url} (HTTP {})",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::infrastructure(format!("Failed to read {url}: {e}")))
    }
}
