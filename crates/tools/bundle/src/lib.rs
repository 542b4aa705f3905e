//! CodeQL bundle acquisition for codeql-init.
//!
//! Resolves the `tools` input to a bundle release, reuses a tool cache entry
//! when one matches, and otherwise downloads, extracts and installs it. Supports:
//! - github.com and enterprise servers through the releases API
//! - Isolated enterprise deployments through their bundle endpoint
//! - Bundle URLs and local archives
//!
//! # Example
//!
//! ```ignore
//! use codeql_init_tools_bundle::{Acquirer, BundleLocator, GitHubReleaseApi, ToolCache};
//!
//! let api = GitHubReleaseApi::new(api_url, server_url, token)?;
//! let locator = BundleLocator::new(&api, platform);
//! let cache = ToolCache::from_env(platform.arch);
//! let bundle = Acquirer::new(&api, &locator, &cache, &default, platform, temp_dir)
//!     .acquire(ToolsInput::parse(Some("latest")).as_ref())
//!     .await?;
//! ```

#![warn(missing_docs)]

mod acquire;
mod api;
mod cache;
mod defaults;
mod extract;
mod locator;
mod resolver;

pub use acquire::{AcquiredBundle, Acquirer, Stage};
pub use api::{
    CANONICAL_REPOSITORY, DOTCOM_API_URL, EnterpriseBundle, GitHubReleaseApi, Release,
    ReleaseApi, ReleaseAsset, ReleaseSource,
};
pub use cache::{PINNED_MARKER, TOOL_CACHE_ENV, ToolCache, is_pinned};
pub use defaults::default_version;
pub use extract::{compute_file_sha256, extract_tar_gz};
pub use locator::{BundleLocator, GENERIC_BUNDLE_ASSET, LocatedBundle};
pub use resolver::{BundleSource, ResolvedPlan, ToolsInput, VersionResolver, tag_from_url};

/// Name of the tool in the tool cache.
pub const TOOL_NAME: &str = "CodeQL";
