//! Versioned tool cache shared across runs.
//!
//! Structure:
//! ```text
//! {root}/
//! └── CodeQL/
//!     └── 2.12.0-20230101/
//!         ├── x64/           # Installed bundle
//!         └── x64.complete   # Written last; entries without it are ignored
//! ```

use std::path::{Path, PathBuf};

use codeql_init_core::Result;
use codeql_init_core::tools::{Arch, default_toolcache_dir};
use semver::Version;
use tracing::{debug, trace, warn};

/// Environment variable naming the runner's tool cache.
pub const TOOL_CACHE_ENV: &str = "RUNNER_TOOL_CACHE";

/// File at the root of a bundle marking it as pinned by the instance.
pub const PINNED_MARKER: &str = "pinned-version";

/// Whether the bundle installed or staged at `dir` is pinned.
#[must_use]
pub fn is_pinned(dir: &Path) -> bool {
    dir.join(PINNED_MARKER).is_file()
}

/// Tool cache rooted at a directory, scoped to one architecture.
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
    arch: Arch,
}

impl ToolCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, arch: Arch) -> Self {
        Self {
            root: root.into(),
            arch,
        }
    }

    /// The cache at `RUNNER_TOOL_CACHE`, or the user cache directory.
    #[must_use]
    pub fn from_env(arch: Arch) -> Self {
        let root = std::env::var_os(TOOL_CACHE_ENV)
            .filter(|root| !root.is_empty())
            .map_or_else(default_toolcache_dir, PathBuf::from);
        Self::new(root, arch)
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version)
    }

    fn entry_dir(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version).join(self.arch.to_string())
    }

    fn marker(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version)
            .join(format!("{}.complete", self.arch))
    }

    /// Directory to extract into before [`ToolCache::install`].
    ///
    /// Lives next to the final entry so installing is a rename.
    #[must_use]
    pub fn staging_dir(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version)
            .join(format!(".{}.tmp", self.arch))
    }

    /// The installed directory for `version`, if complete.
    #[must_use]
    pub fn find(&self, name: &str, version: &str) -> Option<PathBuf> {
        let dir = self.entry_dir(name, version);
        if dir.is_dir() && self.marker(name, version).is_file() {
            trace!(name, version, ?dir, "Cache hit");
            Some(dir)
        } else {
            trace!(name, version, "Cache miss");
            None
        }
    }

    /// Every complete version of `name`, sorted by semver.
    ///
    /// Directory names that are not valid semver are skipped.
    #[must_use]
    pub fn find_all_versions(&self, name: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.root.join(name)) else {
            return Vec::new();
        };
        let mut versions: Vec<(Version, String)> = entries
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .filter(|version| self.find(name, version).is_some())
            .filter_map(|version| Some((Version::parse(&version).ok()?, version)))
            .collect();
        versions.sort_by(|a, b| a.0.cmp(&b.0));
        versions.into_iter().map(|(_, version)| version).collect()
    }

    /// Install `source` as `version`, replacing any incomplete entry.
    ///
    /// `source` is moved into place; the completion marker is written last.
    pub fn install(&self, name: &str, version: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.entry_dir(name, version);
        let marker = self.marker(name, version);
        if marker.exists() {
            std::fs::remove_file(&marker)?;
        }
        if dest.exists() {
            debug!(?dest, "Removing incomplete cache entry");
            std::fs::remove_dir_all(&dest)?;
        }
        std::fs::create_dir_all(self.version_dir(name, version))?;

        if let Err(e) = std::fs::rename(source, &dest) {
            warn!(error = %e, ?source, ?dest, "Rename failed, copying instead");
            copy_dir(source, &dest)?;
            std::fs::remove_dir_all(source)?;
        }
        std::fs::write(&marker, "")?;

        debug!(name, version, ?dest, "Installed into tool cache");
        Ok(dest)
    }
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
