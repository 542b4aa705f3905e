//! The repository hosting service.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryNwo {
    /// Owning user or organization.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepositoryNwo {
    /// Parse `owner/repo`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.split_once('/')?;
        let (owner, repo) = (owner.trim(), repo.trim());
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl std::fmt::Display for RepositoryNwo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A file at a given ref of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Owning user or organization.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Path of the file in the repository.
    pub path: String,
    /// Branch, tag or commit.
    pub reference: String,
}

impl std::fmt::Display for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}@{}", self.owner, self.repo, self.path, self.reference)
    }
}

/// Operations on the hosting service needed while building the configuration.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Languages of the analysed repository with their byte counts, most used first.
    async fn languages(&self) -> Result<Vec<(String, u64)>>;

    /// Text contents of a file in some repository.
    ///
    /// Fails with a user configuration error if the path names a directory.
    async fn file_contents(&self, file: &RemoteFile) -> Result<String>;

    /// Check out `owner/repo` at `reference` below `temp_dir`, returning the checkout root.
    async fn checkout(
        &self,
        repository: &RepositoryNwo,
        reference: &str,
        temp_dir: &Path,
    ) -> Result<PathBuf>;
}

/// Where a repository is checked out below `temp_dir`.
#[must_use]
pub fn checkout_path(temp_dir: &Path, repository: &RepositoryNwo, reference: &str) -> PathBuf {
    temp_dir
        .join(&repository.owner)
        .join(&repository.repo)
        .join(reference)
}
