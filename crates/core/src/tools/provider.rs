//! Platform and tool handle types shared by the acquisition pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Get the current platform.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }

    /// Parse from string like "linux-x64".
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once('-')?;
        Some(Self {
            os: Os::parse(os)?,
            arch: Arch::parse(arch)?,
        })
    }

    /// Name of the platform-specific bundle asset.
    #[must_use]
    pub fn bundle_asset_name(&self) -> &'static str {
        match self.os {
            Os::Linux => "codeql-bundle-linux64.tar.gz",
            Os::Darwin => "codeql-bundle-osx64.tar.gz",
            Os::Windows => "codeql-bundle-win64.tar.gz",
        }
    }

    /// File name of the toolchain executable.
    #[must_use]
    pub fn executable_name(&self) -> &'static str {
        match self.os {
            Os::Windows => "codeql.exe",
            Os::Darwin | Os::Linux => "codeql",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS.
    Darwin,
    /// Linux.
    Linux,
    /// Windows.
    Windows,
}

impl Os {
    /// Get the current OS.
    #[must_use]
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        return Self::Darwin;
        #[cfg(target_os = "linux")]
        return Self::Linux;
        #[cfg(target_os = "windows")]
        return Self::Windows;
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        compile_error!("Unsupported OS");
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "windows" | "win32" | "win" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Darwin => write!(f, "darwin"),
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// CPU architecture.
///
/// Displayed using the names runner tool caches use for their directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM.
    Arm64,
    /// x86-64.
    X64,
}

impl Arch {
    /// Get the current architecture.
    #[must_use]
    pub fn current() -> Self {
        #[cfg(target_arch = "aarch64")]
        return Self::Arm64;
        #[cfg(target_arch = "x86_64")]
        return Self::X64;
        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        compile_error!("Unsupported architecture");
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "x64" | "x86_64" | "amd64" => Some(Self::X64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Arm64 => write!(f, "arm64"),
            Self::X64 => write!(f, "x64"),
        }
    }
}

/// The kind of GitHub deployment the toolchain is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentVariant {
    /// github.com
    Dotcom,
    /// GitHub Enterprise Server
    Ghes,
    /// GitHub AE, which serves bundles through a dedicated enterprise endpoint
    Ghae,
}

impl DeploymentVariant {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dotcom" | "github.com" => Some(Self::Dotcom),
            "ghes" => Some(Self::Ghes),
            "ghae" => Some(Self::Ghae),
            _ => None,
        }
    }

    /// Whether releases are served from a repository releases API.
    #[must_use]
    pub fn uses_releases_api(self) -> bool {
        matches!(self, Self::Dotcom | Self::Ghes)
    }
}

impl std::fmt::Display for DeploymentVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dotcom => write!(f, "dotcom"),
            Self::Ghes => write!(f, "ghes"),
            Self::Ghae => write!(f, "ghae"),
        }
    }
}

/// A bundle release tag and, when known, the CLI version it ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolVersionTag {
    /// Release tag, e.g. `codeql-bundle-20230304`.
    pub tag_name: String,
    /// CLI version shipped in the release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_version: Option<String>,
}

impl ToolVersionTag {
    /// Create a tag with an unknown CLI version.
    #[must_use]
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            cli_version: None,
        }
    }

    /// Attach the CLI version.
    #[must_use]
    pub fn with_cli_version(mut self, cli_version: impl Into<String>) -> Self {
        self.cli_version = Some(cli_version.into());
        self
    }
}

/// The version used when no tools input is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultVersion {
    /// CLI version of the default bundle.
    pub cli_version: String,
    /// Release tag of the default bundle.
    pub tag_name: String,
    /// Deployment the default applies to.
    pub variant: DeploymentVariant,
}

/// Where an acquired toolchain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    /// Extracted from an archive on local disk.
    Local,
    /// Found in the tool cache.
    Toolcache,
    /// Downloaded during this run.
    Download,
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Toolcache => write!(f, "toolcache"),
            Self::Download => write!(f, "download"),
        }
    }
}

/// An acquired toolchain, ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolHandle {
    /// Path to the toolchain executable.
    pub path: PathBuf,
    /// The CLI version if known, otherwise the cache key.
    pub version: String,
    /// Where it came from.
    pub source: ToolSource,
    /// Milliseconds from the start of the fetch until the bundle is installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_duration_ms: Option<u64>,
}

/// Get the default tool cache directory, `~/.cache/codeql-init/toolcache`.
#[must_use]
pub fn default_toolcache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("codeql-init")
        .join("toolcache")
}
