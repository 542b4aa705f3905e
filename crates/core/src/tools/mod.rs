//! Toolchain identity: platforms, handles, and cache version keys.
//!
//! # Architecture
//!
//! - [`Platform`], [`Os`], [`Arch`] - Platform identification types
//! - [`ToolHandle`] - An acquired toolchain and where it came from
//! - [`ToolVersionTag`], [`DefaultVersion`] - Release identity
//! - [`version`] - Cache key normalization and version equivalence
//!
//! Acquisition itself lives in the bundle tools crate.

mod provider;
pub mod version;

pub use provider::{
    Arch, DefaultVersion, DeploymentVariant, Os, Platform, ToolHandle, ToolSource,
    ToolVersionTag, default_toolcache_dir,
};
pub use version::{Equivalence, normalized_cache_version};
