//! Core types for preparing a code scanning run.
//!
//! This crate provides:
//! - Toolchain bundle identities, versions and cache keys ([`tools`])
//! - Parsing and validation of the scan configuration file ([`config`])
//! - Augmentation of the configuration with workflow inputs ([`augment`])
//! - The [`Toolchain`] and [`RepositoryHost`] seams used while building it
//!
//! # Example
//!
//! ```ignore
//! use codeql_init_core::config::{ConfigBuilder, ConfigInputs};
//!
//! let inputs = ConfigInputs::new("/runner/temp", "/workspace");
//! let config = ConfigBuilder::new(&toolchain, &host).build(&inputs).await?;
//! ```

#![warn(missing_docs)]

pub mod augment;
pub mod config;
pub mod env;
mod error;
pub mod features;
pub mod host;
pub mod language;
pub mod pack;
pub mod paths;
pub mod timeout;
pub mod toolchain;
pub mod tools;

pub use env::EnvOverlay;
pub use error::{Error, Result, property_error};
pub use features::{Feature, Features};
pub use host::{RemoteFile, RepositoryHost, RepositoryNwo};
pub use language::Language;
pub use toolchain::Toolchain;
