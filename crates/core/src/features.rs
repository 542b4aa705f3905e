//! Feature toggles that change how the configuration is built.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::toolchain::{CODEQL_VERSION_CONFIG_FILES, Toolchain, version_at_least};
use crate::{Error, Result};

/// A toggleable feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Let the toolchain parse the scan configuration itself.
    CliConfigFileEnabled,
    /// Add the ML-powered JavaScript query pack to security suites.
    MlPoweredQueriesEnabled,
}

impl Feature {
    /// Identifier used on the command line and in the environment.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CliConfigFileEnabled => "cli_config_file_enabled",
            Self::MlPoweredQueriesEnabled => "ml_powered_queries_enabled",
        }
    }

    /// Minimum CLI version the feature needs, if any.
    #[must_use]
    pub fn minimum_version(self) -> Option<&'static str> {
        match self {
            Self::CliConfigFileEnabled => Some(CODEQL_VERSION_CONFIG_FILES),
            Self::MlPoweredQueriesEnabled => None,
        }
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cli_config_file_enabled" => Ok(Self::CliConfigFileEnabled),
            "ml_powered_queries_enabled" => Ok(Self::MlPoweredQueriesEnabled),
            other => Err(Error::user(format!("Unknown feature: {other}"))),
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of enabled features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    enabled: BTreeSet<Feature>,
}

impl Features {
    /// No features enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a feature.
    #[must_use]
    pub fn with(mut self, feature: Feature) -> Self {
        self.enabled.insert(feature);
        self
    }

    /// Whether the feature is switched on, regardless of toolchain version.
    #[must_use]
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.contains(&feature)
    }

    /// Whether the feature is switched on and the CLI version supports it.
    #[must_use]
    pub fn is_enabled_for(&self, feature: Feature, cli_version: &str) -> bool {
        self.is_enabled(feature)
            && feature
                .minimum_version()
                .is_none_or(|minimum| version_at_least(cli_version, minimum))
    }
}

impl FromIterator<Feature> for Features {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            enabled: iter.into_iter().collect(),
        }
    }
}

/// Whether the toolchain parses the scan configuration itself.
///
/// When it does, pack downloads, the final query check and remote query
/// checkouts are left to the toolchain.
pub async fn use_config_file_in_cli(toolchain: &dyn Toolchain, features: &Features) -> Result<bool> {
    if !features.is_enabled(Feature::CliConfigFileEnabled) {
        return Ok(false);
    }
    let version = toolchain.version().await?;
    Ok(features.is_enabled_for(Feature::CliConfigFileEnabled, &version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature() {
        assert_eq!(
            "cli-config-file-enabled".parse::<Feature>().unwrap(),
            Feature::CliConfigFileEnabled
        );
        assert_eq!(
            "ML_POWERED_QUERIES_ENABLED".parse::<Feature>().unwrap(),
            Feature::MlPoweredQueriesEnabled
        );
        assert!("nope".parse::<Feature>().unwrap_err().is_user_error());
    }

    #[test]
    fn test_version_gated_feature() {
        let features = Features::new().with(Feature::CliConfigFileEnabled);
        assert!(features.is_enabled_for(Feature::CliConfigFileEnabled, "2.11.6"));
        assert!(!features.is_enabled_for(Feature::CliConfigFileEnabled, "2.11.5"));
        assert!(!Features::new().is_enabled_for(Feature::CliConfigFileEnabled, "2.12.0"));
    }

    #[test]
    fn test_ungated_feature() {
        let features: Features = [Feature::MlPoweredQueriesEnabled].into_iter().collect();
        assert!(features.is_enabled_for(Feature::MlPoweredQueriesEnabled, "1.0.0"));
        assert!(!features.is_enabled(Feature::CliConfigFileEnabled));
    }
}
