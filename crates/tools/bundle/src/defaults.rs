//! The bundle used when no tools input is given.

use codeql_init_core::Result;
use codeql_init_core::tools::{DefaultVersion, DeploymentVariant};
use serde::Deserialize;

const DEFAULTS_JSON: &str = include_str!("defaults.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Defaults {
    bundle_version: String,
    cli_version: String,
}

/// The default bundle for `variant`.
pub fn default_version(variant: DeploymentVariant) -> Result<DefaultVersion> {
    let defaults: Defaults = serde_json::from_str(DEFAULTS_JSON)?;
    Ok(DefaultVersion {
        cli_version: defaults.cli_version,
        tag_name: defaults.bundle_version,
        variant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeql_init_core::tools::version::is_plain_release;

    #[test]
    fn test_bundled_defaults_are_consistent() {
        let default = default_version(DeploymentVariant::Ghes).unwrap();
        assert!(default.tag_name.starts_with("codeql-bundle-"));
        assert!(is_plain_release(&default.cli_version));
        assert_eq!(default.variant, DeploymentVariant::Ghes);
    }
}
