//! Custom pack registries from the `registries` input.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::toolchain::{CODEQL_VERSION_GHES_PACK_DOWNLOAD, version_at_least};
use crate::{Error, Result};

/// One entry of the `registries` input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry URL.
    pub url: String,
    /// A package glob or list of globs served by this registry.
    pub packages: serde_json::Value,
    /// Token for the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The registry entry as written to disk, without its token.
#[derive(Debug, Serialize)]
struct SafeRegistry<'a> {
    url: String,
    packages: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct QlConfig<'a> {
    registries: Vec<SafeRegistry<'a>>,
}

/// What pack downloads need to use the configured registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistriesSetup {
    /// `url=token` pairs, comma separated.
    pub auth_tokens: Option<String>,
    /// The generated `qlconfig.yml`, if registries were given.
    pub qlconfig_file: Option<PathBuf>,
}

/// Parse the `registries` input, a YAML list of `{url, packages, token}`.
pub fn parse_registries(input: Option<&str>) -> Result<Option<Vec<RegistryConfig>>> {
    let Some(input) = input.filter(|input| !input.trim().is_empty()) else {
        return Ok(None);
    };
    let value: serde_json::Value = serde_yaml::from_str(input)
        .map_err(|_| Error::user("Invalid registries input. Must be a YAML string."))?;
    let invalid = || {
        Error::user(
            "Invalid 'registries' input. Must be an array of objects with 'url' and 'packages' properties.",
        )
    };
    let registries: Vec<RegistryConfig> = serde_json::from_value(value).map_err(|_| invalid())?;
    if registries
        .iter()
        .any(|r| r.url.is_empty() || r.packages.is_null())
    {
        return Err(invalid());
    }
    Ok(Some(registries))
}

/// Render the `qlconfig.yml` contents. Tokens are never written.
pub fn qlconfig_contents(registries: &[RegistryConfig]) -> Result<String> {
    let qlconfig = QlConfig {
        registries: registries
            .iter()
            .map(|registry| SafeRegistry {
                url: if registry.url.ends_with('/') {
                    registry.url.clone()
                } else {
                    format!("{}/", registry.url)
                },
                packages: &registry.packages,
            })
            .collect(),
    };
    Ok(serde_yaml::to_string(&qlconfig)?)
}

/// Write `{tempDir}/qlconfig.yml` for the `registries` input and compute registry auth.
///
/// `existing_auth` is the caller's `CODEQL_REGISTRIES_AUTH`; when set it wins
/// over tokens from the input.
pub fn generate_registries(
    input: Option<&str>,
    cli_version: &str,
    temp_dir: &Path,
    existing_auth: Option<&str>,
) -> Result<RegistriesSetup> {
    let mut setup = RegistriesSetup::default();

    if let Some(registries) = parse_registries(input)? {
        if !version_at_least(cli_version, CODEQL_VERSION_GHES_PACK_DOWNLOAD) {
            return Err(Error::resolution(format!(
                "The 'registries' input is not supported on CodeQL CLI versions earlier than \
                 {CODEQL_VERSION_GHES_PACK_DOWNLOAD}. Please upgrade to CodeQL CLI version \
                 {CODEQL_VERSION_GHES_PACK_DOWNLOAD} or later."
            )));
        }
        let contents = qlconfig_contents(&registries)?;
        let path = temp_dir.join("qlconfig.yml");
        std::fs::create_dir_all(temp_dir)?;
        std::fs::write(&path, &contents)?;
        debug!(path = %path.display(), qlconfig = %contents, "Generated qlconfig.yml");

        setup.qlconfig_file = Some(path);
        setup.auth_tokens = Some(
            registries
                .iter()
                .map(|r| format!("{}={}", r.url, r.token.as_deref().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    if let Some(existing) = existing_auth {
        debug!("Using CODEQL_REGISTRIES_AUTH environment variable to authenticate with registries");
        setup.auth_tokens = Some(existing.to_string());
    }
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INPUT: &str = r"
- url: http://ghcr.io
  packages: [codeql/*, dsp-testing/*]
  token: not-a-token
- url: https://containers.GHEHOSTNAME1/v2/
  packages: semmle/*
  token: still-not-a-token
";

    #[test]
    fn test_no_registries() {
        let temp = TempDir::new().unwrap();
        let setup = generate_registries(None, "2.10.4", temp.path(), None).unwrap();
        assert_eq!(setup, RegistriesSetup::default());
        assert!(!temp.path().join("qlconfig.yml").exists());
    }

    #[test]
    fn test_generates_qlconfig_without_tokens() {
        let temp = TempDir::new().unwrap();
        let setup = generate_registries(Some(INPUT), "2.10.4", temp.path(), None).unwrap();

        let qlconfig_file = setup.qlconfig_file.unwrap();
        let contents = std::fs::read_to_string(&qlconfig_file).unwrap();
        assert!(!contents.contains("token"));
        let parsed: serde_json::Value = serde_yaml::from_str(&contents).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({
                "registries": [
                    { "url": "http://ghcr.io/", "packages": ["codeql/*", "dsp-testing/*"] },
                    { "url": "https://containers.GHEHOSTNAME1/v2/", "packages": "semmle/*" },
                ]
            })
        );
        assert_eq!(
            setup.auth_tokens.as_deref(),
            Some("http://ghcr.io=not-a-token,https://containers.GHEHOSTNAME1/v2/=still-not-a-token")
        );
    }

    #[test]
    fn test_existing_auth_wins() {
        let temp = TempDir::new().unwrap();
        let setup =
            generate_registries(Some(INPUT), "2.10.4", temp.path(), Some("preset")).unwrap();
        assert_eq!(setup.auth_tokens.as_deref(), Some("preset"));
        assert!(setup.qlconfig_file.is_some());

        let setup = generate_registries(None, "2.10.4", temp.path(), Some("preset")).unwrap();
        assert_eq!(setup.auth_tokens.as_deref(), Some("preset"));
        assert!(setup.qlconfig_file.is_none());
    }

    #[test]
    fn test_old_cli_rejected() {
        let temp = TempDir::new().unwrap();
        let err = generate_registries(Some(INPUT), "2.10.3", temp.path(), None).unwrap_err();
        assert!(err.to_string().contains("not supported on CodeQL CLI versions earlier than 2.10.4"));
    }

    #[test]
    fn test_invalid_inputs() {
        let err = parse_registries(Some("- url: x\n  token: y\n")).unwrap_err();
        assert!(err.to_string().contains("'url' and 'packages'"));

        let err = parse_registries(Some("url: x")).unwrap_err();
        assert!(err.to_string().contains("'url' and 'packages'"));

        let err = parse_registries(Some("- [unclosed")).unwrap_err();
        assert!(err.to_string().contains("Must be a YAML string"));
    }
}
