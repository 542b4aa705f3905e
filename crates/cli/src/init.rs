//! One init run: acquire the toolchain, then build and save the scan configuration.

use std::path::PathBuf;
use std::time::Duration;

use codeql_init_core::augment::ml_powered_js_queries_status;
use codeql_init_core::config::{ConfigBuilder, ConfigInputs, ScanConfig, config_path};
use codeql_init_core::tools::{DeploymentVariant, Platform, ToolSource};
use codeql_init_tools_bundle::{
    AcquiredBundle, Acquirer, BundleLocator, GitHubReleaseApi, ReleaseSource, ToolCache,
    ToolsInput, default_version,
};
use serde::Serialize;
use tracing::info;

use crate::cli::Cli;
use crate::codeql::CodeQlCli;
use crate::github::GitHubRepositoryHost;

/// What the run produced, printed as JSON on stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSummary {
    /// The `codeql` executable.
    pub codeql_path: PathBuf,
    /// CLI version, or the cache key when unknown.
    pub tools_version: String,
    /// Where the bundle came from.
    pub tools_source: ToolSource,
    /// Time spent fetching, for downloaded bundles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_download_duration_ms: Option<u64>,
    /// Tool cache key of the bundle.
    pub tools_cache_version: String,
    /// Whether the platform default bundle is in use.
    pub is_default_bundle: bool,
    /// Whether the bundle is pinned by the instance.
    pub pinned_bundle: bool,
    /// Where the scan configuration was written.
    pub config_path: PathBuf,
    /// Languages to analyse.
    pub languages: Vec<String>,
    /// Status of the ML-powered JavaScript queries.
    pub ml_powered_js_queries: String,
}

impl InitSummary {
    fn new(acquired: AcquiredBundle, config: &ScanConfig) -> Self {
        Self {
            codeql_path: acquired.handle.path,
            tools_version: acquired.handle.version,
            tools_source: acquired.handle.source,
            tools_download_duration_ms: acquired.handle.download_duration_ms,
            tools_cache_version: acquired.cache_version,
            is_default_bundle: acquired.is_default_bundle,
            pinned_bundle: acquired.pinned,
            config_path: config_path(&config.temp_dir),
            languages: config.languages.iter().map(ToString::to_string).collect(),
            ml_powered_js_queries: ml_powered_js_queries_status(&config.packs),
        }
    }
}

fn config_inputs(cli: &Cli) -> ConfigInputs {
    ConfigInputs {
        languages: cli.languages.clone(),
        queries: cli.queries.clone(),
        packs: cli.packs.clone(),
        threat_models: cli.threat_models.clone(),
        registries: cli.registries.clone(),
        config_file: cli.config_file.clone(),
        db_location: cli.db_location.clone(),
        debug_mode: cli.debug,
        debug_artifact_name: cli.debug_artifact_name.clone(),
        debug_database_name: cli.debug_database_name.clone(),
        token: cli.token.clone(),
        registries_auth: cli.registries_auth.clone(),
        ..ConfigInputs::new(&cli.temp_dir, &cli.workspace)
    }
}

/// Acquire the toolchain and write the scan configuration.
pub async fn run(cli: &Cli) -> miette::Result<InitSummary> {
    let platform = cli.platform.unwrap_or_else(Platform::current);
    info!(%platform, variant = %cli.variant, repository = %cli.repository, "Starting init");

    let api = GitHubReleaseApi::new(&cli.api_url, &cli.server_url, cli.token.clone())?;
    let locator = match cli.variant {
        DeploymentVariant::Dotcom => BundleLocator::new(&api, platform),
        DeploymentVariant::Ghes => BundleLocator::ghes(
            &api,
            platform,
            ReleaseSource::new(&cli.api_url, &cli.server_url, &cli.bundle_repository),
        ),
        DeploymentVariant::Ghae => BundleLocator::ghae(&api, platform),
    };
    let cache = match &cli.tool_cache {
        Some(root) => ToolCache::new(root, platform.arch),
        None => ToolCache::from_env(platform.arch),
    };
    let default = default_version(cli.variant)?;
    let tools = ToolsInput::parse(cli.tools.as_deref());

    let acquired = Acquirer::new(&api, &locator, &cache, &default, platform, &cli.temp_dir)
        .acquire(tools.as_ref())
        .await?;

    let toolchain = CodeQlCli::new(
        &acquired.handle.path,
        Duration::from_secs(cli.command_timeout),
    );
    let host = GitHubRepositoryHost::new(
        &cli.api_url,
        &cli.server_url,
        cli.repository.clone(),
        cli.token.clone(),
    )?;
    let config = ConfigBuilder::new(&toolchain, &host)
        .with_features(cli.features.iter().copied().collect())
        .with_os(platform.os)
        .build(&config_inputs(cli))
        .await?;

    info!(
        languages = ?config.languages,
        config = %config_path(&config.temp_dir).display(),
        "Init complete"
    );
    Ok(InitSummary::new(acquired, &config))
}
