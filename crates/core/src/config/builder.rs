//! Building the merged scan configuration.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::file::{ConfigLocation, FileConfig};
use super::queries::{
    BuiltinSuite, QueryUses, add_default_queries, add_local_queries, add_remote_queries,
    run_resolve_queries,
};
use super::registries::generate_registries;
use super::{
    DEFAULT_DEBUG_ARTIFACT_NAME, DEFAULT_DEBUG_DATABASE_NAME, QueriesByLanguage, ScanConfig,
    db_location_or_default, save, user_config_path,
};
use crate::augment::{
    Packs, augmented_user_config, calculate_augmentation, inject_ml_queries, merge_packs,
    parse_packs_from_config,
};
use crate::env::EnvOverlay;
use crate::features::{Feature, Features, use_config_file_in_cli};
use crate::host::RepositoryHost;
use crate::language::{Language, no_languages_error, parse_languages};
use crate::toolchain::{CODEQL_VERSION_SECURITY_EXPERIMENTAL_SUITE, Toolchain, version_at_least};
use crate::tools::Os;
use crate::{Error, Result};

/// Raw inputs for a configuration build.
#[derive(Debug, Clone)]
pub struct ConfigInputs {
    /// Comma separated languages; detected from the repository when absent.
    pub languages: Option<String>,
    /// Comma separated queries; a leading `+` combines with the file.
    pub queries: Option<String>,
    /// Comma separated packs; a leading `+` combines with the file.
    pub packs: Option<String>,
    /// Comma separated threat models.
    pub threat_models: Option<String>,
    /// YAML list of pack registries.
    pub registries: Option<String>,
    /// Local path or `owner/repo/path@ref`.
    pub config_file: Option<String>,
    /// Database directory; defaults under `temp_dir`.
    pub db_location: Option<PathBuf>,
    /// Upload debug artifacts.
    pub debug_mode: bool,
    /// Name of the debug artifact.
    pub debug_artifact_name: String,
    /// Name of the database in the debug artifact.
    pub debug_database_name: String,
    /// Where the configuration and generated files are written.
    pub temp_dir: PathBuf,
    /// Checkout of the analysed repository.
    pub workspace: PathBuf,
    /// Token exposed to pack downloads as `GITHUB_TOKEN`.
    pub token: Option<String>,
    /// An already configured `CODEQL_REGISTRIES_AUTH`.
    pub registries_auth: Option<String>,
}

impl ConfigInputs {
    /// Inputs with nothing set.
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            languages: None,
            queries: None,
            packs: None,
            threat_models: None,
            registries: None,
            config_file: None,
            db_location: None,
            debug_mode: false,
            debug_artifact_name: DEFAULT_DEBUG_ARTIFACT_NAME.to_string(),
            debug_database_name: DEFAULT_DEBUG_DATABASE_NAME.to_string(),
            temp_dir: temp_dir.into(),
            workspace: workspace.into(),
            token: None,
            registries_auth: None,
        }
    }
}

/// Produces the [`ScanConfig`] from inputs, the configuration file and the toolchain.
pub struct ConfigBuilder<'a> {
    toolchain: &'a dyn Toolchain,
    host: &'a dyn RepositoryHost,
    features: Features,
    os: Os,
}

/// State shared while collecting queries.
struct QueryCollector<'b> {
    languages: &'b [Language],
    queries: QueriesByLanguage,
    packs: Packs,
    cli_version: &'b str,
    config_in_cli: bool,
    temp_dir: &'b Path,
    workspace: &'b Path,
}

impl<'a> ConfigBuilder<'a> {
    /// Create a builder for the host platform with no features enabled.
    #[must_use]
    pub fn new(toolchain: &'a dyn Toolchain, host: &'a dyn RepositoryHost) -> Self {
        Self {
            toolchain,
            host,
            features: Features::new(),
            os: Os::current(),
        }
    }

    /// Set the enabled features.
    #[must_use]
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Override the platform, which affects ML query support.
    #[must_use]
    pub fn with_os(mut self, os: Os) -> Self {
        self.os = os;
        self
    }

    /// Determine the languages to analyse.
    ///
    /// Explicit input wins. Otherwise the repository's languages are used, most
    /// used first, restricted to those the toolchain can extract.
    pub async fn languages(&self, input: Option<&str>) -> Result<Vec<Language>> {
        let raw: Vec<String> = input
            .unwrap_or_default()
            .split(',')
            .map(|language| language.trim().to_lowercase())
            .filter(|language| !language.is_empty())
            .collect();

        let languages = if raw.is_empty() {
            let mut detected = self.host.languages().await?;
            detected.sort_by(|a, b| b.1.cmp(&a.1));
            debug!(languages = ?detected, "Repository languages");

            let available = self.toolchain.resolve_languages().await?;
            let mut languages = Vec::new();
            for (name, _) in &detected {
                if let Some(language) = Language::parse(name)
                    && available.contains_key(language.as_str())
                    && !languages.contains(&language)
                {
                    languages.push(language);
                }
            }
            info!(
                languages = %join(&languages),
                "Automatically detected languages"
            );
            languages
        } else {
            let languages = parse_languages(&raw)?;
            info!(languages = %join(&languages), "Languages from configuration");
            languages
        };

        if languages.is_empty() {
            return Err(Error::user(no_languages_error()));
        }
        Ok(languages)
    }

    /// Build, validate and persist the configuration.
    pub async fn build(&self, inputs: &ConfigInputs) -> Result<ScanConfig> {
        let cli_version = self.toolchain.version().await?;
        let config_in_cli = use_config_file_in_cli(self.toolchain, &self.features).await?;
        if config_in_cli {
            info!(cli_version = %cli_version, "Code scanning configuration file being processed in the CodeQL CLI");
        } else {
            info!(cli_version = %cli_version, "Code scanning configuration file being processed in the init step");
        }

        let file = match &inputs.config_file {
            Some(config_file) => {
                let location = ConfigLocation::parse(config_file, &inputs.workspace)?;
                location.load(&inputs.workspace, self.host).await?
            }
            None => {
                debug!("No configuration file was provided");
                FileConfig::empty()
            }
        };

        let languages = self.languages(inputs.languages.as_deref()).await?;
        let mut collector = QueryCollector {
            languages: &languages,
            queries: languages
                .iter()
                .map(|language| (*language, super::LanguageQueries::default()))
                .collect(),
            packs: Packs::new(),
            cli_version: &cli_version,
            config_in_cli,
            temp_dir: &inputs.temp_dir,
            workspace: &inputs.workspace,
        };

        if !file.disable_default_queries()? {
            add_default_queries(self.toolchain, &languages, &mut collector.queries).await?;
        }

        let mut augmentation = calculate_augmentation(
            inputs.packs.as_deref(),
            inputs.queries.as_deref(),
            inputs.threat_models.as_deref(),
            &languages,
        )?;
        let from_config = parse_packs_from_config(file.packs(), &languages, file.file_name())?;
        collector.packs = merge_packs(from_config, &augmentation, &languages);

        let mut injected = false;
        if let Some(queries) = &augmentation.queries_input {
            for query in queries {
                injected |= self.add_query_uses(&mut collector, &query.uses, None).await?;
            }
        }
        let add_file_queries = augmentation.queries_input.is_none() || augmentation.queries_input_combines;
        if add_file_queries && file.has_queries() {
            for uses in file.query_uses()? {
                injected |= self
                    .add_query_uses(&mut collector, &uses, file.file_name())
                    .await?;
            }
        }
        augmentation.injected_ml_queries = injected;

        let paths_ignore = file.paths_ignore()?;
        let paths = file.paths()?;
        file.threat_models()?;

        let config = ScanConfig {
            languages: languages.clone(),
            queries: collector.queries,
            packs: collector.packs,
            paths_ignore,
            paths,
            original_user_input: file.original_input(),
            temp_dir: inputs.temp_dir.clone(),
            codeql_cmd: self.toolchain.path().to_path_buf(),
            db_location: db_location_or_default(inputs.db_location.as_deref(), &inputs.temp_dir),
            debug_mode: inputs.debug_mode,
            debug_artifact_name: inputs.debug_artifact_name.clone(),
            debug_database_name: inputs.debug_database_name.clone(),
            augmentation_properties: augmentation,
        };

        if config_in_cli {
            self.write_user_config(&config, &cli_version)?;
        } else {
            for language in &config.languages {
                if !config.has_queries_for(*language) {
                    return Err(Error::user(format!(
                        "Did not detect any queries to run for {language}. Please make sure that \
                         the default queries are enabled, or you are specifying queries to run."
                    )));
                }
            }
            let registries = generate_registries(
                inputs.registries.as_deref(),
                &cli_version,
                &inputs.temp_dir,
                inputs.registries_auth.as_deref(),
            )?;
            let env = EnvOverlay::new()
                .with("GITHUB_TOKEN", inputs.token.clone())
                .with("CODEQL_REGISTRIES_AUTH", registries.auth_tokens.clone());
            self.download_packs(&config, registries.qlconfig_file.as_deref(), &env)
                .await?;
        }

        save(&config)?;
        Ok(config)
    }

    /// Add the queries named by one `uses` entry. Returns whether the ML pack was injected.
    async fn add_query_uses(
        &self,
        collector: &mut QueryCollector<'_>,
        uses: &str,
        config_file: Option<&str>,
    ) -> Result<bool> {
        match QueryUses::parse(uses, config_file)? {
            QueryUses::Local(path) => {
                add_local_queries(
                    self.toolchain,
                    &mut collector.queries,
                    &path,
                    collector.workspace,
                    config_file,
                )
                .await?;
                Ok(false)
            }
            QueryUses::BuiltinSuite(suite) => self.add_builtin_suite_queries(collector, suite).await,
            QueryUses::Remote {
                repository,
                path,
                reference,
            } => {
                if collector.config_in_cli {
                    debug!(repository = %repository, reference = %reference, "Deferring remote queries to the CLI");
                } else {
                    add_remote_queries(
                        self.toolchain,
                        self.host,
                        &mut collector.queries,
                        &repository,
                        path.as_deref(),
                        &reference,
                        collector.temp_dir,
                    )
                    .await?;
                }
                Ok(false)
            }
        }
    }

    async fn add_builtin_suite_queries(
        &self,
        collector: &mut QueryCollector<'_>,
        suite: BuiltinSuite,
    ) -> Result<bool> {
        if suite == BuiltinSuite::SecurityExperimental
            && !version_at_least(collector.cli_version, CODEQL_VERSION_SECURITY_EXPERIMENTAL_SUITE)
        {
            return Err(Error::resolution(format!(
                "The 'security-experimental' suite is not supported on CodeQL CLI versions earlier \
                 than {CODEQL_VERSION_SECURITY_EXPERIMENTAL_SUITE}. Please upgrade to CodeQL CLI \
                 version {CODEQL_VERSION_SECURITY_EXPERIMENTAL_SUITE} or later."
            )));
        }

        let injected = inject_ml_queries(
            &mut collector.packs,
            collector.languages,
            self.features.is_enabled(Feature::MlPoweredQueriesEnabled),
            collector.cli_version,
            self.os,
        );
        if injected {
            info!(suite = %suite, "Added ML-powered JavaScript queries");
        }

        let suites: Vec<String> = collector
            .languages
            .iter()
            .map(|language| suite.suite_file(*language))
            .collect();
        run_resolve_queries(self.toolchain, &mut collector.queries, &suites, None).await?;
        Ok(injected)
    }

    fn write_user_config(&self, config: &ScanConfig, cli_version: &str) -> Result<PathBuf> {
        let augmented = augmented_user_config(
            &config.original_user_input,
            &config.augmentation_properties,
            cli_version,
        );
        let path = user_config_path(&config.temp_dir);
        std::fs::create_dir_all(&config.temp_dir)?;
        let contents = serde_yaml::to_string(&augmented)?;
        std::fs::write(&path, &contents)?;
        debug!(path = %path.display(), config = %contents, "Wrote augmented user configuration");
        Ok(path)
    }

    async fn download_packs(
        &self,
        config: &ScanConfig,
        qlconfig_file: Option<&Path>,
        env: &EnvOverlay,
    ) -> Result<()> {
        let mut downloaded = 0;
        for language in &config.languages {
            let Some(packs) = config.packs.get(language).filter(|packs| !packs.is_empty()) else {
                continue;
            };
            info!(language = %language, "Downloading custom packs");
            let output = self
                .toolchain
                .pack_download(packs, qlconfig_file, env)
                .await?;
            downloaded += output.packs.len();
            let names: Vec<String> = output
                .packs
                .iter()
                .map(|pack| format!("{}@{}", pack.name, pack.version.as_deref().unwrap_or("latest")))
                .collect();
            info!(packs = %names.join(", "), "Downloaded packs");
        }
        match downloaded {
            0 => info!("No packs to download"),
            1 => info!("Downloaded 1 pack"),
            n => info!("Downloaded {n} packs"),
        }
        Ok(())
    }
}

fn join(languages: &[Language]) -> String {
    languages
        .iter()
        .copied()
        .map(Language::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
