use std::path::PathBuf;

use clap::Parser;
use codeql_init_core::Feature;
use codeql_init_core::RepositoryNwo;
use codeql_init_core::config::{DEFAULT_DEBUG_ARTIFACT_NAME, DEFAULT_DEBUG_DATABASE_NAME};
use codeql_init_core::tools::{DeploymentVariant, Platform};
use codeql_init_tools_bundle::{CANONICAL_REPOSITORY, DOTCOM_API_URL};

use crate::tracing::{LogLevel, TracingFormat};

#[derive(Parser, Debug)]
#[command(name = "codeql-init")]
#[command(
    about = "Acquire the CodeQL toolchain and prepare the scan configuration for a code scanning run"
)]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(
        long,
        env = "CODEQL_INIT_TOOLS",
        help = "Bundle to use: a URL, a local .tar.gz, a CLI version, or 'latest'"
    )]
    pub tools: Option<String>,

    #[arg(
        long,
        env = "CODEQL_INIT_LANGUAGES",
        help = "Comma-separated languages to analyse (detected from the repository if omitted)"
    )]
    pub languages: Option<String>,

    #[arg(
        long,
        env = "CODEQL_INIT_QUERIES",
        help = "Comma-separated queries to run; a leading '+' combines with the configuration file"
    )]
    pub queries: Option<String>,

    #[arg(
        long,
        env = "CODEQL_INIT_PACKS",
        help = "Comma-separated packs to run; a leading '+' combines with the configuration file"
    )]
    pub packs: Option<String>,

    #[arg(long, env = "CODEQL_INIT_THREAT_MODELS", help = "Comma-separated threat models")]
    pub threat_models: Option<String>,

    #[arg(
        long,
        env = "CODEQL_INIT_REGISTRIES",
        help = "YAML list of package registries ({url, packages, token})"
    )]
    pub registries: Option<String>,

    #[arg(
        long,
        env = "CODEQL_INIT_CONFIG_FILE",
        help = "Configuration file: a workspace path or owner/repo/path@ref"
    )]
    pub config_file: Option<String>,

    #[arg(long, env = "CODEQL_INIT_DB_LOCATION", help = "Where databases are created")]
    pub db_location: Option<PathBuf>,

    #[arg(long, env = "CODEQL_INIT_DEBUG", help = "Enable debug mode")]
    pub debug: bool,

    #[arg(
        long,
        env = "CODEQL_INIT_DEBUG_ARTIFACT_NAME",
        default_value = DEFAULT_DEBUG_ARTIFACT_NAME,
        help = "Name of the debug artifact"
    )]
    pub debug_artifact_name: String,

    #[arg(
        long,
        env = "CODEQL_INIT_DEBUG_DATABASE_NAME",
        default_value = DEFAULT_DEBUG_DATABASE_NAME,
        help = "Name of the database inside the debug artifact"
    )]
    pub debug_database_name: String,

    #[arg(
        long,
        env = "CODEQL_INIT_FEATURES",
        value_delimiter = ',',
        help = "Comma-separated features to enable"
    )]
    pub features: Vec<Feature>,

    #[arg(
        long,
        env = "CODEQL_INIT_VARIANT",
        default_value = "dotcom",
        value_parser = parse_variant,
        help = "Deployment variant: dotcom, ghes or ghae"
    )]
    pub variant: DeploymentVariant,

    #[arg(
        long,
        value_parser = parse_platform,
        help = "Platform to fetch the bundle for, e.g. linux-x64 (defaults to the current one)"
    )]
    pub platform: Option<Platform>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "API token")]
    pub token: Option<String>,

    #[arg(
        long,
        env = "CODEQL_REGISTRIES_AUTH",
        hide_env_values = true,
        help = "Registry credentials as url=token pairs"
    )]
    pub registries_auth: Option<String>,

    #[arg(long, env = "RUNNER_TEMP", help = "Directory for the configuration and downloads")]
    pub temp_dir: PathBuf,

    #[arg(long, env = "RUNNER_TOOL_CACHE", help = "Tool cache root")]
    pub tool_cache: Option<PathBuf>,

    #[arg(
        long,
        env = "GITHUB_WORKSPACE",
        default_value = ".",
        help = "Checkout of the analysed repository"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        env = "GITHUB_REPOSITORY",
        value_parser = parse_repository,
        help = "The analysed repository, owner/repo"
    )]
    pub repository: RepositoryNwo,

    #[arg(long, env = "GITHUB_API_URL", default_value = DOTCOM_API_URL, help = "REST API root")]
    pub api_url: String,

    #[arg(
        long,
        env = "GITHUB_SERVER_URL",
        default_value = "https://github.com",
        help = "Web root of the instance"
    )]
    pub server_url: String,

    #[arg(
        long,
        default_value = CANONICAL_REPOSITORY,
        help = "Repository publishing bundle releases on the instance"
    )]
    pub bundle_repository: String,

    #[arg(
        long,
        env = "CODEQL_INIT_COMMAND_TIMEOUT",
        default_value_t = 1800,
        help = "Seconds a single toolchain command may run"
    )]
    pub command_timeout: u64,

    #[arg(
        short = 'l',
        long,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, value_enum, help = "Log output format (defaults to compact)")]
    pub log_format: Option<TracingFormat>,

    #[arg(long, help = "Output logs in JSON format")]
    pub json: bool,
}

fn parse_variant(s: &str) -> Result<DeploymentVariant, String> {
    DeploymentVariant::parse(s).ok_or_else(|| format!("unknown deployment variant: {s}"))
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    Platform::parse(s).ok_or_else(|| format!("unknown platform: {s}"))
}

fn parse_repository(s: &str) -> Result<RepositoryNwo, String> {
    RepositoryNwo::parse(s).ok_or_else(|| format!("expected owner/repo, got {s}"))
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeql_init_core::tools::{Arch, Os};

    const VARS: &[&str] = &[
        "CODEQL_INIT_TOOLS",
        "CODEQL_INIT_LANGUAGES",
        "CODEQL_INIT_FEATURES",
        "CODEQL_INIT_VARIANT",
        "CODEQL_INIT_DEBUG",
        "GITHUB_TOKEN",
        "RUNNER_TEMP",
        "RUNNER_TOOL_CACHE",
        "GITHUB_WORKSPACE",
        "GITHUB_REPOSITORY",
        "GITHUB_API_URL",
        "GITHUB_SERVER_URL",
    ];

    fn parse_clean(args: &[&str]) -> Result<Cli, clap::Error> {
        temp_env::with_vars_unset(VARS, || Cli::try_parse_from(args))
    }

    #[test]
    fn test_cli_default_values() {
        let cli = parse_clean(&[
            "codeql-init",
            "--temp-dir",
            "/tmp/run",
            "--repository",
            "octo/app",
        ])
        .unwrap();

        assert!(matches!(cli.level, LogLevel::Warn));
        assert!(!cli.json);
        assert!(!cli.debug);
        assert_eq!(cli.tools, None);
        assert_eq!(cli.variant, DeploymentVariant::Dotcom);
        assert_eq!(cli.api_url, "https://api.github.com");
        assert_eq!(cli.server_url, "https://github.com");
        assert_eq!(cli.bundle_repository, "github/codeql-action");
        assert_eq!(cli.workspace, PathBuf::from("."));
        assert_eq!(cli.debug_artifact_name, "debug-artifacts");
        assert_eq!(cli.debug_database_name, "db");
        assert!(cli.features.is_empty());
        assert_eq!(cli.repository.to_string(), "octo/app");
    }

    #[test]
    fn test_cli_reads_runner_environment() {
        let cli = temp_env::with_vars(
            [
                ("RUNNER_TEMP", Some("/runner/temp")),
                ("RUNNER_TOOL_CACHE", Some("/runner/toolcache")),
                ("GITHUB_REPOSITORY", Some("octo/app")),
                ("GITHUB_TOKEN", Some("secret")),
                ("CODEQL_INIT_FEATURES", Some("cli_config_file_enabled,ml_powered_queries_enabled")),
                ("CODEQL_INIT_VARIANT", Some("GHES")),
            ],
            || Cli::try_parse_from(["codeql-init"]),
        )
        .unwrap();

        assert_eq!(cli.temp_dir, PathBuf::from("/runner/temp"));
        assert_eq!(cli.tool_cache, Some(PathBuf::from("/runner/toolcache")));
        assert_eq!(cli.token.as_deref(), Some("secret"));
        assert_eq!(cli.variant, DeploymentVariant::Ghes);
        assert_eq!(
            cli.features,
            vec![Feature::CliConfigFileEnabled, Feature::MlPoweredQueriesEnabled]
        );
    }

    #[test]
    fn test_cli_arguments_override_environment() {
        let cli = temp_env::with_vars(
            [
                ("RUNNER_TEMP", Some("/runner/temp")),
                ("GITHUB_REPOSITORY", Some("octo/app")),
                ("CODEQL_INIT_TOOLS", Some("latest")),
            ],
            || {
                Cli::try_parse_from([
                    "codeql-init",
                    "--tools",
                    "2.12.0",
                    "--temp-dir",
                    "/elsewhere",
                    "--platform",
                    "darwin-arm64",
                ])
            },
        )
        .unwrap();

        assert_eq!(cli.tools.as_deref(), Some("2.12.0"));
        assert_eq!(cli.temp_dir, PathBuf::from("/elsewhere"));
        assert_eq!(cli.platform, Some(Platform::new(Os::Darwin, Arch::Arm64)));
    }

    #[test]
    fn test_cli_log_level_parsing() {
        let base = ["codeql-init", "--temp-dir", "/t", "--repository", "o/r"];
        for (flag, expected) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("error", LogLevel::Error),
        ] {
            let mut args = base.to_vec();
            args.extend(["--level", flag]);
            assert_eq!(parse_clean(&args).unwrap().level, expected);
        }

        let mut args = base.to_vec();
        args.extend(["-l", "debug", "--json", "--log-format", "pretty"]);
        let cli = parse_clean(&args).unwrap();
        assert_eq!(cli.level, LogLevel::Debug);
        assert!(cli.json);
        assert_eq!(cli.log_format, Some(TracingFormat::Pretty));
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        let base = ["codeql-init", "--temp-dir", "/t"];
        let mut args = base.to_vec();
        args.extend(["--repository", "not-a-repo"]);
        assert!(parse_clean(&args).is_err());

        let mut args = base.to_vec();
        args.extend(["--repository", "o/r", "--variant", "cloud"]);
        assert!(parse_clean(&args).is_err());

        let mut args = base.to_vec();
        args.extend(["--repository", "o/r", "--features", "time_travel"]);
        assert!(parse_clean(&args).is_err());

        let mut args = base.to_vec();
        args.extend(["--repository", "o/r", "--level", "invalid"]);
        assert!(parse_clean(&args).is_err());
    }

    #[test]
    fn test_cli_requires_temp_dir_and_repository() {
        assert!(parse_clean(&["codeql-init", "--repository", "o/r"]).is_err());
        assert!(parse_clean(&["codeql-init", "--temp-dir", "/t"]).is_err());
    }
}
