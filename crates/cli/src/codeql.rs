//! Process-backed toolchain: runs the acquired `codeql` executable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use codeql_init_core::timeout::with_timeout;
use codeql_init_core::toolchain::{PackDownloadOutput, ResolvedQueries};
use codeql_init_core::{EnvOverlay, Error, Result, Toolchain};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct VersionOutput {
    version: String,
}

/// [`Toolchain`] that spawns the `codeql` executable and parses its JSON output.
pub struct CodeQlCli {
    path: PathBuf,
    timeout: Duration,
    version: OnceCell<String>,
}

impl CodeQlCli {
    /// Wrap the executable at `path`. Each invocation is limited to `timeout`.
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            version: OnceCell::new(),
        }
    }

    async fn run(&self, args: &[String], env: &EnvOverlay) -> Result<Vec<u8>> {
        let subcommand = subcommand(args);
        let mut command = Command::new(&self.path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        env.apply(&mut command);

        debug!(codeql = %self.path.display(), ?args, "Running toolchain");
        let output = with_timeout(self.timeout, command.output(), || {
            warn!(%subcommand, timeout_secs = self.timeout.as_secs(), "Toolchain command timed out");
        })
        .await
        .ok_or_else(|| {
            Error::infrastructure(format!(
                "codeql {subcommand} timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::infrastructure(format!("Failed to run {}: {e}", self.path.display())))?;

        if !output.status.success() {
            return Err(Error::infrastructure(format!(
                "codeql {subcommand} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[String], env: &EnvOverlay) -> Result<T> {
        let stdout = self.run(args, env).await?;
        serde_json::from_slice(&stdout).map_err(|e| {
            Error::infrastructure(format!(
                "Unexpected output from codeql {}: {e}",
                subcommand(args)
            ))
        })
    }
}

/// The leading non-flag arguments, e.g. `resolve queries`.
fn subcommand(args: &[String]) -> String {
    args.iter()
        .take_while(|arg| !arg.starts_with('-'))
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl Toolchain for CodeQlCli {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn version(&self) -> Result<String> {
        self.version
            .get_or_try_init(|| async {
                let output: VersionOutput = self
                    .run_json(&strings(&["version", "--format=json"]), &EnvOverlay::new())
                    .await?;
                debug!(version = %output.version, "Detected CLI version");
                Ok::<_, Error>(output.version)
            })
            .await
            .cloned()
    }

    async fn resolve_languages(&self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        self.run_json(
            &strings(&["resolve", "languages", "--format=json"]),
            &EnvOverlay::new(),
        )
        .await
    }

    async fn resolve_queries(
        &self,
        queries: &[String],
        extra_search_path: Option<&Path>,
    ) -> Result<ResolvedQueries> {
        let mut args = strings(&["resolve", "queries"]);
        args.extend(queries.iter().cloned());
        args.push("--format=bylanguage".into());
        if let Some(path) = extra_search_path {
            args.push("--additional-packs".into());
            args.push(path.display().to_string());
        }
        self.run_json(&args, &EnvOverlay::new()).await
    }

    async fn pack_download(
        &self,
        packs: &[String],
        qlconfig_file: Option<&Path>,
        env: &EnvOverlay,
    ) -> Result<PackDownloadOutput> {
        let mut args = strings(&["pack", "download"]);
        if let Some(qlconfig) = qlconfig_file {
            args.push(format!("--qlconfig-file={}", qlconfig.display()));
        }
        args.push("--format=json".into());
        args.push("--resolve-query-specs".into());
        args.extend(packs.iter().cloned());
        self.run_json(&args, env).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_codeql(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("codeql");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_subcommand() {
        assert_eq!(subcommand(&strings(&["resolve", "queries", "a.ql"])), "resolve queries");
        assert_eq!(subcommand(&strings(&["version", "--format=json"])), "version");
    }

    #[tokio::test]
    async fn test_version_is_cached() {
        let dir = TempDir::new().unwrap();
        let path = fake_codeql(&dir, r#"echo '{"version": "2.12.4", "features": {}}'"#);
        let cli = CodeQlCli::new(&path, Duration::from_secs(30));

        assert_eq!(cli.version().await.unwrap(), "2.12.4");
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cli.version().await.unwrap(), "2.12.4");
    }

    #[tokio::test]
    async fn test_resolve_queries_arguments() {
        let dir = TempDir::new().unwrap();
        let args_file = dir.path().join("args");
        let path = fake_codeql(
            &dir,
            &format!(
                r#"echo "$@" > {}
echo '{{"byLanguage": {{"javascript": {{"/q/a.ql": {{}}}}}}}}'"#,
                args_file.display()
            ),
        );
        let cli = CodeQlCli::new(&path, Duration::from_secs(30));

        let resolved = cli
            .resolve_queries(&["suite.qls".into()], Some(Path::new("/packs")))
            .await
            .unwrap();
        assert!(resolved.by_language["javascript"].contains_key("/q/a.ql"));
        assert_eq!(
            std::fs::read_to_string(&args_file).unwrap().trim(),
            "resolve queries suite.qls --format=bylanguage --additional-packs /packs"
        );
    }

    #[tokio::test]
    async fn test_pack_download_applies_overlay() {
        let dir = TempDir::new().unwrap();
        let path = fake_codeql(
            &dir,
            r#"echo "{\"packs\": [{\"name\": \"$CODEQL_REGISTRIES_AUTH\", \"version\": \"1.0.0\"}]}""#,
        );
        let cli = CodeQlCli::new(&path, Duration::from_secs(30));
        let env = EnvOverlay::new().with("CODEQL_REGISTRIES_AUTH", Some("https://ghcr.io/v2/=secret"));

        let output = cli
            .pack_download(&["a/b".into()], Some(Path::new("/tmp/qlconfig.yml")), &env)
            .await
            .unwrap();
        assert_eq!(output.packs[0].name, "https://ghcr.io/v2/=secret");
        assert_eq!(output.packs[0].version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let path = fake_codeql(&dir, "echo 'no such pack' >&2\nexit 2");
        let cli = CodeQlCli::new(&path, Duration::from_secs(30));

        let err = cli.resolve_languages().await.unwrap_err();
        assert!(matches!(err, Error::Infrastructure { .. }));
        assert!(err.to_string().contains("codeql resolve languages failed"));
        assert!(err.to_string().contains("no such pack"));
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let dir = TempDir::new().unwrap();
        let path = fake_codeql(&dir, "echo 'not json'");
        let cli = CodeQlCli::new(&path, Duration::from_secs(30));

        let err = cli.version().await.unwrap_err();
        assert!(err.to_string().contains("Unexpected output from codeql version"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let path = fake_codeql(&dir, "sleep 30");
        let cli = CodeQlCli::new(&path, Duration::from_millis(100));

        let err = cli.resolve_languages().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
