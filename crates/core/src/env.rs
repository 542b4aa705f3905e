//! Environment overlays for spawned toolchain processes.
//!
//! Overrides are carried as a value and applied to a single child process
//! rather than written into the current process environment.

use std::collections::BTreeMap;

use tokio::process::Command;

/// A set of environment variable overrides for one toolchain invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Create an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable. `None` values are ignored so optional secrets can be passed through.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.vars.insert(key.into(), value.into());
        }
        self
    }

    /// Look up an override.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether the overlay sets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over the overrides.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply the overrides to a command, on top of the inherited environment.
    pub fn apply(&self, command: &mut Command) {
        command.envs(self.vars.iter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_values_ignored() {
        let overlay = EnvOverlay::new()
            .with("GITHUB_TOKEN", Some("token"))
            .with("CODEQL_REGISTRIES_AUTH", None::<String>);
        assert_eq!(overlay.get("GITHUB_TOKEN"), Some("token"));
        assert_eq!(overlay.get("CODEQL_REGISTRIES_AUTH"), None);
        assert_eq!(overlay.iter().count(), 1);
    }

    #[test]
    fn test_empty() {
        assert!(EnvOverlay::new().is_empty());
        assert!(!EnvOverlay::new().with("A", Some("b")).is_empty());
    }

    #[tokio::test]
    async fn test_apply_sets_child_env_only() {
        let overlay = EnvOverlay::new().with("CODEQL_INIT_OVERLAY_TEST", Some("from-overlay"));
        let mut command = Command::new("sh");
        command.arg("-c").arg("printf %s \"$CODEQL_INIT_OVERLAY_TEST\"");
        overlay.apply(&mut command);

        let output = command.output().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "from-overlay");
        assert!(std::env::var("CODEQL_INIT_OVERLAY_TEST").is_err());
    }
}
