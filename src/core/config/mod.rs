//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Repository-level overrides
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$REPOFLOW_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/repoflow/config.toml`
//! 3. `~/.repoflow/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use repoflow::core::config::Config;
//!
//! let config = Config::load(None).unwrap().config;
//! println!("Interactive: {}", config.interactive());
//! println!("Stash message: {}", config.stash_message());
//! ```

pub mod schema;

pub use schema::{
    CredentialsConfig, GlobalConfig, OrchestratorConfig, RepoConfig, SchedulerConfig,
    WatcherConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::auth::CredentialKind;
use crate::core::cancel::CANCEL_POLL_INTERVAL;
use crate::core::paths::RepoPaths;

/// Default message recorded on stashes created before an operation.
pub const DEFAULT_STASH_MESSAGE: &str = "repoflow: stash before operation";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Files that contributed, in precedence order.
    pub sources: Vec<PathBuf>,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence automatically: repo config overrides global
/// config, which overrides the defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if in a repo)
    pub repo: Option<RepoConfig>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// Missing files are not an error; files that exist but fail to parse or
    /// validate are.
    pub fn load(paths: Option<&RepoPaths>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global_path();
        Self::load_from(global_path.as_deref(), paths)
    }

    /// Load configuration from an explicit global file and repository.
    pub fn load_from(
        global_path: Option<&Path>,
        paths: Option<&RepoPaths>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut sources = Vec::new();

        let global = match global_path.filter(|p| p.exists()) {
            Some(path) => {
                sources.push(path.to_path_buf());
                read_toml::<GlobalConfig>(path)?
            }
            None => GlobalConfig::default(),
        };

        let repo_path = paths.map(RepoPaths::repo_config_path);
        let repo = match repo_path.filter(|p| p.exists()) {
            Some(path) => {
                let repo = read_toml::<RepoConfig>(&path)?;
                sources.push(path);
                Some(repo)
            }
            None => None,
        };

        global.validate()?;
        if let Some(r) = &repo {
            r.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config { global, repo },
            sources,
        })
    }

    /// Locate the global config file, if any.
    fn find_global_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("REPOFLOW_CONFIG") {
            return Some(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("repoflow/config.toml");
            if path.exists() {
                return Some(path);
            }
        }
        dirs::home_dir().map(|home| home.join(".repoflow/config.toml"))
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn orchestrator<T>(&self, get: impl Fn(&OrchestratorConfig) -> Option<T>) -> Option<T> {
        self.repo
            .as_ref()
            .and_then(|r| r.orchestrator.as_ref())
            .and_then(&get)
            .or_else(|| self.global.orchestrator.as_ref().and_then(&get))
    }

    /// Whether prompts are shown. Defaults to `true`.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    /// Log filter from the global config.
    pub fn log_filter(&self) -> Option<&str> {
        self.global.log_filter.as_deref()
    }

    /// Stash local changes without prompting. Defaults to `false`.
    pub fn save_local_changes(&self) -> bool {
        self.orchestrator(|o| o.save_local_changes).unwrap_or(false)
    }

    /// Update submodules after an operation. Defaults to `false`.
    pub fn update_submodules(&self) -> bool {
        self.orchestrator(|o| o.update_submodules).unwrap_or(false)
    }

    /// Message recorded on repoflow-created stashes.
    pub fn stash_message(&self) -> String {
        self.orchestrator(|o| o.stash_message.clone())
            .unwrap_or_else(|| DEFAULT_STASH_MESSAGE.to_string())
    }

    /// First credential kind tried by remote operations.
    pub fn initial_credential_kind(&self) -> CredentialKind {
        let kind = self
            .repo
            .as_ref()
            .and_then(|r| r.credentials.as_ref())
            .and_then(|c| c.initial_kind.as_deref())
            .or_else(|| {
                self.global
                    .credentials
                    .as_ref()
                    .and_then(|c| c.initial_kind.as_deref())
            });
        match kind {
            Some("session") => CredentialKind::SessionBased,
            _ => CredentialKind::Normal,
        }
    }

    /// Whether the lock watcher runs. Defaults to `true`.
    pub fn watcher_enabled(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.watcher.as_ref())
            .and_then(|w| w.enabled)
            .unwrap_or(true)
    }

    /// Poll interval used by gate waits.
    pub fn gate_poll_interval(&self) -> Duration {
        self.repo
            .as_ref()
            .and_then(|r| r.scheduler.as_ref())
            .and_then(|s| s.gate_poll_ms)
            .or_else(|| {
                self.global
                    .scheduler
                    .as_ref()
                    .and_then(|s| s.gate_poll_ms)
            })
            .map(Duration::from_millis)
            .unwrap_or(CANCEL_POLL_INTERVAL)
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_paths(temp: &TempDir) -> RepoPaths {
        RepoPaths::new(temp.path().join(".git"), temp.path().to_path_buf())
    }

    fn write_repo_config(temp: &TempDir, contents: &str) {
        let paths = repo_paths(temp);
        fs::create_dir_all(paths.repoflow_dir()).unwrap();
        fs::write(paths.repo_config_path(), contents).unwrap();
    }

    #[test]
    fn load_empty_defaults() {
        let temp = TempDir::new().unwrap();
        let result = Config::load_from(None, Some(&repo_paths(&temp))).unwrap();
        let config = result.config;

        assert!(result.sources.is_empty());
        assert!(config.interactive());
        assert!(!config.save_local_changes());
        assert!(!config.update_submodules());
        assert_eq!(config.stash_message(), DEFAULT_STASH_MESSAGE);
        assert_eq!(config.initial_credential_kind(), CredentialKind::Normal);
        assert!(config.watcher_enabled());
        assert_eq!(config.gate_poll_interval(), CANCEL_POLL_INTERVAL);
    }

    #[test]
    fn load_global_file() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        fs::write(
            &global,
            r#"
            interactive = false
            [credentials]
            initial_kind = "session"
            "#,
        )
        .unwrap();

        let result = Config::load_from(Some(&global), None).unwrap();
        assert_eq!(result.sources, vec![global]);
        assert!(!result.config.interactive());
        assert_eq!(
            result.config.initial_credential_kind(),
            CredentialKind::SessionBased
        );
    }

    #[test]
    fn repo_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        fs::write(
            &global,
            "[orchestrator]\nsave_local_changes = true\nupdate_submodules = true\n",
        )
        .unwrap();
        write_repo_config(&temp, "[orchestrator]\nsave_local_changes = false\n");

        let config = Config::load_from(Some(&global), Some(&repo_paths(&temp)))
            .unwrap()
            .config;

        assert!(!config.save_local_changes());
        // Not set in repo scope, falls through to global
        assert!(config.update_submodules());
    }

    #[test]
    fn repo_scheduler_and_watcher() {
        let temp = TempDir::new().unwrap();
        write_repo_config(&temp, "[scheduler]\ngate_poll_ms = 5\n[watcher]\nenabled = false\n");

        let config = Config::load_from(None, Some(&repo_paths(&temp)))
            .unwrap()
            .config;
        assert_eq!(config.gate_poll_interval(), Duration::from_millis(5));
        assert!(!config.watcher_enabled());
    }

    #[test]
    fn invalid_repo_value_rejected() {
        let temp = TempDir::new().unwrap();
        write_repo_config(&temp, "[credentials]\ninitial_kind = \"bogus\"\n");
        let result = Config::load_from(None, Some(&repo_paths(&temp)));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        write_repo_config(&temp, "[orchestrator\n");
        let result = Config::load_from(None, Some(&repo_paths(&temp)));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn missing_global_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        let result = Config::load_from(Some(&missing), None).unwrap();
        assert!(result.sources.is_empty());
    }
}
