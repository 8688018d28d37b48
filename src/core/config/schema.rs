//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$REPOFLOW_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/repoflow/config.toml`
//! 3. `~/.repoflow/config.toml`
//!
//! # Repo Config
//!
//! Located at `<git_dir>/repoflow/config.toml`.
//!
//! # Validation
//!
//! Values are validated after parsing; unknown keys are rejected.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Global configuration (user scope).
///
/// ```toml
/// interactive = true
/// log_filter = "repoflow=debug"
///
/// [orchestrator]
/// save_local_changes = false
///
/// [credentials]
/// initial_kind = "normal"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// `tracing` filter directive used when `REPOFLOW_LOG` is unset
    pub log_filter: Option<String>,

    /// Merge/rebase/switch defaults
    pub orchestrator: Option<OrchestratorConfig>,

    /// Credential retry defaults
    pub credentials: Option<CredentialsConfig>,

    /// Scheduler tuning
    pub scheduler: Option<SchedulerConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(filter) = &self.log_filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "log_filter cannot be empty".to_string(),
                ));
            }
        }
        validate_sections(
            self.orchestrator.as_ref(),
            self.credentials.as_ref(),
            self.scheduler.as_ref(),
        )
    }
}

/// Repository configuration.
///
/// ```toml
/// [orchestrator]
/// update_submodules = true
///
/// [watcher]
/// enabled = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Merge/rebase/switch overrides
    pub orchestrator: Option<OrchestratorConfig>,

    /// Credential retry overrides
    pub credentials: Option<CredentialsConfig>,

    /// Lock watcher settings
    pub watcher: Option<WatcherConfig>,

    /// Scheduler tuning
    pub scheduler: Option<SchedulerConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sections(
            self.orchestrator.as_ref(),
            self.credentials.as_ref(),
            self.scheduler.as_ref(),
        )
    }
}

fn validate_sections(
    orchestrator: Option<&OrchestratorConfig>,
    credentials: Option<&CredentialsConfig>,
    scheduler: Option<&SchedulerConfig>,
) -> Result<(), ConfigError> {
    if let Some(o) = orchestrator {
        o.validate()?;
    }
    if let Some(c) = credentials {
        c.validate()?;
    }
    if let Some(s) = scheduler {
        s.validate()?;
    }
    Ok(())
}

/// Defaults applied to merge, rebase and branch switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Stash local changes without asking
    pub save_local_changes: Option<bool>,

    /// Update submodules after the operation
    pub update_submodules: Option<bool>,

    /// Message recorded on stashes created by repoflow
    pub stash_message: Option<String>,
}

impl OrchestratorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(msg) = &self.stash_message {
            if msg.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "orchestrator.stash_message cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Credential retry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Credential kind tried first: "normal" or "session"
    pub initial_kind: Option<String>,
}

impl CredentialsConfig {
    /// Valid credential kinds.
    pub const VALID_KINDS: &'static [&'static str] = &["normal", "session"];

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(kind) = &self.initial_kind {
            if !Self::VALID_KINDS.contains(&kind.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid credentials.initial_kind '{}', must be one of: {}",
                    kind,
                    Self::VALID_KINDS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Lock watcher settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Observe the metadata directory for lock files
    pub enabled: Option<bool>,
}

/// Scheduler tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How often gate waits re-check cancellation, in milliseconds
    pub gate_poll_ms: Option<u64>,
}

impl SchedulerConfig {
    /// Upper bound for `gate_poll_ms`.
    pub const MAX_GATE_POLL_MS: u64 = 10_000;

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ms) = self.gate_poll_ms {
            if ms == 0 || ms > Self::MAX_GATE_POLL_MS {
                return Err(ConfigError::InvalidValue(format!(
                    "scheduler.gate_poll_ms must be between 1 and {}",
                    Self::MAX_GATE_POLL_MS
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod global_config {
        use super::*;

        #[test]
        fn defaults_validate() {
            assert!(GlobalConfig::default().validate().is_ok());
        }

        #[test]
        fn parses_sections() {
            let config: GlobalConfig = toml::from_str(
                r#"
                interactive = false

                [orchestrator]
                save_local_changes = true

                [credentials]
                initial_kind = "session"
                "#,
            )
            .unwrap();
            assert_eq!(config.interactive, Some(false));
            assert_eq!(
                config.orchestrator.unwrap().save_local_changes,
                Some(true)
            );
            assert_eq!(
                config.credentials.unwrap().initial_kind.as_deref(),
                Some("session")
            );
        }

        #[test]
        fn empty_log_filter_rejected() {
            let config = GlobalConfig {
                log_filter: Some("  ".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn unknown_field_rejected() {
            let parsed: Result<GlobalConfig, _> = toml::from_str("bogus = 1");
            assert!(parsed.is_err());
        }
    }

    mod repo_config {
        use super::*;

        #[test]
        fn invalid_credential_kind() {
            let config = RepoConfig {
                credentials: Some(CredentialsConfig {
                    initial_kind: Some("kerberos".to_string()),
                }),
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("kerberos"));
        }

        #[test]
        fn gate_poll_bounds() {
            for (ms, ok) in [(0, false), (1, true), (10_000, true), (10_001, false)] {
                let config = RepoConfig {
                    scheduler: Some(SchedulerConfig {
                        gate_poll_ms: Some(ms),
                    }),
                    ..Default::default()
                };
                assert_eq!(config.validate().is_ok(), ok, "gate_poll_ms = {ms}");
            }
        }

        #[test]
        fn empty_stash_message_rejected() {
            let config = RepoConfig {
                orchestrator: Some(OrchestratorConfig {
                    stash_message: Some(String::new()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn watcher_section_parses() {
            let config: RepoConfig = toml::from_str("[watcher]\nenabled = false").unwrap();
            assert_eq!(config.watcher.unwrap().enabled, Some(false));
        }
    }
}
