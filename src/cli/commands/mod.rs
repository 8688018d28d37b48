//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens a [`RepoEngine`] for the working directory
//! 2. Calls the engine
//! 3. Formats and displays the outcome
//!
//! Handlers do NOT touch repositories directly.

mod operations;
mod remote;
mod status;
mod watch;

pub use operations::{merge, rebase, switch};
pub use remote::{clone, fetch, push};
pub use status::status;
pub use watch::watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::core::config::Config;
use crate::engine::{EngineServices, OperationOptions, RepoEngine};
use crate::git::{Git, GitBackend};
use crate::ui::output::Verbosity;
use crate::ui::progress::{ProgressMonitor, TerminalMonitor};

/// Settings shared by every command, from global flags.
#[derive(Debug, Clone)]
pub struct Context {
    /// Working directory override
    pub cwd: Option<PathBuf>,
    /// Output level
    pub verbosity: Verbosity,
    /// Whether prompts may be shown
    pub interactive: bool,
    /// `--stash`
    pub stash: bool,
    /// `--submodules`
    pub submodules: bool,
}

impl Context {
    /// The directory commands run in.
    pub fn cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => std::path::absolute(cwd).context("invalid --cwd"),
            None => std::env::current_dir().context("cannot determine current directory"),
        }
    }

    /// Global plus repository configuration for `cwd`.
    pub fn load_config(&self) -> Result<Config> {
        let cwd = self.cwd()?;
        let paths = Git::open(&cwd).ok().map(|git| git.paths().clone());
        Ok(Config::load(paths.as_ref())?.config)
    }

    /// Terminal services honoring flags and configuration.
    pub fn services(&self, config: &Config) -> EngineServices {
        EngineServices::terminal(self.interactive && config.interactive())
    }

    /// Open the engine for the repository containing `cwd`.
    pub fn open_engine(&self) -> Result<RepoEngine> {
        let config = self.load_config()?;
        let services = self.services(&config);
        Ok(RepoEngine::open(&self.cwd()?, config, services)?)
    }

    /// Operation options: configuration defaults, raised by flags.
    pub fn options(&self, engine: &RepoEngine) -> OperationOptions {
        let defaults = engine.default_options();
        OperationOptions {
            save_local_changes: self.stash || defaults.save_local_changes,
            update_submodules: self.submodules || defaults.update_submodules,
        }
    }

    /// Progress monitor printing at this verbosity.
    pub fn monitor(&self) -> Arc<dyn ProgressMonitor> {
        Arc::new(TerminalMonitor::new(self.verbosity))
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Status { paths } => status::status(ctx, &paths),
        Command::Merge { target } => operations::merge(ctx, &target),
        Command::Rebase { target } => operations::rebase(ctx, &target),
        Command::Switch { branch } => operations::switch(ctx, &branch),
        Command::Fetch { remote } => remote::fetch(ctx, &remote),
        Command::Push { remote, refspecs } => remote::push(ctx, &remote, refspecs),
        Command::Clone { url, dir } => remote::clone(ctx, &url, &dir),
        Command::Watch { seconds } => watch::watch(ctx, seconds),
    }
}
