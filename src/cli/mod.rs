//! cli
//!
//! Command-line interface layer for repoflow.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//! - Does NOT touch repositories directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to
//! handlers that drive a [`crate::engine::RepoEngine`]. All repository access
//! flows through the engine's schedulers.

pub mod args;
pub mod commands;

pub use args::Cli;

use crate::core::config::Config;
use crate::logging;
use crate::ui::output::Verbosity;
use anyhow::Result;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    // Repo-level config is loaded per command; only the global filter matters here.
    let global = Config::load(None).map(|r| r.config).unwrap_or_default();
    logging::init(verbosity, global.log_filter());

    let ctx = commands::Context {
        cwd: cli.cwd.clone(),
        verbosity,
        interactive: cli.interactive(),
        stash: cli.stash,
        submodules: cli.submodules,
    };

    commands::dispatch(cli.command, &ctx)
}
