//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output; implies `--no-interactive`
//! - `--no-interactive`: Never prompt; stashing is declined and conflicts abort
//! - `--stash`: Stash local changes without asking
//! - `--submodules`: Update submodules after the operation

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

/// repoflow - serialized git operations with merge/rebase/stash orchestration
#[derive(Parser, Debug)]
#[command(name = "repoflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if repoflow was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    /// Stash local changes without asking
    #[arg(long, global = true)]
    pub stash: bool,

    /// Update submodules after merge, rebase or switch
    #[arg(long, global = true)]
    pub submodules: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Whether prompts may be shown.
    ///
    /// False with `--no-interactive` or `--quiet`, or when stdin is not a
    /// terminal.
    pub fn interactive(&self) -> bool {
        !(self.no_interactive || self.quiet) && std::io::stdin().is_terminal()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show branch, HEAD and file status
    #[command(after_help = "\
EXAMPLES:
    # Changed files in the repository
    repoflow status

    # Specific files; paths inside submodules are reported by the submodule
    repoflow status src/lib.rs vendor/dep/README.md")]
    Status {
        /// Files to report (default: every changed file)
        paths: Vec<PathBuf>,
    },

    /// Merge a branch or revision into HEAD
    #[command(after_help = "\
EXAMPLES:
    repoflow merge origin/main
    repoflow merge feature --stash --submodules

CONFLICTS:
    Each conflicted file is presented in turn:
        a  abort: reset to HEAD as it was before the merge
        s  skip: keep HEAD's version of the file
        c  continue: stage the file as it is on disk")]
    Merge {
        /// Branch or revision to merge
        target: String,
    },

    /// Replay HEAD's own commits onto a branch or revision
    #[command(after_help = "\
EXAMPLES:
    repoflow rebase origin/main

Commits are replayed oldest first. Aborting at a conflict resets to HEAD as it
was before the rebase started.")]
    Rebase {
        /// Branch or revision to rebase onto
        target: String,
    },

    /// Check out a branch, stashing local changes if they are in the way
    Switch {
        /// Branch to check out
        branch: String,
    },

    /// Fetch from a remote
    Fetch {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
    },

    /// Push to a remote
    Push {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,

        /// Refspecs to push (default: the current branch)
        refspecs: Vec<String>,
    },

    /// Clone a repository
    Clone {
        /// Remote URL
        url: String,

        /// Destination directory
        dir: PathBuf,
    },

    /// Report lock-file activity in the git directory
    #[command(after_help = "\
EXAMPLES:
    # Watch for 30 seconds while running git in another terminal
    repoflow watch --seconds 30")]
    Watch {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}
