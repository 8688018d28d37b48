//! cli::commands::remote
//!
//! Fetch, push and clone.
//!
//! Credential failures are retried after asking "Try again?"; answering no,
//! cancelling a credential prompt, or running non-interactively ends the
//! command with the last error.

use std::path::Path;

use anyhow::{anyhow, Result};

use super::Context;
use crate::engine::RepoEngine;
use crate::git::{Git, GitBackend};
use crate::ui::output;

/// Run the fetch command.
pub fn fetch(ctx: &Context, remote: &str) -> Result<()> {
    let engine = ctx.open_engine()?;
    engine.fetch(remote, ctx.monitor())?;
    Ok(())
}

/// Run the push command. With no refspecs, pushes the current branch.
pub fn push(ctx: &Context, remote: &str, refspecs: Vec<String>) -> Result<()> {
    let engine = ctx.open_engine()?;
    let refspecs = if refspecs.is_empty() {
        let branch = engine
            .scheduler()
            .run("current branch", |git: &mut Git| git.current_branch())??
            .ok_or_else(|| anyhow!("HEAD is detached; name a refspec to push"))?;
        vec![format!("{0}:{0}", branch.refname())]
    } else {
        refspecs
    };
    engine.push(remote, refspecs, ctx.monitor())?;
    Ok(())
}

/// Run the clone command.
pub fn clone(ctx: &Context, url: &str, dir: &Path) -> Result<()> {
    let dest = ctx.cwd()?.join(dir);
    let config = crate::core::config::Config::load(None)?.config;
    let services = ctx.services(&config);
    let engine = RepoEngine::clone_from(url, &dest, config, services)?;
    output::success(
        format!("Cloned into {}", engine.paths().work_dir().display()),
        ctx.verbosity,
    );
    Ok(())
}
