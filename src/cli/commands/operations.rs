//! cli::commands::operations
//!
//! Merge, rebase and switch.
//!
//! # Exit status
//!
//! A completed operation exits 0. Cancelling (declining the stash prompt,
//! or a cancelled wait) and aborting conflict resolution exit non-zero so
//! scripts notice that HEAD did not move as asked.
//!
//! # Example
//!
//! ```bash
//! repoflow merge origin/main --stash
//! repoflow rebase main
//! repoflow switch feature
//! ```

use anyhow::{bail, Result};

use super::Context;
use crate::engine::{CoreResult, OperationOutcome, OperationReport, StashDisposition};
use crate::ui::output;

/// Run the merge command.
pub fn merge(ctx: &Context, target: &str) -> Result<()> {
    let engine = ctx.open_engine()?;
    let report = engine.merge(target, ctx.options(&engine), ctx.monitor())?;
    finish(ctx, "merge", &report)
}

/// Run the rebase command.
pub fn rebase(ctx: &Context, target: &str) -> Result<()> {
    let engine = ctx.open_engine()?;
    let report = engine.rebase(target, ctx.options(&engine), ctx.monitor())?;
    finish(ctx, "rebase", &report)
}

/// Run the switch command.
pub fn switch(ctx: &Context, branch: &str) -> Result<()> {
    let engine = ctx.open_engine()?;
    let report = engine.switch(branch, ctx.options(&engine), ctx.monitor())?;
    finish(ctx, "switch", &report)
}

fn describe(result: &CoreResult) -> String {
    match result {
        CoreResult::UpToDate => "Already up to date.".to_string(),
        CoreResult::FastForward => "Fast-forwarded.".to_string(),
        CoreResult::Merged => "Merged.".to_string(),
        CoreResult::Rebased { replayed } => format!("Replayed {} commit(s).", replayed),
        CoreResult::Switched => "Switched branch.".to_string(),
    }
}

fn finish(ctx: &Context, name: &str, report: &OperationReport) -> Result<()> {
    match &report.stash {
        StashDisposition::None => {}
        StashDisposition::Restored => output::print("Local changes restored.", ctx.verbosity),
        StashDisposition::Kept(stash) => output::warn(
            format!(
                "Local changes could not be restored; they are kept in stash@{{{}}} ({}).",
                stash.index,
                stash.oid.short(7)
            ),
            ctx.verbosity,
        ),
    }

    match &report.outcome {
        OperationOutcome::Completed { head, result } => {
            let head = head
                .as_ref()
                .map(|h| format!(" HEAD is now {}.", h.short(7)))
                .unwrap_or_default();
            output::print(format!("{}{}", describe(result), head), ctx.verbosity);
            Ok(())
        }
        OperationOutcome::Cancelled => bail!("{} cancelled; nothing was changed", name),
        OperationOutcome::Aborted { reset_to } => {
            bail!("{} aborted; reset to {}", name, reset_to.short(7))
        }
    }
}
