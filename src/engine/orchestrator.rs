//! engine::orchestrator
//!
//! Merge, rebase and branch-switch over a shared stash/resolve skeleton.
//!
//! # Architecture
//!
//! Every operation runs as one task on the repository's worker, so the
//! orchestrator holds the handle exclusively from start to finish and its own
//! lock files never trip the gate between sub-steps. The phases are:
//!
//! 1. Freeze: wait for the gate, freeze file events, open a monitor task
//! 2. Dirty-check: prompt to stash unless saving local changes was requested
//! 3. Stash, after checking the identity
//! 4. Core operation (merge, rebase replay, checkout)
//! 5. Per-path conflict resolution; Abort rolls back to the captured commit
//! 6. Optional submodule update
//! 7. Unstash; the entry is dropped only after a clean or resolved apply
//! 8. Thaw: guards release the freeze and end the monitor task on every
//!    exit path
//!
//! # Rollback targets
//!
//! - Merge and rebase conflicts roll back to HEAD as it was before the
//!   operation started, which is the state the stash was taken from
//! - Stash-restore conflicts roll back to HEAD after the operation; the
//!   stash entry is kept
//!
//! Cancellation through the monitor's token is observed between discrete
//! steps: before the gate opens, and before each cherry-pick of a rebase.
//! A cancelled rebase is rolled back to the original HEAD. The gate wait also
//! gives up when the owning scheduler starts shutting down.
//!
//! An error after the working copy has been touched (a failed pick or merge
//! commit) resets HEAD to its pre-operation commit before it is returned, so
//! a failed rebase never leaves the branch half replayed.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use super::conflicts::{ConflictResolver, Resolution};
use super::freeze::EventFreezer;
use super::gate::LockGate;
use crate::core::cancel::CancellationToken;
use crate::core::config::DEFAULT_STASH_MESSAGE;
use crate::core::types::{BranchName, Oid};
use crate::git::{GitBackend, GitError, MergeOutcome, PickOutcome, StashRef};
use crate::ui::progress::{MonitorTask, ProgressMonitor};

/// Flags for merge, rebase and switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Stash local changes without asking.
    pub save_local_changes: bool,
    /// Update submodules after the operation.
    pub update_submodules: bool,
}

/// What the core operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreResult {
    /// Nothing to do.
    UpToDate,
    /// Branch pointer moved without a new commit.
    FastForward,
    /// A merge commit was created.
    Merged,
    /// Commits replayed onto the target.
    Rebased {
        /// Number of commits replayed
        replayed: usize,
    },
    /// HEAD now points at another branch.
    Switched,
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation finished.
    Completed {
        /// HEAD afterwards
        head: Option<Oid>,
        /// What happened
        result: CoreResult,
    },
    /// Cancelled before or between steps; nothing was changed.
    Cancelled,
    /// The user aborted conflict resolution; HEAD was reset.
    Aborted {
        /// Commit the working copy was reset to
        reset_to: Oid,
    },
}

/// What happened to the pre-operation stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashDisposition {
    /// Nothing was stashed.
    None,
    /// Re-applied and dropped.
    Restored,
    /// Left in the stash list for manual recovery.
    Kept(StashRef),
}

/// Result of an orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub outcome: OperationOutcome,
    pub stash: StashDisposition,
}

impl OperationReport {
    /// Report for an operation that never started.
    pub fn cancelled() -> Self {
        Self {
            outcome: OperationOutcome::Cancelled,
            stash: StashDisposition::None,
        }
    }

    /// Whether the operation completed.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, OperationOutcome::Completed { .. })
    }
}

enum StashStep {
    Proceed(Option<StashRef>),
    Declined,
}

/// Drives merge, rebase and switch against a [`GitBackend`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    gate: Arc<LockGate>,
    freezer: Arc<EventFreezer>,
    resolver: ConflictResolver,
    stash_message: String,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(gate: Arc<LockGate>, freezer: Arc<EventFreezer>, resolver: ConflictResolver) -> Self {
        Self {
            gate,
            freezer,
            resolver,
            stash_message: DEFAULT_STASH_MESSAGE.to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Give up gate waits once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Use `message` for stashes created before an operation.
    pub fn with_stash_message(mut self, message: impl Into<String>) -> Self {
        self.stash_message = message.into();
        self
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Merge `target` into HEAD.
    pub fn merge(
        &self,
        git: &mut dyn GitBackend,
        target: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        let span = info_span!("merge", target);
        let _enter = span.enter();
        let result = self.merge_inner(git, target, options, monitor);
        report(monitor, "merge", &result);
        result
    }

    /// Replay HEAD's own commits onto `target`.
    pub fn rebase(
        &self,
        git: &mut dyn GitBackend,
        target: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        let span = info_span!("rebase", target);
        let _enter = span.enter();
        let result = self.rebase_inner(git, target, options, monitor);
        report(monitor, "rebase", &result);
        result
    }

    /// Check out `branch`, stashing local changes if they are in the way.
    pub fn switch(
        &self,
        git: &mut dyn GitBackend,
        branch: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        let span = info_span!("switch", branch);
        let _enter = span.enter();
        let result = self.switch_inner(git, branch, options, monitor);
        report(monitor, "switch", &result);
        result
    }

    fn merge_inner(
        &self,
        git: &mut dyn GitBackend,
        target: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        if !self.wait_for_gate(monitor) {
            return Ok(OperationReport::cancelled());
        }
        let _freeze = self.freezer.guard();
        let task = MonitorTask::begin(monitor, &format!("Merging {}", target), 3);

        let target_oid = git.resolve(target)?;
        let original = git.head_commit()?;
        if needs_merge_commit(git, original.as_ref(), &target_oid)? {
            git.identity()?;
        }

        let stash = match self.stash_local_changes(git, options)? {
            StashStep::Proceed(stash) => stash,
            StashStep::Declined => return Ok(OperationReport::cancelled()),
        };
        task.monitor().step(1);

        let core = keep_stash_on_error(&stash, || {
            let merged = self.merge_core(git, &target_oid, &original);
            let outcome = match &original {
                Some(original) => roll_back_on_error(git, original, merged)?,
                None => merged?,
            };
            self.update_submodules(git, options, &outcome)?;
            Ok(outcome)
        })?;
        task.monitor().step(1);

        let stash = self.restore_stash(git, stash)?;
        task.monitor().step(1);
        Ok(OperationReport {
            outcome: core,
            stash,
        })
    }

    fn merge_core(
        &self,
        git: &mut dyn GitBackend,
        target: &Oid,
        original: &Option<Oid>,
    ) -> Result<OperationOutcome, GitError> {
        match git.merge(target)? {
            MergeOutcome::UpToDate => self.completed(git, CoreResult::UpToDate),
            MergeOutcome::FastForward(_) => self.completed(git, CoreResult::FastForward),
            MergeOutcome::Merged(_) => self.completed(git, CoreResult::Merged),
            MergeOutcome::Conflicts { paths, message } => {
                let reset_to = rollback_target(original)?;
                info!(conflicts = paths.len(), "merge stopped on conflicts");
                match self.resolver.resolve(git, &paths, &reset_to, Some(&message))? {
                    Resolution::Resolved(_) => self.completed(git, CoreResult::Merged),
                    Resolution::Aborted => Ok(OperationOutcome::Aborted { reset_to }),
                }
            }
        }
    }

    fn rebase_inner(
        &self,
        git: &mut dyn GitBackend,
        target: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        if !self.wait_for_gate(monitor) {
            return Ok(OperationReport::cancelled());
        }
        let _freeze = self.freezer.guard();

        let target_oid = git.resolve(target)?;
        let original = git.head_commit()?.ok_or_else(|| GitError::RefNotFound {
            refname: "HEAD".to_string(),
        })?;
        let base = git.merge_base(&original, &target_oid)?;
        if base.as_ref() == Some(&target_oid) {
            debug!("HEAD already contains target");
            let _task = MonitorTask::begin(monitor, &format!("Rebasing onto {}", target), 0);
            return Ok(OperationReport {
                outcome: OperationOutcome::Completed {
                    head: Some(original),
                    result: CoreResult::UpToDate,
                },
                stash: StashDisposition::None,
            });
        }
        git.identity()?;

        let commits = git.commits_between(base.as_ref(), &original)?;
        let task = MonitorTask::begin(
            monitor,
            &format!("Rebasing onto {}", target),
            commits.len(),
        );
        debug!(commits = commits.len(), "replaying");

        let stash = match self.stash_local_changes(git, options)? {
            StashStep::Proceed(stash) => stash,
            StashStep::Declined => return Ok(OperationReport::cancelled()),
        };

        let core = keep_stash_on_error(&stash, || {
            let replayed = self.replay(git, &target_oid, &original, &commits, task.monitor());
            let outcome = roll_back_on_error(git, &original, replayed)?;
            self.update_submodules(git, options, &outcome)?;
            Ok(outcome)
        })?;

        let stash = self.restore_stash(git, stash)?;
        Ok(OperationReport {
            outcome: core,
            stash,
        })
    }

    /// Reset onto `onto` and cherry-pick `commits` oldest first.
    fn replay(
        &self,
        git: &mut dyn GitBackend,
        onto: &Oid,
        original: &Oid,
        commits: &[Oid],
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationOutcome, GitError> {
        let token = monitor.cancellation();
        git.reset_hard(onto)?;
        let mut replayed = 0;
        for commit in commits {
            if token.is_cancelled() {
                info!(replayed, "rebase cancelled; rolling back");
                git.reset_hard(original)?;
                return Ok(OperationOutcome::Cancelled);
            }
            match git.cherry_pick(commit)? {
                PickOutcome::Picked(_) | PickOutcome::Empty => {}
                PickOutcome::Conflicts { paths, message } => {
                    info!(commit = %commit.short(7), conflicts = paths.len(), "replay stopped on conflicts");
                    match self.resolver.resolve(git, &paths, original, Some(&message))? {
                        Resolution::Resolved(_) => {}
                        Resolution::Aborted => {
                            return Ok(OperationOutcome::Aborted {
                                reset_to: original.clone(),
                            })
                        }
                    }
                }
            }
            replayed += 1;
            monitor.step(1);
        }
        self.completed(git, CoreResult::Rebased { replayed })
    }

    fn switch_inner(
        &self,
        git: &mut dyn GitBackend,
        branch: &str,
        options: OperationOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<OperationReport, GitError> {
        if !self.wait_for_gate(monitor) {
            return Ok(OperationReport::cancelled());
        }
        let _freeze = self.freezer.guard();
        let task = MonitorTask::begin(monitor, &format!("Switching to {}", branch), 2);
        let branch = BranchName::new(branch)?;

        let stash = match git.checkout_branch(&branch) {
            Ok(()) => None,
            Err(GitError::Conflict { paths }) => {
                debug!(blocking = paths.len(), "checkout blocked by local changes");
                let stash = match self.stash_local_changes(git, options)? {
                    StashStep::Proceed(stash) => stash,
                    StashStep::Declined => return Ok(OperationReport::cancelled()),
                };
                keep_stash_on_error(&stash, || git.checkout_branch(&branch))?;
                stash
            }
            Err(e) => return Err(e),
        };
        task.monitor().step(1);

        let core = keep_stash_on_error(&stash, || {
            let outcome = self.completed(git, CoreResult::Switched)?;
            self.update_submodules(git, options, &outcome)?;
            Ok(outcome)
        })?;

        let stash = self.restore_stash(git, stash)?;
        task.monitor().step(1);
        Ok(OperationReport {
            outcome: core,
            stash,
        })
    }

    // =========================================================================
    // Shared phases
    // =========================================================================

    fn wait_for_gate(&self, monitor: &dyn ProgressMonitor) -> bool {
        let token = monitor.cancellation();
        self.gate
            .wait_open(|| token.is_cancelled() || self.shutdown.is_cancelled())
    }

    fn completed(
        &self,
        git: &mut dyn GitBackend,
        result: CoreResult,
    ) -> Result<OperationOutcome, GitError> {
        Ok(OperationOutcome::Completed {
            head: git.head_commit()?,
            result,
        })
    }

    fn stash_local_changes(
        &self,
        git: &mut dyn GitBackend,
        options: OperationOptions,
    ) -> Result<StashStep, GitError> {
        let dirty = git.dirty_paths()?;
        if dirty.is_empty() {
            return Ok(StashStep::Proceed(None));
        }
        if !options.save_local_changes && !self.resolver.confirm_stash(&dirty) {
            info!("local changes not stashed; operation cancelled");
            return Ok(StashStep::Declined);
        }
        git.identity()?;
        let stash = git.stash_save(&self.stash_message)?;
        if let Some(stash) = &stash {
            info!(stash = %stash.oid.short(7), paths = dirty.len(), "stashed local changes");
        }
        Ok(StashStep::Proceed(stash))
    }

    fn update_submodules(
        &self,
        git: &mut dyn GitBackend,
        options: OperationOptions,
        outcome: &OperationOutcome,
    ) -> Result<(), GitError> {
        if options.update_submodules && matches!(outcome, OperationOutcome::Completed { .. }) {
            git.update_submodules()?;
        }
        Ok(())
    }

    fn restore_stash(
        &self,
        git: &mut dyn GitBackend,
        stash: Option<StashRef>,
    ) -> Result<StashDisposition, GitError> {
        let Some(stash) = stash else {
            return Ok(StashDisposition::None);
        };
        let post_head = git.head_commit()?;
        match git.stash_apply(&stash) {
            Ok(crate::git::ApplyOutcome::Clean) => {
                git.stash_drop(&stash)?;
                info!(stash = %stash.oid.short(7), "restored local changes");
                Ok(StashDisposition::Restored)
            }
            Ok(crate::git::ApplyOutcome::Conflicts(paths)) => {
                info!(conflicts = paths.len(), "restoring local changes conflicted");
                let reset_to = rollback_target(&post_head)?;
                match self.resolver.resolve(git, &paths, &reset_to, None)? {
                    Resolution::Resolved(_) => {
                        git.stash_drop(&stash)?;
                        Ok(StashDisposition::Restored)
                    }
                    Resolution::Aborted => {
                        warn!(stash = %stash.oid.short(7), "local changes left in stash");
                        Ok(StashDisposition::Kept(stash))
                    }
                }
            }
            Err(GitError::Conflict { .. }) => {
                warn!(stash = %stash.oid.short(7), "stash does not apply cleanly; left in stash");
                Ok(StashDisposition::Kept(stash))
            }
            Err(e) => Err(e),
        }
    }
}

fn rollback_target(head: &Option<Oid>) -> Result<Oid, GitError> {
    head.clone().ok_or_else(|| GitError::Internal {
        message: "conflicts without a commit to roll back to".to_string(),
    })
}

/// Whether merging `target` into `head` has to write a commit.
fn needs_merge_commit(
    git: &dyn GitBackend,
    head: Option<&Oid>,
    target: &Oid,
) -> Result<bool, GitError> {
    let Some(head) = head else {
        return Ok(false);
    };
    let base = git.merge_base(head, target)?;
    Ok(base.as_ref() != Some(head) && base.as_ref() != Some(target))
}

/// Reset to `original` if `result` is an error, then pass it on.
fn roll_back_on_error<T>(
    git: &mut dyn GitBackend,
    original: &Oid,
    result: Result<T, GitError>,
) -> Result<T, GitError> {
    if let Err(e) = &result {
        warn!(error = %e, reset_to = %original.short(7), "operation failed; rolling back");
        if let Err(reset) = git.reset_hard(original) {
            error!(error = %reset, "rollback failed; repository left mid-operation");
        }
    }
    result
}

fn keep_stash_on_error<T>(
    stash: &Option<StashRef>,
    f: impl FnOnce() -> Result<T, GitError>,
) -> Result<T, GitError> {
    let result = f();
    if let (Err(e), Some(stash)) = (&result, stash) {
        warn!(error = %e, stash = %stash.oid.short(7), "operation failed; local changes left in stash");
    }
    result
}

fn report(monitor: &dyn ProgressMonitor, name: &str, result: &Result<OperationReport, GitError>) {
    match result {
        Ok(report) => match &report.outcome {
            OperationOutcome::Completed { .. } => monitor.report_success(&format!("{} completed", name)),
            OperationOutcome::Cancelled => monitor.log(&format!("{} cancelled", name)),
            OperationOutcome::Aborted { reset_to } => {
                monitor.log(&format!("{} aborted; reset to {}", name, reset_to.short(7)))
            }
        },
        Err(e) => monitor.report_error(&format!("{} failed", name), Some(e)),
    }
}
