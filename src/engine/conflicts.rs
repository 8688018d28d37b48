//! engine::conflicts
//!
//! Interactive, per-path conflict resolution.
//!
//! Paths are presented one at a time in the order the index reports them.
//! Each answer is applied before the next question:
//!
//! - Abort: hard-reset to the captured rollback commit and stop
//! - Skip: revert the path to HEAD's version
//! - Continue: stage what the user left on disk
//!
//! When every path is handled and a commit was pending (merge commit,
//! replayed cherry-pick), it is finalized with the configured identity.
//!
//! Questions run on the UI thread through the [`Dispatcher`]. If the UI is
//! gone the answer is Abort, and a stash prompt is answered "no".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::types::Oid;
use crate::git::{GitBackend, GitError};
use crate::ui::dispatch::{invoke_sync, Dispatcher};
use crate::ui::prompts::{ConflictChoice, Interaction};

/// How a round of conflict resolution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every path was handled; holds the finalized commit, if any.
    Resolved(Option<Oid>),
    /// The user aborted and the working copy was reset.
    Aborted,
}

/// Asks the user about stashes and conflicts.
#[derive(Clone)]
pub struct ConflictResolver {
    dispatcher: Arc<dyn Dispatcher>,
    interaction: Arc<dyn Interaction>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver").finish_non_exhaustive()
    }
}

impl ConflictResolver {
    /// Create a resolver asking `interaction` on `dispatcher`'s thread.
    pub fn new(dispatcher: Arc<dyn Dispatcher>, interaction: Arc<dyn Interaction>) -> Self {
        Self {
            dispatcher,
            interaction,
        }
    }

    /// Ask whether to stash `dirty` and continue.
    pub fn confirm_stash(&self, dirty: &[PathBuf]) -> bool {
        if !self.dispatcher.is_alive() {
            warn!("UI is gone; not stashing");
            return false;
        }
        let interaction = Arc::clone(&self.interaction);
        let dirty = dirty.to_vec();
        invoke_sync(self.dispatcher.as_ref(), move || interaction.confirm_stash(&dirty))
            .unwrap_or_else(|e| {
                warn!(error = %e, "stash prompt failed");
                false
            })
    }

    fn choose(&self, path: &Path) -> ConflictChoice {
        if !self.dispatcher.is_alive() {
            warn!("UI is gone; aborting conflict resolution");
            return ConflictChoice::Abort;
        }
        let interaction = Arc::clone(&self.interaction);
        let path = path.to_path_buf();
        invoke_sync(self.dispatcher.as_ref(), move || {
            interaction.resolve_conflict(&path)
        })
        .unwrap_or_else(|e| {
            warn!(error = %e, "conflict prompt failed");
            ConflictChoice::Abort
        })
    }

    /// Resolve `paths`, rolling back to `reset_to` on Abort.
    ///
    /// `pending_message` finalizes the interrupted commit once all paths are
    /// handled.
    pub fn resolve(
        &self,
        git: &mut dyn GitBackend,
        paths: &[PathBuf],
        reset_to: &Oid,
        pending_message: Option<&str>,
    ) -> Result<Resolution, GitError> {
        for path in paths {
            let choice = self.choose(path);
            debug!(path = %path.display(), ?choice, "conflict decision");
            match choice {
                ConflictChoice::Abort => {
                    info!(reset_to = %reset_to.short(7), "conflict resolution aborted");
                    git.reset_hard(reset_to)?;
                    return Ok(Resolution::Aborted);
                }
                ConflictChoice::Skip => git.revert_path(path)?,
                ConflictChoice::Continue => git.stage_path(path)?,
            }
        }
        let commit = match pending_message {
            Some(message) => git.commit_pending(message)?,
            None => None,
        };
        Ok(Resolution::Resolved(commit))
    }
}
