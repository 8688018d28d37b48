//! git::backend
//!
//! The narrow capability interface the engine drives.
//!
//! # Architecture
//!
//! The scheduler owns exactly one value implementing [`GitBackend`] per
//! working copy and is the only caller. The orchestrator is written against
//! this trait, so it runs unchanged over [`crate::git::Git`] (git2) and
//! [`crate::git::fake::FakeBackend`] (scripted, in-memory).
//!
//! Methods that mutate the working copy take `&mut self`; git2's stash and
//! merge-head APIs require it, and it documents that the caller holds the
//! handle exclusively.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::error::GitError;
use super::remote::CredentialSource;
use crate::core::paths::RepoPaths;
use crate::core::types::{BranchName, Oid, RepoFingerprint};

/// Configured author identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// user.name
    pub name: String,
    /// user.email
    pub email: String,
}

/// A stash entry created by this crate.
///
/// Entries are tracked by commit id; the list position shifts whenever
/// another stash is pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashRef {
    /// Position in the stash list when created
    pub index: usize,
    /// The stash commit
    pub oid: Oid,
}

/// Result of re-applying a stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Applied without conflicts.
    Clean,
    /// Applied with conflicts left in the index.
    Conflicts(Vec<PathBuf>),
}

/// Result of the merge primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Target already reachable from HEAD.
    UpToDate,
    /// HEAD moved to the target without a new commit.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
    /// Conflicts were written to the index; a merge commit is pending.
    Conflicts {
        /// Conflicted paths in the order the index reports them
        paths: Vec<PathBuf>,
        /// Message for the pending merge commit
        message: String,
    },
}

/// Result of one cherry-pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// Replayed as a new commit.
    Picked(Oid),
    /// The change was already present; no commit was created.
    Empty,
    /// Conflicts were written to the index; the commit is pending.
    Conflicts {
        /// Conflicted paths in the order the index reports them
        paths: Vec<PathBuf>,
        /// Message of the commit being replayed
        message: String,
    },
}

/// Status of one path in the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
    Ignored,
    Conflicted,
}

impl FileState {
    /// Single-letter code used in CLI output.
    pub fn code(&self) -> char {
        match self {
            FileState::Unmodified => ' ',
            FileState::Added => 'A',
            FileState::Modified => 'M',
            FileState::Deleted => 'D',
            FileState::Renamed => 'R',
            FileState::Untracked => '?',
            FileState::Ignored => '!',
            FileState::Conflicted => 'U',
        }
    }
}

/// A path with its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Path relative to the working directory
    pub path: PathBuf,
    /// Current state
    pub state: FileState,
}

/// Information about a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Author timestamp
    pub author_time: DateTime<Utc>,
}

/// Capabilities required from a working copy.
pub trait GitBackend: Send + 'static {
    // =========================================================================
    // Queries
    // =========================================================================

    /// Paths of this working copy.
    fn paths(&self) -> &RepoPaths;

    /// HEAD commit, or `None` on an unborn branch.
    fn head_commit(&self) -> Result<Option<Oid>, GitError>;

    /// Resolve a revision (branch, ref, oid) to a commit.
    fn resolve(&self, spec: &str) -> Result<Oid, GitError>;

    /// The checked-out branch, or `None` when detached or unborn.
    fn current_branch(&self) -> Result<Option<BranchName>, GitError>;

    /// The configured identity.
    ///
    /// # Errors
    ///
    /// [`GitError::ConfigMissing`] when user.name or user.email is unset.
    fn identity(&self) -> Result<Identity, GitError>;

    /// Tracked paths with uncommitted changes (staged or not).
    fn dirty_paths(&self) -> Result<Vec<PathBuf>, GitError>;

    /// Paths currently conflicted in the index.
    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, GitError>;

    /// Status of the given paths, or of every changed path when empty.
    fn file_statuses(&self, paths: &[PathBuf]) -> Result<Vec<FileStatus>, GitError>;

    /// Details of one commit.
    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError>;

    /// Content hash of HEAD plus the index tree.
    fn fingerprint(&mut self) -> Result<RepoFingerprint, GitError>;

    /// Most recent common ancestor.
    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError>;

    /// Non-merge commits reachable from `tip` but not from `base`,
    /// oldest first in topological order.
    fn commits_between(&self, base: Option<&Oid>, tip: &Oid) -> Result<Vec<Oid>, GitError>;

    // =========================================================================
    // Stash
    // =========================================================================

    /// Stash tracked changes. `None` when there is nothing to stash.
    fn stash_save(&mut self, message: &str) -> Result<Option<StashRef>, GitError>;

    /// Re-apply a stash without removing it.
    fn stash_apply(&mut self, stash: &StashRef) -> Result<ApplyOutcome, GitError>;

    /// Remove a stash from the list.
    fn stash_drop(&mut self, stash: &StashRef) -> Result<(), GitError>;

    /// Current stash list, newest first.
    fn stash_list(&mut self) -> Result<Vec<StashRef>, GitError>;

    // =========================================================================
    // History mutation
    // =========================================================================

    /// Merge `target` into HEAD.
    fn merge(&mut self, target: &Oid) -> Result<MergeOutcome, GitError>;

    /// Apply the change introduced by `commit` onto HEAD.
    fn cherry_pick(&mut self, commit: &Oid) -> Result<PickOutcome, GitError>;

    /// Move HEAD (and its branch) to `target`, resetting index and working
    /// tree, and clear any in-progress merge/cherry-pick state.
    fn reset_hard(&mut self, target: &Oid) -> Result<(), GitError>;

    /// Check out a branch without discarding local changes.
    ///
    /// # Errors
    ///
    /// [`GitError::Conflict`] when local changes would be overwritten.
    fn checkout_branch(&mut self, branch: &BranchName) -> Result<(), GitError>;

    /// Create a branch pointing at `at`.
    fn create_branch(&mut self, name: &BranchName, at: &Oid) -> Result<(), GitError>;

    /// Commit the index with the configured identity.
    ///
    /// Pending merge heads become additional parents. Returns `None` when the
    /// index matches HEAD and there is nothing to commit.
    fn commit_pending(&mut self, message: &str) -> Result<Option<Oid>, GitError>;

    // =========================================================================
    // Conflict resolution
    // =========================================================================

    /// Restore one path to its HEAD version, dropping conflict entries.
    fn revert_path(&mut self, path: &Path) -> Result<(), GitError>;

    /// Stage the working-tree content of one path, resolving its conflict.
    fn stage_path(&mut self, path: &Path) -> Result<(), GitError>;

    // =========================================================================
    // Submodules and remotes
    // =========================================================================

    /// Initialize and update every submodule.
    fn update_submodules(&mut self) -> Result<(), GitError>;

    /// Fetch from a named remote.
    fn fetch(&mut self, remote: &str, creds: &mut dyn CredentialSource) -> Result<(), GitError>;

    /// Push refspecs to a named remote (configured refspecs when empty).
    fn push(
        &mut self,
        remote: &str,
        refspecs: &[String],
        creds: &mut dyn CredentialSource,
    ) -> Result<(), GitError>;
}
