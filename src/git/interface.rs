//! git::interface
//!
//! [`GitBackend`] implementation over git2.
//!
//! # Architecture
//!
//! `Git` owns one `git2::Repository`. git2 handles are not safe to use from
//! several threads at once, so a `Git` value is moved into the scheduler's
//! worker and only touched there. No other module outside `git` imports
//! `git2`.
//!
//! # Example
//!
//! ```ignore
//! use repoflow::git::{Git, GitBackend};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! if let Some(head) = git.head_commit()? {
//!     println!("HEAD is at {}", head.short(7));
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{ErrorCode, ResetType, Signature, StatusOptions};
use tracing::{debug, instrument};

use super::backend::{
    ApplyOutcome, CommitInfo, FileState, FileStatus, GitBackend, Identity, MergeOutcome,
    PickOutcome, StashRef,
};
use super::error::GitError;
use super::remote::{self, CredentialSource};
use crate::core::paths::RepoPaths;
use crate::core::types::{BranchName, Oid, RepoFingerprint};

/// Reflog message prefix for ref updates made here.
const REFLOG_PREFIX: &str = "repoflow";

/// A working copy opened through git2.
pub struct Git {
    repo: git2::Repository,
    paths: RepoPaths,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

fn to_oid(id: git2::Oid) -> Result<Oid, GitError> {
    Ok(Oid::new(id.to_string())?)
}

fn git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn clean_message(message: &str) -> String {
    git2::message_prettify(message, Some(b'#')).unwrap_or_else(|_| message.to_string())
}

impl Git {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Self::from_repository(repo)
    }

    /// Open the repository rooted exactly at `path` (no upward search).
    pub fn open_exact(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Self::from_repository(repo)
    }

    /// Clone `url` into `dest` and open the result.
    pub fn clone_into(
        url: &str,
        dest: &Path,
        creds: &mut dyn CredentialSource,
    ) -> Result<Self, GitError> {
        let repo = remote::clone(url, dest, creds)?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: git2::Repository) -> Result<Self, GitError> {
        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        let work_dir = repo.workdir().ok_or(GitError::BareRepo)?.to_path_buf();
        let paths = RepoPaths::new(repo.path().to_path_buf(), work_dir);
        Ok(Self { repo, paths })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        self.repo
            .signature()
            .map_err(|e| GitError::ConfigMissing {
                message: e.message().to_string(),
            })
    }

    /// The index, refreshed from disk if another process changed it.
    fn index(&self) -> Result<git2::Index, GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .read(false)
            .map_err(|e| GitError::from_git2(e, "index"))?;
        Ok(index)
    }

    /// Reload the index from disk, discarding the cached copy.
    ///
    /// Other git processes rewrite `.git/index` behind a long-lived handle;
    /// operations that write the index start from the on-disk state.
    fn reload_index(&self) -> Result<(), GitError> {
        self.repo
            .index()
            .and_then(|mut index| index.read(true))
            .map_err(|e| GitError::from_git2(e, "index"))
    }

    fn relative(&self, path: &Path) -> Result<PathBuf, GitError> {
        self.paths
            .relative(path)
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::Internal {
                message: format!("{} is outside the working copy", path.display()),
            })
    }

    fn head_blob(&self, rel: &Path) -> Result<Option<Vec<u8>>, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(_) => return Ok(None),
        };
        let tree = head
            .peel_to_tree()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        let entry = match tree.get_path(rel) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, &rel.to_string_lossy())),
        };
        let blob = self
            .repo
            .find_blob(entry.id())
            .map_err(|e| GitError::from_git2(e, &rel.to_string_lossy()))?;
        Ok(Some(blob.content().to_vec()))
    }

    fn find_stash_index(&mut self, oid: &Oid) -> Result<usize, GitError> {
        let target = git2_oid(oid)?;
        let mut found = None;
        self.repo
            .stash_foreach(|index, _message, id| {
                if *id == target && found.is_none() {
                    found = Some(index);
                }
                true
            })
            .map_err(|e| GitError::from_git2(e, "stash"))?;
        found.ok_or_else(|| GitError::RefNotFound {
            refname: format!("stash {}", oid.short(7)),
        })
    }

    fn fast_forward(&mut self, target: git2::Oid) -> Result<(), GitError> {
        let context = target.to_string();
        let commit = self
            .repo
            .find_commit(target)
            .map_err(|e| GitError::from_git2(e, &context))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, &context))?;

        let reflog = format!("{}: fast-forward", REFLOG_PREFIX);
        match self.repo.head() {
            Ok(head) if head.is_branch() => {
                let name = head.name().unwrap_or("HEAD").to_string();
                let mut reference = self
                    .repo
                    .find_reference(&name)
                    .map_err(|e| GitError::from_git2(e, &name))?;
                reference
                    .set_target(target, &reflog)
                    .map_err(|e| GitError::from_git2(e, &name))?;
            }
            Ok(_) => self
                .repo
                .set_head_detached(target)
                .map_err(|e| GitError::from_git2(e, "HEAD"))?,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self
                    .repo
                    .find_reference("HEAD")
                    .map_err(|e| GitError::from_git2(e, "HEAD"))?;
                let name = head.symbolic_target().unwrap_or("refs/heads/main").to_string();
                self.repo
                    .reference(&name, target, true, &reflog)
                    .map_err(|e| GitError::from_git2(e, &name))?;
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        }
        Ok(())
    }

    fn commit_index(
        &mut self,
        message: &str,
        author: Option<&Signature<'_>>,
    ) -> Result<Option<Oid>, GitError> {
        let committer = self.signature()?;
        let mut index = self.index()?;
        if index.has_conflicts() {
            return Err(GitError::Conflict {
                paths: self.conflicted_paths()?,
            });
        }
        let tree_id = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "index"))?;

        let mut parent_ids = Vec::new();
        if let Some(head) = self.head_commit()? {
            parent_ids.push(git2_oid(&head)?);
        }
        let mut merge_heads = Vec::new();
        if let Err(e) = self.repo.mergehead_foreach(|id| {
            merge_heads.push(*id);
            true
        }) {
            if e.code() != ErrorCode::NotFound {
                return Err(GitError::from_git2(e, "MERGE_HEAD"));
            }
        }

        if merge_heads.is_empty() && parent_ids.len() == 1 {
            let parent = self
                .repo
                .find_commit(parent_ids[0])
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            if parent.tree_id() == tree_id {
                debug!("nothing to commit");
                self.repo
                    .cleanup_state()
                    .map_err(|e| GitError::from_git2(e, "state"))?;
                return Ok(None);
            }
        }
        parent_ids.extend(merge_heads);

        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GitError::from_git2(e, "tree"))?;
        let parents = parent_ids
            .iter()
            .map(|id| self.repo.find_commit(*id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GitError::from_git2(e, "parent"))?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let id = self
            .repo
            .commit(
                Some("HEAD"),
                author.unwrap_or(&committer),
                &committer,
                &clean_message(message),
                &tree,
                &parent_refs,
            )
            .map_err(|e| GitError::from_git2(e, "commit"))?;
        self.repo
            .cleanup_state()
            .map_err(|e| GitError::from_git2(e, "state"))?;
        Ok(Some(to_oid(id)?))
    }
}

fn file_state(status: git2::Status) -> FileState {
    if status.is_conflicted() {
        FileState::Conflicted
    } else if status.is_ignored() {
        FileState::Ignored
    } else if status.is_wt_new() && !status.is_index_new() {
        FileState::Untracked
    } else if status.is_index_new() {
        FileState::Added
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        FileState::Deleted
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        FileState::Renamed
    } else if status.is_index_modified()
        || status.is_wt_modified()
        || status.is_index_typechange()
        || status.is_wt_typechange()
    {
        FileState::Modified
    } else {
        FileState::Unmodified
    }
}

impl GitBackend for Git {
    fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    fn head_commit(&self) -> Result<Option<Oid>, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        Ok(Some(to_oid(commit.id())?))
    }

    fn resolve(&self, spec: &str) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .revparse_single(spec)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, spec))?;
        to_oid(commit.id())
    }

    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }
        Ok(None)
    }

    fn identity(&self) -> Result<Identity, GitError> {
        let sig = self.signature()?;
        Ok(Identity {
            name: sig.name().unwrap_or_default().to_string(),
            email: sig.email().unwrap_or_default().to_string(),
        })
    }

    fn dirty_paths(&self) -> Result<Vec<PathBuf>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "status"))?;

        Ok(statuses
            .iter()
            .filter(|entry| {
                let state = file_state(entry.status());
                !matches!(state, FileState::Unmodified | FileState::Ignored | FileState::Untracked)
            })
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .collect())
    }

    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, GitError> {
        let index = self.index()?;
        let mut paths: Vec<PathBuf> = Vec::new();
        let conflicts = index
            .conflicts()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        for conflict in conflicts {
            let conflict = conflict.map_err(|e| GitError::from_git2(e, "index"))?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                let path = bytes_to_path(&entry.path);
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }

    fn file_statuses(&self, paths: &[PathBuf]) -> Result<Vec<FileStatus>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .include_unmodified(!paths.is_empty())
            .disable_pathspec_match(true);
        for path in paths {
            opts.pathspec(self.relative(path)?);
        }
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "status"))?;

        Ok(statuses
            .iter()
            .filter_map(|entry| {
                entry.path().map(|p| FileStatus {
                    path: PathBuf::from(p),
                    state: file_state(entry.status()),
                })
            })
            .collect())
    }

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(git2_oid(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        let author = commit.author();
        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author_name: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            author_time: chrono::DateTime::from_timestamp(author.when().seconds(), 0)
                .unwrap_or_default(),
        })
    }

    fn fingerprint(&mut self) -> Result<RepoFingerprint, GitError> {
        let head = self.head_commit()?;
        let tree = self
            .index()?
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        Ok(RepoFingerprint::compute(head.as_ref(), &to_oid(tree)?))
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        match self.repo.merge_base(git2_oid(a)?, git2_oid(b)?) {
            Ok(id) => Ok(Some(to_oid(id)?)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "merge-base")),
        }
    }

    fn commits_between(&self, base: Option<&Oid>, tip: &Oid) -> Result<Vec<Oid>, GitError> {
        let map = |e: git2::Error| GitError::from_git2(e, "revwalk");
        let mut walk = self.repo.revwalk().map_err(map)?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
            .map_err(map)?;
        walk.push(git2_oid(tip)?).map_err(map)?;
        if let Some(base) = base {
            walk.hide(git2_oid(base)?).map_err(map)?;
        }

        let mut commits = Vec::new();
        for id in walk {
            let id = id.map_err(map)?;
            let commit = self.repo.find_commit(id).map_err(map)?;
            if commit.parent_count() > 1 {
                debug!(commit = %id, "skipping merge commit");
                continue;
            }
            commits.push(to_oid(id)?);
        }
        Ok(commits)
    }

    #[instrument(skip(self), level = "debug")]
    fn stash_save(&mut self, message: &str) -> Result<Option<StashRef>, GitError> {
        let sig = self.signature()?;
        self.reload_index()?;
        match self.repo.stash_save(&sig, message, None) {
            Ok(id) => Ok(Some(StashRef {
                index: 0,
                oid: to_oid(id)?,
            })),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "stash")),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn stash_apply(&mut self, stash: &StashRef) -> Result<ApplyOutcome, GitError> {
        let index = self.find_stash_index(&stash.oid)?;
        self.reload_index()?;
        self.repo
            .stash_apply(index, None)
            .map_err(|e| GitError::from_git2(e, "stash"))?;
        let conflicts = self.conflicted_paths()?;
        if conflicts.is_empty() {
            Ok(ApplyOutcome::Clean)
        } else {
            Ok(ApplyOutcome::Conflicts(conflicts))
        }
    }

    fn stash_drop(&mut self, stash: &StashRef) -> Result<(), GitError> {
        let index = self.find_stash_index(&stash.oid)?;
        self.repo
            .stash_drop(index)
            .map_err(|e| GitError::from_git2(e, "stash"))
    }

    fn stash_list(&mut self) -> Result<Vec<StashRef>, GitError> {
        let mut ids = Vec::new();
        self.repo
            .stash_foreach(|index, _message, id| {
                ids.push((index, *id));
                true
            })
            .map_err(|e| GitError::from_git2(e, "stash"))?;
        ids.into_iter()
            .map(|(index, id)| {
                Ok(StashRef {
                    index,
                    oid: to_oid(id)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), level = "debug")]
    fn merge(&mut self, target: &Oid) -> Result<MergeOutcome, GitError> {
        let target_id = git2_oid(target)?;
        self.reload_index()?;
        let analysis = {
            let annotated = self
                .repo
                .find_annotated_commit(target_id)
                .map_err(|e| GitError::from_git2(e, target.as_str()))?;
            let (analysis, _) = self
                .repo
                .merge_analysis(&[&annotated])
                .map_err(|e| GitError::from_git2(e, "merge"))?;

            if !(analysis.is_up_to_date() || analysis.is_fast_forward() || analysis.is_unborn()) {
                self.repo
                    .merge(&[&annotated], None, None)
                    .map_err(|e| GitError::from_git2(e, "merge"))?;
            }
            analysis
        };

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }
        if analysis.is_fast_forward() || analysis.is_unborn() {
            self.fast_forward(target_id)?;
            return Ok(MergeOutcome::FastForward(target.clone()));
        }

        let message = self
            .repo
            .message()
            .map(|m| clean_message(&m))
            .unwrap_or_else(|_| format!("Merge commit '{}'", target.short(7)));
        let conflicts = self.conflicted_paths()?;
        if !conflicts.is_empty() {
            return Ok(MergeOutcome::Conflicts {
                paths: conflicts,
                message,
            });
        }
        match self.commit_index(&message, None)? {
            Some(oid) => Ok(MergeOutcome::Merged(oid)),
            None => Ok(MergeOutcome::UpToDate),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn cherry_pick(&mut self, commit: &Oid) -> Result<PickOutcome, GitError> {
        let id = git2_oid(commit)?;
        self.reload_index()?;
        let (message, author) = {
            let original = self
                .repo
                .find_commit(id)
                .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
            self.repo
                .cherrypick(&original, None)
                .map_err(|e| GitError::from_git2(e, "cherry-pick"))?;
            let picked = (
                original.message().unwrap_or_default().to_string(),
                original.author().to_owned(),
            );
            picked
        };

        let conflicts = self.conflicted_paths()?;
        if !conflicts.is_empty() {
            return Ok(PickOutcome::Conflicts {
                paths: conflicts,
                message,
            });
        }
        match self.commit_index(&message, Some(&author))? {
            Some(oid) => Ok(PickOutcome::Picked(oid)),
            None => Ok(PickOutcome::Empty),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn reset_hard(&mut self, target: &Oid) -> Result<(), GitError> {
        let object = self
            .repo
            .find_object(git2_oid(target)?, None)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .reset(&object, ResetType::Hard, None)
            .map_err(|e| GitError::from_git2(e, "reset"))?;
        self.repo
            .cleanup_state()
            .map_err(|e| GitError::from_git2(e, "state"))
    }

    #[instrument(skip(self), level = "debug")]
    fn checkout_branch(&mut self, branch: &BranchName) -> Result<(), GitError> {
        let refname = branch.refname();
        self.reload_index()?;
        let object = self
            .repo
            .revparse_single(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        if let Err(e) = self.repo.checkout_tree(&object, Some(&mut checkout)) {
            return Err(match e.code() {
                ErrorCode::Conflict | ErrorCode::MergeConflict => GitError::Conflict {
                    paths: self.dirty_paths()?,
                },
                _ => GitError::from_git2(e, &refname),
            });
        }
        self.repo
            .set_head(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))
    }

    fn create_branch(&mut self, name: &BranchName, at: &Oid) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_commit(git2_oid(at)?)
            .map_err(|e| GitError::from_git2(e, at.as_str()))?;
        self.repo
            .branch(name.as_str(), &commit, false)
            .map_err(|e| GitError::from_git2(e, &name.refname()))?;
        Ok(())
    }

    fn commit_pending(&mut self, message: &str) -> Result<Option<Oid>, GitError> {
        self.commit_index(message, None)
    }

    fn revert_path(&mut self, path: &Path) -> Result<(), GitError> {
        let rel = self.relative(path)?;
        let abs = self.paths.work_dir().join(&rel);
        let original = self.head_blob(&rel)?;

        let mut index = self.index()?;
        index
            .remove_path(&rel)
            .map_err(|e| GitError::from_git2(e, "index"))?;
        match original {
            Some(content) => {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent).map_err(|e| GitError::io(e, "revert"))?;
                }
                fs::write(&abs, content).map_err(|e| GitError::io(e, "revert"))?;
                index
                    .add_path(&rel)
                    .map_err(|e| GitError::from_git2(e, "index"))?;
            }
            None => match fs::remove_file(&abs) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(GitError::io(e, "revert"))
                }
                _ => {}
            },
        }
        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    fn stage_path(&mut self, path: &Path) -> Result<(), GitError> {
        let rel = self.relative(path)?;
        let mut index = self.index()?;
        let staged = if self.paths.work_dir().join(&rel).exists() {
            index.add_path(&rel)
        } else {
            index.remove_path(&rel)
        };
        staged.map_err(|e| GitError::from_git2(e, "index"))?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    fn update_submodules(&mut self) -> Result<(), GitError> {
        let submodules = self
            .repo
            .submodules()
            .map_err(|e| GitError::from_git2(e, "submodules"))?;
        for mut submodule in submodules {
            let name = submodule.name().unwrap_or("?").to_string();
            debug!(submodule = %name, "updating submodule");
            submodule
                .update(true, None)
                .map_err(|e| GitError::from_git2(e, &name))?;
        }
        Ok(())
    }

    fn fetch(&mut self, remote: &str, creds: &mut dyn CredentialSource) -> Result<(), GitError> {
        remote::fetch(&self.repo, remote, creds)
    }

    fn push(
        &mut self,
        remote: &str,
        refspecs: &[String],
        creds: &mut dyn CredentialSource,
    ) -> Result<(), GitError> {
        remote::push(&self.repo, remote, refspecs, creds)
    }
}
