//! git::fake
//!
//! In-memory [`GitBackend`] for deterministic tests.
//!
//! # Design
//!
//! The fake models just enough of a repository for the orchestrator: a
//! commit graph, branches, a set of dirty and conflicted paths, and a stash
//! list. File contents are not modelled. Conflicts are scripted per commit,
//! and every mutating call is recorded so tests can assert on ordering.
//!
//! Clones share state, so a test can keep one handle while the scheduler owns
//! another.
//!
//! # Example
//!
//! ```
//! use repoflow::git::fake::FakeBackend;
//! use repoflow::git::GitBackend;
//!
//! let fake = FakeBackend::new();
//! let c1 = fake.commit("first");
//! assert_eq!(fake.head_commit().unwrap(), Some(c1));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{
    ApplyOutcome, CommitInfo, FileState, FileStatus, GitBackend, Identity, MergeOutcome,
    PickOutcome, StashRef,
};
use super::error::GitError;
use super::remote::{AllowedCredentials, CredentialRequest, CredentialSource};
use crate::core::paths::RepoPaths;
use crate::core::types::{BranchName, Oid, RepoFingerprint};

/// Fake backend with shared, inspectable state.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    inner: Arc<Mutex<FakeInner>>,
    paths: RepoPaths,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOperation {
    StashSave,
    StashApply(Oid),
    StashDrop(Oid),
    Merge(Oid),
    CherryPick(Oid),
    ResetHard(Oid),
    Checkout(String),
    RevertPath(PathBuf),
    StagePath(PathBuf),
    Commit(String),
    UpdateSubmodules,
    Fetch { remote: String, credential: String },
    Push { remote: String, credential: String },
}

#[derive(Debug, Clone)]
struct FakeCommit {
    parents: Vec<Oid>,
    message: String,
}

#[derive(Debug, Clone)]
enum FakeHead {
    Branch(String),
    Detached(Oid),
}

#[derive(Debug)]
struct FakeInner {
    next_id: u64,
    commits: HashMap<Oid, FakeCommit>,
    branches: BTreeMap<String, Oid>,
    head: FakeHead,
    dirty: Vec<PathBuf>,
    conflicted: Vec<PathBuf>,
    staged: bool,
    merge_head: Option<Oid>,
    stashes: Vec<(Oid, Vec<PathBuf>)>,
    identity: Option<Identity>,
    pick_conflicts: HashMap<Oid, Vec<PathBuf>>,
    merge_conflicts: HashMap<Oid, Vec<PathBuf>>,
    stash_conflicts: Option<Vec<PathBuf>>,
    checkout_conflicts: HashSet<String>,
    pick_failures: HashMap<Oid, GitError>,
    commit_failure: Option<GitError>,
    remote_results: VecDeque<Result<(), GitError>>,
    operations: Vec<FakeOperation>,
}

impl FakeInner {
    fn fresh_oid(&mut self) -> Oid {
        self.next_id += 1;
        // Infallible: always 40 lowercase hex digits.
        Oid::new(format!("{:040x}", self.next_id)).unwrap_or_else(|_| unreachable!())
    }

    fn head_oid(&self) -> Option<Oid> {
        match &self.head {
            FakeHead::Branch(name) => self.branches.get(name).cloned(),
            FakeHead::Detached(oid) => Some(oid.clone()),
        }
    }

    fn set_head_oid(&mut self, oid: Oid) {
        match &self.head {
            FakeHead::Branch(name) => {
                let name = name.clone();
                self.branches.insert(name, oid);
            }
            FakeHead::Detached(_) => self.head = FakeHead::Detached(oid),
        }
    }

    fn add_commit(&mut self, parents: Vec<Oid>, message: &str) -> Oid {
        let oid = self.fresh_oid();
        self.commits.insert(
            oid.clone(),
            FakeCommit {
                parents,
                message: message.to_string(),
            },
        );
        oid
    }

    fn ancestors(&self, start: &Oid) -> Vec<Oid> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&oid) {
                queue.extend(commit.parents.iter().cloned());
            }
            order.push(oid);
        }
        order
    }

    fn is_ancestor(&self, ancestor: &Oid, of: &Oid) -> bool {
        self.ancestors(of).contains(ancestor)
    }

    fn require_identity(&self) -> Result<(), GitError> {
        if self.identity.is_none() {
            return Err(GitError::ConfigMissing {
                message: "user.name and user.email are not set".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// A repository with one commit on `main` and a configured identity.
    pub fn new() -> Self {
        Self::with_paths(RepoPaths::new(
            PathBuf::from("/fake/.git"),
            PathBuf::from("/fake"),
        ))
    }

    /// Same as [`FakeBackend::new`] with custom paths.
    pub fn with_paths(paths: RepoPaths) -> Self {
        let mut inner = FakeInner {
            next_id: 0,
            commits: HashMap::new(),
            branches: BTreeMap::new(),
            head: FakeHead::Branch("main".to_string()),
            dirty: Vec::new(),
            conflicted: Vec::new(),
            staged: false,
            merge_head: None,
            stashes: Vec::new(),
            identity: Some(Identity {
                name: "Test User".to_string(),
                email: "test@example.com".to_string(),
            }),
            pick_conflicts: HashMap::new(),
            merge_conflicts: HashMap::new(),
            stash_conflicts: None,
            checkout_conflicts: HashSet::new(),
            pick_failures: HashMap::new(),
            commit_failure: None,
            remote_results: VecDeque::new(),
            operations: Vec::new(),
        };
        let root = inner.add_commit(Vec::new(), "initial");
        inner.branches.insert("main".to_string(), root);
        Self {
            inner: Arc::new(Mutex::new(inner)),
            paths,
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Scenario setup
    // =========================================================================

    /// Commit on the current HEAD.
    pub fn commit(&self, message: &str) -> Oid {
        let mut st = self.state();
        let parents = st.head_oid().into_iter().collect();
        let oid = st.add_commit(parents, message);
        st.set_head_oid(oid.clone());
        oid
    }

    /// Create or move a branch.
    pub fn branch(&self, name: &str, at: &Oid) {
        self.state().branches.insert(name.to_string(), at.clone());
    }

    /// Switch HEAD to a branch without any checks.
    pub fn switch_to(&self, name: &str) {
        self.state().head = FakeHead::Branch(name.to_string());
    }

    /// Mark paths as modified in the working copy.
    pub fn set_dirty(&self, paths: &[&str]) {
        self.state().dirty = paths.iter().map(PathBuf::from).collect();
    }

    /// Script conflicts for a cherry-pick of `commit`.
    pub fn conflict_on_pick(&self, commit: &Oid, paths: &[&str]) {
        self.state()
            .pick_conflicts
            .insert(commit.clone(), paths.iter().map(PathBuf::from).collect());
    }

    /// Script conflicts for a merge of `target`.
    pub fn conflict_on_merge(&self, target: &Oid, paths: &[&str]) {
        self.state()
            .merge_conflicts
            .insert(target.clone(), paths.iter().map(PathBuf::from).collect());
    }

    /// Script conflicts for the next stash apply.
    pub fn conflict_on_stash_apply(&self, paths: &[&str]) {
        self.state().stash_conflicts = Some(paths.iter().map(PathBuf::from).collect());
    }

    /// Make a direct checkout of `branch` fail while the copy is dirty.
    pub fn conflict_on_checkout(&self, branch: &str) {
        self.state().checkout_conflicts.insert(branch.to_string());
    }

    /// Make the cherry-pick of `commit` fail with `error`, once.
    pub fn fail_on_pick(&self, commit: &Oid, error: GitError) {
        self.state().pick_failures.insert(commit.clone(), error);
    }

    /// Make the next commit of pending changes fail with `error`.
    pub fn fail_next_commit(&self, error: GitError) {
        self.state().commit_failure = Some(error);
    }

    /// Remove the configured identity.
    pub fn without_identity(&self) {
        self.state().identity = None;
    }

    /// Queue results for successive fetch/push attempts.
    pub fn script_remote(&self, results: Vec<Result<(), GitError>>) {
        self.state().remote_results.extend(results);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Operations recorded so far.
    pub fn operations(&self) -> Vec<FakeOperation> {
        self.state().operations.clone()
    }

    /// Commits passed to cherry-pick, in call order.
    pub fn picked(&self) -> Vec<Oid> {
        self.state()
            .operations
            .iter()
            .filter_map(|op| match op {
                FakeOperation::CherryPick(oid) => Some(oid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Paths currently dirty.
    pub fn dirty(&self) -> Vec<PathBuf> {
        self.state().dirty.clone()
    }

    /// Number of stash entries.
    pub fn stash_count(&self) -> usize {
        self.state().stashes.len()
    }

    /// Message of a commit.
    pub fn message_of(&self, oid: &Oid) -> Option<String> {
        self.state().commits.get(oid).map(|c| c.message.clone())
    }

    /// First-parent history from HEAD, newest first.
    pub fn log(&self) -> Vec<Oid> {
        let st = self.state();
        let mut out = Vec::new();
        let mut cursor = st.head_oid();
        while let Some(oid) = cursor {
            cursor = st
                .commits
                .get(&oid)
                .and_then(|c| c.parents.first().cloned());
            out.push(oid);
        }
        out
    }

    fn record(&self, op: FakeOperation) {
        self.state().operations.push(op);
    }

    fn remote_attempt(
        &self,
        remote: &str,
        creds: &mut dyn CredentialSource,
    ) -> Result<String, GitError> {
        let request = CredentialRequest {
            url: format!("https://example.invalid/{}", remote),
            username: None,
            allowed: AllowedCredentials::any(),
        };
        let credential = creds.credential(&request)?;
        let label = credential.label().to_string();
        match self.state().remote_results.pop_front() {
            Some(Err(e)) => Err(e),
            _ => Ok(label),
        }
    }
}

impl GitBackend for FakeBackend {
    fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    fn head_commit(&self) -> Result<Option<Oid>, GitError> {
        Ok(self.state().head_oid())
    }

    fn resolve(&self, spec: &str) -> Result<Oid, GitError> {
        let st = self.state();
        if spec == "HEAD" {
            return st.head_oid().ok_or_else(|| GitError::RefNotFound {
                refname: spec.to_string(),
            });
        }
        let short = spec.strip_prefix("refs/heads/").unwrap_or(spec);
        if let Some(oid) = st.branches.get(short) {
            return Ok(oid.clone());
        }
        st.commits
            .keys()
            .find(|oid| oid.as_str() == spec)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound {
                refname: spec.to_string(),
            })
    }

    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        match &self.state().head {
            FakeHead::Branch(name) => Ok(Some(BranchName::new(name.clone())?)),
            FakeHead::Detached(_) => Ok(None),
        }
    }

    fn identity(&self) -> Result<Identity, GitError> {
        self.state()
            .identity
            .clone()
            .ok_or_else(|| GitError::ConfigMissing {
                message: "user.name and user.email are not set".to_string(),
            })
    }

    fn dirty_paths(&self) -> Result<Vec<PathBuf>, GitError> {
        Ok(self.state().dirty.clone())
    }

    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, GitError> {
        Ok(self.state().conflicted.clone())
    }

    fn file_statuses(&self, paths: &[PathBuf]) -> Result<Vec<FileStatus>, GitError> {
        let st = self.state();
        let state_of = |p: &Path| {
            if st.conflicted.iter().any(|c| c == p) {
                FileState::Conflicted
            } else if st.dirty.iter().any(|d| d == p) {
                FileState::Modified
            } else {
                FileState::Unmodified
            }
        };
        let selected: Vec<PathBuf> = if paths.is_empty() {
            st.dirty.iter().chain(st.conflicted.iter()).cloned().collect()
        } else {
            paths.to_vec()
        };
        Ok(selected
            .into_iter()
            .map(|path| FileStatus {
                state: state_of(&path),
                path,
            })
            .collect())
    }

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let st = self.state();
        let commit = st.commits.get(oid).ok_or_else(|| GitError::RefNotFound {
            refname: oid.to_string(),
        })?;
        let identity = st.identity.clone().unwrap_or(Identity {
            name: String::new(),
            email: String::new(),
        });
        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.message.lines().next().unwrap_or_default().to_string(),
            author_name: identity.name,
            author_email: identity.email,
            author_time: chrono::DateTime::default(),
        })
    }

    fn fingerprint(&mut self) -> Result<RepoFingerprint, GitError> {
        let st = self.state();
        let mut hasher = DefaultHasher::new();
        st.conflicted.hash(&mut hasher);
        st.staged.hash(&mut hasher);
        let tree = Oid::new(format!("{:040x}", u128::from(hasher.finish())))?;
        Ok(RepoFingerprint::compute(st.head_oid().as_ref(), &tree))
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let st = self.state();
        let of_a: HashSet<Oid> = st.ancestors(a).into_iter().collect();
        Ok(st.ancestors(b).into_iter().find(|oid| of_a.contains(oid)))
    }

    fn commits_between(&self, base: Option<&Oid>, tip: &Oid) -> Result<Vec<Oid>, GitError> {
        let st = self.state();
        let hidden: HashSet<Oid> = base
            .map(|b| st.ancestors(b).into_iter().collect())
            .unwrap_or_default();

        // Depth-first post-order yields parents before children.
        fn visit(
            st: &FakeInner,
            oid: &Oid,
            hidden: &HashSet<Oid>,
            seen: &mut HashSet<Oid>,
            out: &mut Vec<Oid>,
        ) {
            if hidden.contains(oid) || !seen.insert(oid.clone()) {
                return;
            }
            if let Some(commit) = st.commits.get(oid) {
                for parent in &commit.parents {
                    visit(st, parent, hidden, seen, out);
                }
                if commit.parents.len() <= 1 {
                    out.push(oid.clone());
                }
            }
        }

        let mut out = Vec::new();
        visit(&st, tip, &hidden, &mut HashSet::new(), &mut out);
        Ok(out)
    }

    fn stash_save(&mut self, _message: &str) -> Result<Option<StashRef>, GitError> {
        self.record(FakeOperation::StashSave);
        let mut st = self.state();
        if st.dirty.is_empty() {
            return Ok(None);
        }
        st.require_identity()?;
        let oid = st.fresh_oid();
        let paths = std::mem::take(&mut st.dirty);
        st.stashes.insert(0, (oid.clone(), paths));
        Ok(Some(StashRef { index: 0, oid }))
    }

    fn stash_apply(&mut self, stash: &StashRef) -> Result<ApplyOutcome, GitError> {
        self.record(FakeOperation::StashApply(stash.oid.clone()));
        let mut st = self.state();
        let paths = st
            .stashes
            .iter()
            .find(|(oid, _)| *oid == stash.oid)
            .map(|(_, paths)| paths.clone())
            .ok_or_else(|| GitError::RefNotFound {
                refname: format!("stash {}", stash.oid.short(7)),
            })?;
        for path in paths {
            if !st.dirty.contains(&path) {
                st.dirty.push(path);
            }
        }
        match st.stash_conflicts.take() {
            Some(conflicts) => {
                st.conflicted = conflicts.clone();
                Ok(ApplyOutcome::Conflicts(conflicts))
            }
            None => Ok(ApplyOutcome::Clean),
        }
    }

    fn stash_drop(&mut self, stash: &StashRef) -> Result<(), GitError> {
        self.record(FakeOperation::StashDrop(stash.oid.clone()));
        let mut st = self.state();
        let before = st.stashes.len();
        st.stashes.retain(|(oid, _)| *oid != stash.oid);
        if st.stashes.len() == before {
            return Err(GitError::RefNotFound {
                refname: format!("stash {}", stash.oid.short(7)),
            });
        }
        Ok(())
    }

    fn stash_list(&mut self) -> Result<Vec<StashRef>, GitError> {
        Ok(self
            .state()
            .stashes
            .iter()
            .enumerate()
            .map(|(index, (oid, _))| StashRef {
                index,
                oid: oid.clone(),
            })
            .collect())
    }

    fn merge(&mut self, target: &Oid) -> Result<MergeOutcome, GitError> {
        self.record(FakeOperation::Merge(target.clone()));
        let mut st = self.state();
        let head = match st.head_oid() {
            Some(head) => head,
            None => {
                st.set_head_oid(target.clone());
                return Ok(MergeOutcome::FastForward(target.clone()));
            }
        };
        if st.is_ancestor(target, &head) {
            return Ok(MergeOutcome::UpToDate);
        }
        if st.is_ancestor(&head, target) {
            st.set_head_oid(target.clone());
            return Ok(MergeOutcome::FastForward(target.clone()));
        }
        let message = format!("Merge commit '{}'", target.short(7));
        if let Some(paths) = st.merge_conflicts.get(target).cloned() {
            st.conflicted = paths.clone();
            st.merge_head = Some(target.clone());
            return Ok(MergeOutcome::Conflicts { paths, message });
        }
        st.require_identity()?;
        let oid = st.add_commit(vec![head, target.clone()], &message);
        st.set_head_oid(oid.clone());
        Ok(MergeOutcome::Merged(oid))
    }

    fn cherry_pick(&mut self, commit: &Oid) -> Result<PickOutcome, GitError> {
        self.record(FakeOperation::CherryPick(commit.clone()));
        let mut st = self.state();
        let message = st
            .commits
            .get(commit)
            .map(|c| c.message.clone())
            .ok_or_else(|| GitError::RefNotFound {
                refname: commit.to_string(),
            })?;
        if let Some(error) = st.pick_failures.remove(commit) {
            return Err(error);
        }
        if let Some(paths) = st.pick_conflicts.get(commit).cloned() {
            st.conflicted = paths.clone();
            return Ok(PickOutcome::Conflicts { paths, message });
        }
        let parents = st.head_oid().into_iter().collect();
        let oid = st.add_commit(parents, &message);
        st.set_head_oid(oid.clone());
        Ok(PickOutcome::Picked(oid))
    }

    fn reset_hard(&mut self, target: &Oid) -> Result<(), GitError> {
        self.record(FakeOperation::ResetHard(target.clone()));
        let mut st = self.state();
        if !st.commits.contains_key(target) {
            return Err(GitError::RefNotFound {
                refname: target.to_string(),
            });
        }
        st.set_head_oid(target.clone());
        st.dirty.clear();
        st.conflicted.clear();
        st.staged = false;
        st.merge_head = None;
        Ok(())
    }

    fn checkout_branch(&mut self, branch: &BranchName) -> Result<(), GitError> {
        self.record(FakeOperation::Checkout(branch.to_string()));
        let mut st = self.state();
        if !st.branches.contains_key(branch.as_str()) {
            return Err(GitError::RefNotFound {
                refname: branch.refname(),
            });
        }
        if !st.dirty.is_empty() && st.checkout_conflicts.contains(branch.as_str()) {
            return Err(GitError::Conflict {
                paths: st.dirty.clone(),
            });
        }
        st.head = FakeHead::Branch(branch.to_string());
        Ok(())
    }

    fn create_branch(&mut self, name: &BranchName, at: &Oid) -> Result<(), GitError> {
        self.branch(name.as_str(), at);
        Ok(())
    }

    fn commit_pending(&mut self, message: &str) -> Result<Option<Oid>, GitError> {
        self.record(FakeOperation::Commit(message.to_string()));
        let mut st = self.state();
        st.require_identity()?;
        if let Some(error) = st.commit_failure.take() {
            return Err(error);
        }
        if !st.conflicted.is_empty() {
            return Err(GitError::Conflict {
                paths: st.conflicted.clone(),
            });
        }
        if !st.staged && st.merge_head.is_none() {
            return Ok(None);
        }
        let mut parents: Vec<Oid> = st.head_oid().into_iter().collect();
        parents.extend(st.merge_head.take());
        let oid = st.add_commit(parents, message);
        st.set_head_oid(oid.clone());
        st.staged = false;
        Ok(Some(oid))
    }

    fn revert_path(&mut self, path: &Path) -> Result<(), GitError> {
        self.record(FakeOperation::RevertPath(path.to_path_buf()));
        let mut st = self.state();
        st.conflicted.retain(|p| p != path);
        st.dirty.retain(|p| p != path);
        Ok(())
    }

    fn stage_path(&mut self, path: &Path) -> Result<(), GitError> {
        self.record(FakeOperation::StagePath(path.to_path_buf()));
        let mut st = self.state();
        st.conflicted.retain(|p| p != path);
        st.staged = true;
        Ok(())
    }

    fn update_submodules(&mut self) -> Result<(), GitError> {
        self.record(FakeOperation::UpdateSubmodules);
        Ok(())
    }

    fn fetch(&mut self, remote: &str, creds: &mut dyn CredentialSource) -> Result<(), GitError> {
        let credential = self.remote_attempt(remote, creds)?;
        self.record(FakeOperation::Fetch {
            remote: remote.to_string(),
            credential,
        });
        Ok(())
    }

    fn push(
        &mut self,
        remote: &str,
        _refspecs: &[String],
        creds: &mut dyn CredentialSource,
    ) -> Result<(), GitError> {
        let credential = self.remote_attempt(remote, creds)?;
        self.record(FakeOperation::Push {
            remote: remote.to_string(),
            credential,
        });
        Ok(())
    }
}
