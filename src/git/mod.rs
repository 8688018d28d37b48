//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. No other module imports
//! `git2`. Everything above it talks to the [`GitBackend`] capability trait:
//!
//! - [`interface::Git`] implements it over git2
//! - [`fake::FakeBackend`] implements it in memory for tests
//!
//! # Responsibilities
//!
//! - Repository discovery and opening
//! - History queries (HEAD, merge-base, commit ranges)
//! - Merge, cherry-pick, reset, checkout, stash
//! - Per-path conflict resolution primitives
//! - Remote operations with credential callbacks
//! - Error normalization into [`ErrorKind`]
//!
//! # Example
//!
//! ```ignore
//! use repoflow::git::{Git, GitBackend};
//! use std::path::Path;
//!
//! let mut git = Git::open(Path::new("."))?;
//! let target = git.resolve("origin/main")?;
//! let outcome = git.merge(&target)?;
//! ```

mod backend;
mod error;
pub mod fake;
mod interface;
pub mod remote;
mod submodule;

pub use backend::{
    ApplyOutcome, CommitInfo, FileState, FileStatus, GitBackend, Identity, MergeOutcome,
    PickOutcome, StashRef,
};
pub use error::{ErrorKind, GitError, HasErrorKind, ProtocolCategory};
pub use interface::Git;
pub use remote::{AllowedCredentials, Credential, CredentialRequest, CredentialSource};
pub use submodule::submodule_paths;
