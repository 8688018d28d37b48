//! auth - credentials for remote operations
//!
//! # Architecture
//!
//! Remote operations (fetch, push, clone) ask for credentials through git2
//! callbacks. This module sits between those callbacks and the user:
//!
//! - [`CredentialProvider`] - produce, store and invalidate credentials per
//!   [`CredentialKind`]
//! - [`GitCredentialProvider`] - in-memory cache, git credential helper,
//!   ssh-agent, then an interactive prompt
//! - [`ProviderSource`] - adapts a provider to [`crate::git::CredentialSource`]
//!   for one attempt
//! - [`RetryCoordinator`] - runs an operation until it succeeds, is
//!   cancelled, fails for a non-credential reason, or the user stops retrying
//!
//! # Security
//!
//! Secrets never appear in logs, errors, or debug output. [`Credential`]
//! redacts passwords in its `Debug` impl and log lines only carry
//! [`Credential::label`].
//!
//! [`Credential`]: crate::git::Credential
//! [`Credential::label`]: crate::git::Credential::label
//!
//! # Example
//!
//! ```ignore
//! use repoflow::auth::{CredentialKind, RetryCoordinator};
//!
//! let coordinator = RetryCoordinator::new(provider, retry_prompt, dispatcher);
//! coordinator.run_with_retry(|kind| git.fetch("origin", &mut coordinator.source(kind)))?;
//! ```

pub mod cache;
mod errors;
mod provider;
mod retry;

pub use cache::CredentialCache;
pub use errors::AuthError;
pub use provider::{CredentialProvider, GitCredentialProvider, ProviderSource};
pub use retry::RetryCoordinator;

/// Which family of credentials an attempt uses.
///
/// Session-based credentials come from the logged-in platform session
/// (NTLM/Negotiate) and are abandoned after their first rejection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Helper, agent, or prompted credentials.
    #[default]
    Normal,
    /// Platform session credentials.
    SessionBased,
}

impl CredentialKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::Normal => "normal",
            CredentialKind::SessionBased => "session",
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
