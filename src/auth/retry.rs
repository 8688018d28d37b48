//! auth::retry
//!
//! Retry loop for authenticated remote operations.
//!
//! # Policy
//!
//! Each attempt runs the operation with the current [`CredentialKind`]:
//!
//! - Success: the provider stores the credential that worked
//! - Authentication failure: the provider invalidates that kind. A
//!   session-based kind falls back to `Normal` without asking; otherwise the
//!   user is asked whether to try again
//! - Cancellation: stop immediately, store nothing, never retry
//! - Anything else: stop and surface the classified error
//!
//! There is no retry ceiling. The loop ends when the user declines. The
//! question is asked on the UI thread through the [`Dispatcher`]; if the UI
//! is gone the answer is "no".

use std::sync::Arc;

use tracing::{debug, info, info_span};

use super::errors::AuthError;
use super::provider::{CredentialProvider, ProviderSource};
use super::CredentialKind;
use crate::git::{ErrorKind, GitError, HasErrorKind};
use crate::ui::dispatch::{invoke_sync, Dispatcher};
use crate::ui::prompts::RetryPrompt;

/// Runs remote operations until they succeed or the user stops.
#[derive(Clone)]
pub struct RetryCoordinator {
    provider: Arc<dyn CredentialProvider>,
    prompt: Arc<dyn RetryPrompt>,
    dispatcher: Arc<dyn Dispatcher>,
    initial_kind: CredentialKind,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("initial_kind", &self.initial_kind)
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    /// Create a coordinator starting with [`CredentialKind::Normal`].
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        prompt: Arc<dyn RetryPrompt>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            provider,
            prompt,
            dispatcher,
            initial_kind: CredentialKind::Normal,
        }
    }

    /// Start with `kind` instead.
    pub fn with_initial_kind(mut self, kind: CredentialKind) -> Self {
        self.initial_kind = kind;
        self
    }

    /// Credential source for one attempt with `kind`.
    pub fn source(&self, kind: CredentialKind) -> ProviderSource<'_> {
        ProviderSource::new(self.provider.as_ref(), kind)
    }

    /// Run `operation` with retry.
    ///
    /// `operation` receives the credential kind for the attempt; build its
    /// credential source with [`RetryCoordinator::source`].
    pub fn run_with_retry<T, F>(&self, mut operation: F) -> Result<T, AuthError>
    where
        F: FnMut(CredentialKind) -> Result<T, GitError>,
    {
        let mut kind = self.initial_kind;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let span = info_span!("attempt", attempt, kind = kind.label());
            let _enter = span.enter();

            let err = match operation(kind) {
                Ok(value) => {
                    self.provider.store(kind);
                    debug!("remote operation succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.kind() {
                ErrorKind::AuthFailed => {
                    self.provider.invalidate(kind);
                    if kind == CredentialKind::SessionBased {
                        info!("session credentials rejected; falling back to normal credentials");
                        kind = CredentialKind::Normal;
                        continue;
                    }
                    if !self.ask_retry(&err)? {
                        info!("user declined to retry");
                        return Err(AuthError::Declined {
                            message: err.to_string(),
                        });
                    }
                }
                ErrorKind::Cancelled => {
                    info!("remote operation cancelled");
                    return Err(AuthError::Cancelled);
                }
                _ => {
                    debug!(error = %err, "not retryable");
                    return Err(AuthError::Git(err));
                }
            }
        }
    }

    fn ask_retry(&self, err: &GitError) -> Result<bool, AuthError> {
        if !self.dispatcher.is_alive() {
            return Ok(false);
        }
        let prompt = Arc::clone(&self.prompt);
        let message = err.to_string();
        Ok(invoke_sync(self.dispatcher.as_ref(), move || {
            prompt.ask_retry(&message)
        })?)
    }
}
