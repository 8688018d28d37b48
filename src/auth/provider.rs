//! auth::provider
//!
//! Credential providers.
//!
//! # Lookup order
//!
//! [`GitCredentialProvider`] answers a request for the `Normal` kind with the
//! first of:
//!
//! 1. A live cached credential for the URL
//! 2. git's configured credential helper (user/password remotes)
//! 3. ssh-agent (SSH remotes, when `SSH_AUTH_SOCK` is set)
//! 4. The interactive [`CredentialPrompt`], run on the UI thread
//!
//! Once a kind has been invalidated, the automatic sources (2 and 3) are
//! skipped for it until a later success, so a rejected helper or agent
//! credential is not offered again. The `SessionBased` kind only ever offers
//! the platform default credential.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::cache::CredentialCache;
use super::errors::AuthError;
use super::CredentialKind;
use crate::git::remote::{helper_credentials, ssh_agent_available};
use crate::git::{Credential, CredentialRequest, CredentialSource, GitError};
use crate::ui::dispatch::{invoke_sync, Dispatcher};
use crate::ui::prompts::CredentialPrompt;

/// Username offered to SSH remotes that do not name one.
const DEFAULT_SSH_USER: &str = "git";

/// Produces credentials for remote attempts.
pub trait CredentialProvider: Send + Sync {
    /// A credential for `request` using `kind`.
    fn try_get(
        &self,
        request: &CredentialRequest,
        kind: CredentialKind,
    ) -> Result<Credential, AuthError>;

    /// The last credential handed out for `kind` worked; keep it.
    fn store(&self, kind: CredentialKind);

    /// The last credential handed out for `kind` was rejected; forget it.
    fn invalidate(&self, kind: CredentialKind);
}

/// Adapts a provider to the git layer for one attempt.
pub struct ProviderSource<'a> {
    provider: &'a dyn CredentialProvider,
    kind: CredentialKind,
}

impl<'a> ProviderSource<'a> {
    /// Source handing out `kind` credentials from `provider`.
    pub fn new(provider: &'a dyn CredentialProvider, kind: CredentialKind) -> Self {
        Self { provider, kind }
    }
}

impl CredentialSource for ProviderSource<'_> {
    fn credential(&mut self, request: &CredentialRequest) -> Result<Credential, GitError> {
        self.provider
            .try_get(request, self.kind)
            .map_err(|e| match e {
                AuthError::Cancelled => GitError::Cancelled,
                AuthError::Git(inner) => inner,
                other => GitError::AuthFailed {
                    message: other.to_string(),
                },
            })
    }
}

/// Provider backed by git's helpers, ssh-agent and a prompt.
pub struct GitCredentialProvider {
    cache: Mutex<CredentialCache>,
    rejected: Mutex<HashMap<CredentialKind, u32>>,
    prompt: Arc<dyn CredentialPrompt>,
    dispatcher: Arc<dyn Dispatcher>,
    system_sources: bool,
}

impl std::fmt::Debug for GitCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCredentialProvider")
            .field("system_sources", &self.system_sources)
            .finish_non_exhaustive()
    }
}

impl GitCredentialProvider {
    /// Create a provider prompting through `prompt` on `dispatcher`'s thread.
    pub fn new(prompt: Arc<dyn CredentialPrompt>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            cache: Mutex::new(CredentialCache::new()),
            rejected: Mutex::new(HashMap::new()),
            prompt,
            dispatcher,
            system_sources: true,
        }
    }

    /// Enable or disable the credential helper and ssh-agent lookups.
    pub fn with_system_sources(mut self, enabled: bool) -> Self {
        self.system_sources = enabled;
        self
    }

    fn rejections(&self, kind: CredentialKind) -> u32 {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, CredentialCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn normal(&self, request: &CredentialRequest) -> Result<Credential, AuthError> {
        let automatic = self.system_sources && self.rejections(CredentialKind::Normal) == 0;

        if automatic && request.allowed.user_pass {
            if let Some((username, password)) =
                helper_credentials(&request.url, request.username.as_deref())
            {
                debug!(url = %request.url, "using credential helper");
                return Ok(Credential::UserPass { username, password });
            }
        }
        if automatic && request.allowed.ssh_key && ssh_agent_available() {
            debug!(url = %request.url, "using ssh-agent");
            return Ok(Credential::SshAgent {
                username: request
                    .username
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            });
        }
        if !request.allowed.user_pass {
            return Err(AuthError::Provider(format!(
                "{} accepts no credential type repoflow can supply",
                request.url
            )));
        }
        self.prompt_user(request)
    }

    fn prompt_user(&self, request: &CredentialRequest) -> Result<Credential, AuthError> {
        if !self.dispatcher.is_alive() {
            warn!("UI is gone; cannot ask for credentials");
            return Err(AuthError::Cancelled);
        }
        let prompt = Arc::clone(&self.prompt);
        let url = request.url.clone();
        let username = request.username.clone();
        let answer = invoke_sync(self.dispatcher.as_ref(), move || {
            prompt.ask_credentials(&url, username.as_deref())
        })?;
        match answer {
            Some((username, password)) => Ok(Credential::UserPass { username, password }),
            None => Err(AuthError::Cancelled),
        }
    }
}

impl CredentialProvider for GitCredentialProvider {
    fn try_get(
        &self,
        request: &CredentialRequest,
        kind: CredentialKind,
    ) -> Result<Credential, AuthError> {
        let cached = self
            .cache()
            .get(kind, &request.url)
            .filter(|c| request.allowed.permits(c));
        let credential = match cached {
            Some(credential) => {
                debug!(kind = %kind, label = credential.label(), "using cached credential");
                credential
            }
            None => match kind {
                CredentialKind::SessionBased if request.allowed.default => Credential::Default,
                CredentialKind::SessionBased => {
                    return Err(AuthError::Provider(
                        "remote does not accept session credentials".to_string(),
                    ))
                }
                CredentialKind::Normal => self.normal(request)?,
            },
        };
        self.cache()
            .record_attempt(kind, &request.url, credential.clone());
        Ok(credential)
    }

    fn store(&self, kind: CredentialKind) {
        if self.cache().promote(kind) {
            debug!(kind = %kind, "credentials stored");
        }
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&kind);
    }

    fn invalidate(&self, kind: CredentialKind) {
        let removed = self.cache().invalidate(kind);
        *self
            .rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_insert(0) += 1;
        debug!(kind = %kind, removed, "credentials invalidated");
    }
}
