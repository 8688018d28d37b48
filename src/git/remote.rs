//! git::remote
//!
//! Fetch, push and clone with credential callbacks.
//!
//! # Credential flow
//!
//! git2 asks for credentials through a callback. Each remote call is one
//! *attempt*: the callback forwards the first request to a
//! [`CredentialSource`]; a second request within the same attempt means the
//! server rejected what we offered, so the attempt fails with
//! [`GitError::AuthFailed`] instead of looping forever. Retrying with fresh
//! credentials is the job of [`crate::auth::RetryCoordinator`].
//!
//! Username-only requests (SSH without a user in the URL) are answered
//! directly and do not count toward the guard.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::{Cred, CredentialHelper, CredentialType, FetchOptions, PushOptions, RemoteCallbacks};
use tracing::{debug, warn};

use super::error::{GitError, ProtocolCategory};

/// Username used for SSH when neither the URL nor the source supplies one.
const DEFAULT_SSH_USER: &str = "git";

/// Credentials offered to a remote.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Username and password (or token).
    UserPass { username: String, password: String },
    /// Key held by a running ssh-agent.
    SshAgent { username: String },
    /// Key file on disk.
    SshKey {
        username: String,
        private_key: PathBuf,
        passphrase: Option<String>,
    },
    /// Platform default (NTLM/Negotiate).
    Default,
}

impl Credential {
    /// Short label safe for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Credential::UserPass { .. } => "userpass",
            Credential::SshAgent { .. } => "ssh-agent",
            Credential::SshKey { .. } => "ssh-key",
            Credential::Default => "default",
        }
    }

    fn to_git2(&self) -> Result<Cred, git2::Error> {
        match self {
            Credential::UserPass { username, password } => {
                Cred::userpass_plaintext(username, password)
            }
            Credential::SshAgent { username } => Cred::ssh_key_from_agent(username),
            Credential::SshKey {
                username,
                private_key,
                passphrase,
            } => Cred::ssh_key(username, None, private_key, passphrase.as_deref()),
            Credential::Default => Cred::default(),
        }
    }
}

// Never print secrets.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::UserPass { username, .. } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credential::SshAgent { username } => f
                .debug_struct("SshAgent")
                .field("username", username)
                .finish(),
            Credential::SshKey {
                username,
                private_key,
                ..
            } => f
                .debug_struct("SshKey")
                .field("username", username)
                .field("private_key", private_key)
                .finish(),
            Credential::Default => f.write_str("Default"),
        }
    }
}

/// Credential types a remote accepts for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedCredentials {
    pub user_pass: bool,
    pub ssh_key: bool,
    pub default: bool,
}

impl AllowedCredentials {
    /// Everything.
    pub fn any() -> Self {
        Self {
            user_pass: true,
            ssh_key: true,
            default: true,
        }
    }

    fn from_git2(allowed: CredentialType) -> Self {
        Self {
            user_pass: allowed.contains(CredentialType::USER_PASS_PLAINTEXT),
            ssh_key: allowed.contains(CredentialType::SSH_KEY),
            default: allowed.contains(CredentialType::DEFAULT),
        }
    }

    /// Whether `credential` is acceptable.
    pub fn permits(&self, credential: &Credential) -> bool {
        match credential {
            Credential::UserPass { .. } => self.user_pass,
            Credential::SshAgent { .. } | Credential::SshKey { .. } => self.ssh_key,
            Credential::Default => self.default,
        }
    }
}

/// One credential request from a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Remote URL
    pub url: String,
    /// Username embedded in the URL, if any
    pub username: Option<String>,
    /// Acceptable credential types
    pub allowed: AllowedCredentials,
}

/// Supplies credentials for a single attempt.
pub trait CredentialSource {
    /// Produce credentials for `request`.
    ///
    /// Returning [`GitError::Cancelled`] aborts the attempt as a cancellation.
    fn credential(&mut self, request: &CredentialRequest) -> Result<Credential, GitError>;
}

/// Source for remotes that never ask (local paths, `file://`).
#[derive(Debug, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn credential(&mut self, request: &CredentialRequest) -> Result<Credential, GitError> {
        Err(GitError::AuthFailed {
            message: format!("no credentials available for {}", request.url),
        })
    }
}

/// Look up credentials from git's configured credential helper.
pub fn helper_credentials(url: &str, username: Option<&str>) -> Option<(String, String)> {
    let config = git2::Config::open_default().ok()?;
    CredentialHelper::new(url)
        .config(&config)
        .username(username)
        .execute()
}

/// Whether an ssh-agent socket is advertised.
pub fn ssh_agent_available() -> bool {
    std::env::var_os("SSH_AUTH_SOCK").is_some()
}

/// What happened inside the callbacks of one attempt.
#[derive(Debug, Default)]
struct AttemptState {
    requests: usize,
    failure: Option<GitError>,
    rejected_refs: Vec<String>,
}

fn callbacks<'a>(
    creds: &'a mut dyn CredentialSource,
    state: &'a RefCell<AttemptState>,
) -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();

    cb.credentials(move |url, username, allowed| {
        if allowed == CredentialType::USERNAME {
            return Cred::username(username.unwrap_or(DEFAULT_SSH_USER));
        }

        let mut st = state.borrow_mut();
        st.requests += 1;
        if st.requests > 1 {
            debug!(url, "credentials rejected within attempt");
            st.failure = Some(GitError::AuthFailed {
                message: format!("credentials rejected by {}", url),
            });
            return Err(git2::Error::from_str("credentials rejected"));
        }

        let request = CredentialRequest {
            url: url.to_string(),
            username: username.map(str::to_string),
            allowed: AllowedCredentials::from_git2(allowed),
        };
        match creds.credential(&request) {
            Ok(credential) => {
                debug!(url, kind = credential.label(), "offering credentials");
                credential.to_git2()
            }
            Err(e) => {
                let message = e.to_string();
                st.failure = Some(e);
                Err(git2::Error::from_str(&message))
            }
        }
    });

    cb.push_update_reference(move |refname, status| {
        if let Some(msg) = status {
            warn!(refname, reason = msg, "push rejected");
            state
                .borrow_mut()
                .rejected_refs
                .push(format!("{} ({})", refname, msg));
        }
        Ok(())
    });

    cb
}

fn finish<T>(result: Result<T, git2::Error>, state: RefCell<AttemptState>) -> Result<T, GitError> {
    let state = state.into_inner();
    match result {
        Ok(_) if !state.rejected_refs.is_empty() => Err(GitError::Protocol {
            category: ProtocolCategory::Unknown,
            message: format!("rejected: {}", state.rejected_refs.join(", ")),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(state.failure.unwrap_or_else(|| GitError::from_remote(e))),
    }
}

/// Fetch configured refspecs from `remote`.
pub(crate) fn fetch(
    repo: &git2::Repository,
    remote: &str,
    creds: &mut dyn CredentialSource,
) -> Result<(), GitError> {
    let mut remote = repo
        .find_remote(remote)
        .map_err(|e| GitError::from_git2(e, remote))?;

    let state = RefCell::new(AttemptState::default());
    let result = {
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks(creds, &state));
        remote.fetch(&[] as &[&str], Some(&mut opts), None)
    };
    finish(result, state)
}

/// Push `refspecs` (configured ones when empty) to `remote`.
pub(crate) fn push(
    repo: &git2::Repository,
    remote: &str,
    refspecs: &[String],
    creds: &mut dyn CredentialSource,
) -> Result<(), GitError> {
    let mut remote = repo
        .find_remote(remote)
        .map_err(|e| GitError::from_git2(e, remote))?;

    let state = RefCell::new(AttemptState::default());
    let result = {
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks(creds, &state));
        remote.push(refspecs, Some(&mut opts))
    };
    finish(result, state)
}

/// Clone `url` into `dest`.
pub(crate) fn clone(
    url: &str,
    dest: &Path,
    creds: &mut dyn CredentialSource,
) -> Result<git2::Repository, GitError> {
    let state = RefCell::new(AttemptState::default());
    let result = {
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks(creds, &state));
        git2::build::RepoBuilder::new()
            .fetch_options(opts)
            .clone(url, dest)
    };
    finish(result, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod credential {
        use super::*;

        #[test]
        fn debug_redacts_password() {
            let c = Credential::UserPass {
                username: "alice".into(),
                password: "hunter2".into(),
            };
            let shown = format!("{:?}", c);
            assert!(shown.contains("alice"));
            assert!(!shown.contains("hunter2"));
        }

        #[test]
        fn allowed_permits() {
            let allowed = AllowedCredentials {
                user_pass: true,
                ..Default::default()
            };
            assert!(allowed.permits(&Credential::UserPass {
                username: "u".into(),
                password: "p".into()
            }));
            assert!(!allowed.permits(&Credential::SshAgent {
                username: "git".into()
            }));
            assert!(AllowedCredentials::any().permits(&Credential::Default));
        }

        #[test]
        fn from_git2_flags() {
            let allowed = AllowedCredentials::from_git2(
                CredentialType::USER_PASS_PLAINTEXT | CredentialType::SSH_KEY,
            );
            assert!(allowed.user_pass);
            assert!(allowed.ssh_key);
            assert!(!allowed.default);
        }
    }

    mod finish {
        use super::*;

        #[test]
        fn recorded_failure_wins() {
            let state = RefCell::new(AttemptState {
                failure: Some(GitError::Cancelled),
                ..Default::default()
            });
            let result: Result<(), _> = finish(Err(git2::Error::from_str("callback")), state);
            assert!(matches!(result, Err(GitError::Cancelled)));
        }

        #[test]
        fn unrecorded_failure_is_classified() {
            let state = RefCell::new(AttemptState::default());
            let result: Result<(), _> =
                finish(Err(git2::Error::from_str("unsupported URL protocol")), state);
            assert!(matches!(
                result,
                Err(GitError::Protocol {
                    category: ProtocolCategory::UnsupportedProtocol,
                    ..
                })
            ));
        }

        #[test]
        fn rejected_refs_fail_push() {
            let state = RefCell::new(AttemptState {
                rejected_refs: vec!["refs/heads/main (non-fast-forward)".into()],
                ..Default::default()
            });
            let result = finish(Ok(()), state);
            assert!(matches!(result, Err(GitError::Protocol { .. })));
        }
    }

    #[test]
    fn clone_local_path_needs_no_credentials() {
        let src = tempfile::TempDir::new().unwrap();
        let repo = git2::Repository::init(src.path()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        let dest = tempfile::TempDir::new().unwrap();
        let target = dest.path().join("clone");
        let url = src.path().to_str().unwrap();
        let cloned = clone(url, &target, &mut NoCredentials).unwrap();
        assert!(cloned.head().is_ok());
    }

    #[test]
    fn clone_missing_source_is_protocol_error() {
        let dest = tempfile::TempDir::new().unwrap();
        let missing = dest.path().join("does-not-exist");
        let err = clone(
            missing.to_str().unwrap(),
            &dest.path().join("clone"),
            &mut NoCredentials,
        )
        .err().expect("clone should fail");
        assert!(matches!(
            err,
            GitError::Protocol { .. } | GitError::RefNotFound { .. }
        ));
    }
}
