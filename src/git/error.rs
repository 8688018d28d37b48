//! git::error
//!
//! Error taxonomy for repository access.
//!
//! Every failure coming out of the git layer carries an [`ErrorKind`] tag.
//! Higher layers (credential retry, orchestration) switch on the tag rather
//! than on concrete variants. git2 errors are normalized in exactly one place,
//! [`GitError::from_git2`].

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::TypeError;

/// Coarse classification shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user cancelled. Never retried.
    Cancelled,
    /// Credentials were rejected. Retryable with fresh credentials.
    AuthFailed,
    /// Conflicting changes that need resolution.
    Conflict,
    /// Identity (user.name / user.email) is not configured.
    ConfigMissing,
    /// Remote or library failure classified into a [`ProtocolCategory`].
    ProtocolError,
    /// Anything else.
    Other,
}

/// Types that can report an [`ErrorKind`].
pub trait HasErrorKind {
    /// The classification of this error.
    fn kind(&self) -> ErrorKind;
}

/// User-facing categories for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCategory {
    /// The remote is not a valid repository.
    InvalidRepository,
    /// The server refused access (not a credential problem).
    AuthorizationFailed,
    /// The URL scheme is not supported.
    UnsupportedProtocol,
    /// The server answered with something that is not git.
    UnexpectedContentType,
    /// The host could not be reached.
    NetworkUnreachable,
    /// Not recognized; the raw message is surfaced.
    Unknown,
}

impl ProtocolCategory {
    /// Classify a library message.
    ///
    /// ```
    /// use repoflow::git::ProtocolCategory;
    ///
    /// assert_eq!(
    ///     ProtocolCategory::classify("unsupported URL protocol"),
    ///     ProtocolCategory::UnsupportedProtocol
    /// );
    /// assert_eq!(ProtocolCategory::classify("weird"), ProtocolCategory::Unknown);
    /// ```
    pub fn classify(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["unsupported url protocol", "unsupported protocol", "unsupported scheme"]) {
            ProtocolCategory::UnsupportedProtocol
        } else if has(&["content-type", "content type"]) {
            ProtocolCategory::UnexpectedContentType
        } else if has(&["403", "forbidden", "authorization", "permission denied"]) {
            ProtocolCategory::AuthorizationFailed
        } else if has(&[
            "not a git repository",
            "does not appear to be a git repository",
            "repository not found",
            "could not find repository",
            "failed to resolve path",
            "not valid",
            "404",
        ]) {
            ProtocolCategory::InvalidRepository
        } else if has(&[
            "failed to resolve address",
            "could not resolve host",
            "connection refused",
            "timed out",
            "unreachable",
            "failed to connect",
        ]) {
            ProtocolCategory::NetworkUnreachable
        } else {
            ProtocolCategory::Unknown
        }
    }

    /// Short description shown to users.
    pub fn description(&self) -> &'static str {
        match self {
            ProtocolCategory::InvalidRepository => "not a valid repository",
            ProtocolCategory::AuthorizationFailed => "authorization failed",
            ProtocolCategory::UnsupportedProtocol => "unsupported protocol",
            ProtocolCategory::UnexpectedContentType => "unexpected content type",
            ProtocolCategory::NetworkUnreachable => "network unreachable",
            ProtocolCategory::Unknown => "remote error",
        }
    }
}

impl std::fmt::Display for ProtocolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref or revision does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Operation cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Credentials were rejected by the remote.
    #[error("authentication failed: {message}")]
    AuthFailed {
        /// Library message
        message: String,
    },

    /// Conflicting changes prevent the operation.
    #[error("conflict in {} path(s)", paths.len())]
    Conflict {
        /// Conflicted paths, relative to the working directory
        paths: Vec<PathBuf>,
    },

    /// Identity is not configured.
    #[error("identity not configured: {message}")]
    ConfigMissing {
        /// Library message
        message: String,
    },

    /// Remote/protocol failure.
    #[error("{category}: {message}")]
    Protocol {
        /// Recognized category
        category: ProtocolCategory,
        /// Raw library message
        message: String,
    },

    /// A lock file is held by another process.
    #[error("repository is locked: {message}")]
    Locked {
        /// Library message
        message: String,
    },

    /// Internal git2 or filesystem error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        use git2::{ErrorClass, ErrorCode};

        match (err.code(), err.class()) {
            (ErrorCode::NotFound, _) | (ErrorCode::UnbornBranch, _) => GitError::RefNotFound {
                refname: context.to_string(),
            },
            (ErrorCode::InvalidSpec, _) => GitError::RefNotFound {
                refname: context.to_string(),
            },
            (ErrorCode::Auth, _) | (ErrorCode::Certificate, _) => GitError::AuthFailed {
                message: err.message().to_string(),
            },
            (ErrorCode::User, _) => GitError::Cancelled,
            (ErrorCode::Locked, _) => GitError::Locked {
                message: err.message().to_string(),
            },
            (ErrorCode::Conflict, _) | (ErrorCode::MergeConflict, _) => {
                GitError::Conflict { paths: Vec::new() }
            }
            (_, ErrorClass::Net)
            | (_, ErrorClass::Http)
            | (_, ErrorClass::Ssh)
            | (_, ErrorClass::Ssl) => GitError::Protocol {
                category: ProtocolCategory::classify(err.message()),
                message: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    /// Classify the error of a remote operation.
    ///
    /// Unlike [`GitError::from_git2`], any unrecognized failure becomes a
    /// [`GitError::Protocol`] so that users always see a category.
    pub(crate) fn from_remote(err: git2::Error) -> Self {
        let message = err.message().to_string();
        match GitError::from_git2(err, "remote") {
            GitError::Internal { .. } | GitError::RefNotFound { .. } => GitError::Protocol {
                category: ProtocolCategory::classify(&message),
                message,
            },
            other => other,
        }
    }

    pub(crate) fn io(err: std::io::Error, context: &str) -> Self {
        GitError::Internal {
            message: format!("{}: {}", context, err),
        }
    }
}

impl HasErrorKind for GitError {
    fn kind(&self) -> ErrorKind {
        match self {
            GitError::Cancelled => ErrorKind::Cancelled,
            GitError::AuthFailed { .. } => ErrorKind::AuthFailed,
            GitError::Conflict { .. } => ErrorKind::Conflict,
            GitError::ConfigMissing { .. } => ErrorKind::ConfigMissing,
            GitError::Protocol { .. } => ErrorKind::ProtocolError,
            GitError::NotARepo { .. }
            | GitError::BareRepo
            | GitError::RefNotFound { .. }
            | GitError::Locked { .. }
            | GitError::Internal { .. } => ErrorKind::Other,
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod classify {
        use super::*;

        #[test]
        fn invalid_repository() {
            assert_eq!(
                ProtocolCategory::classify("'/tmp/x' does not appear to be a git repository"),
                ProtocolCategory::InvalidRepository
            );
            assert_eq!(
                ProtocolCategory::classify("remote: Repository not found."),
                ProtocolCategory::InvalidRepository
            );
        }

        #[test]
        fn content_type() {
            assert_eq!(
                ProtocolCategory::classify("invalid Content-Type: text/html"),
                ProtocolCategory::UnexpectedContentType
            );
        }

        #[test]
        fn authorization() {
            assert_eq!(
                ProtocolCategory::classify("unexpected http status code: 403"),
                ProtocolCategory::AuthorizationFailed
            );
        }

        #[test]
        fn network() {
            assert_eq!(
                ProtocolCategory::classify("failed to resolve address for example.invalid"),
                ProtocolCategory::NetworkUnreachable
            );
        }

        #[test]
        fn case_insensitive() {
            assert_eq!(
                ProtocolCategory::classify("UNSUPPORTED URL PROTOCOL"),
                ProtocolCategory::UnsupportedProtocol
            );
        }
    }

    mod from_git2 {
        use super::*;

        #[test]
        fn auth_code_is_auth_failed() {
            let err = git2::Error::new(git2::ErrorCode::Auth, git2::ErrorClass::Http, "nope");
            assert_eq!(GitError::from_git2(err, "fetch").kind(), ErrorKind::AuthFailed);
        }

        #[test]
        fn user_code_is_cancelled() {
            let err = git2::Error::new(git2::ErrorCode::User, git2::ErrorClass::Callback, "stop");
            assert!(matches!(GitError::from_git2(err, "fetch"), GitError::Cancelled));
        }

        #[test]
        fn not_found_is_ref_not_found() {
            let err = git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Reference,
                "missing",
            );
            match GitError::from_git2(err, "refs/heads/x") {
                GitError::RefNotFound { refname } => assert_eq!(refname, "refs/heads/x"),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn net_class_is_protocol() {
            let err = git2::Error::new(
                git2::ErrorCode::GenericError,
                git2::ErrorClass::Net,
                "failed to connect to host",
            );
            match GitError::from_git2(err, "fetch") {
                GitError::Protocol { category, .. } => {
                    assert_eq!(category, ProtocolCategory::NetworkUnreachable)
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn remote_generic_becomes_protocol() {
            let err = git2::Error::from_str("could not find repository at '/nowhere'");
            assert!(matches!(
                GitError::from_remote(err),
                GitError::Protocol {
                    category: ProtocolCategory::InvalidRepository,
                    ..
                }
            ));
        }
    }

    #[test]
    fn kinds() {
        assert_eq!(GitError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            GitError::Conflict { paths: vec![] }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            GitError::ConfigMissing {
                message: String::new()
            }
            .kind(),
            ErrorKind::ConfigMissing
        );
        assert_eq!(GitError::BareRepo.kind(), ErrorKind::Other);
    }
}
