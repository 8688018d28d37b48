//! auth::errors
//!
//! Error types for credential handling and retry.
//!
//! Messages never contain secrets. Library messages are carried through
//! as-is; git2 does not put credentials in them.
//!
//! # Example
//!
//! ```
//! use repoflow::auth::AuthError;
//! use repoflow::git::{ErrorKind, HasErrorKind};
//!
//! let err = AuthError::Declined { message: "401".into() };
//! assert_eq!(err.kind(), ErrorKind::AuthFailed);
//! assert_eq!(AuthError::Cancelled.kind(), ErrorKind::Cancelled);
//! ```

use thiserror::Error;

use crate::git::{ErrorKind, GitError, HasErrorKind};
use crate::ui::dispatch::DispatchError;

/// Errors from authenticated remote operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user cancelled a credential prompt or the operation.
    #[error("authentication cancelled by user")]
    Cancelled,

    /// Credentials were rejected and the user chose not to retry.
    #[error("authentication failed: {message}")]
    Declined {
        /// Last library message
        message: String,
    },

    /// The operation failed for a reason unrelated to credentials.
    #[error(transparent)]
    Git(#[from] GitError),

    /// No acceptable credential could be produced.
    #[error("no credentials available: {0}")]
    Provider(String),

    /// The UI thread could not be reached for a prompt.
    #[error("could not reach the UI: {0}")]
    Dispatch(#[from] DispatchError),
}

impl AuthError {
    /// Whether the user stopped the operation (cancel or declined retry).
    pub fn is_user_stop(&self) -> bool {
        matches!(self, AuthError::Cancelled | AuthError::Declined { .. })
    }
}

impl HasErrorKind for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Cancelled => ErrorKind::Cancelled,
            AuthError::Declined { .. } | AuthError::Provider(_) => ErrorKind::AuthFailed,
            AuthError::Git(e) => e.kind(),
            AuthError::Dispatch(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ProtocolCategory;

    #[test]
    fn kinds() {
        assert_eq!(AuthError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            AuthError::Provider("none".into()).kind(),
            ErrorKind::AuthFailed
        );
        let protocol = AuthError::from(GitError::Protocol {
            category: ProtocolCategory::InvalidRepository,
            message: "not found".into(),
        });
        assert_eq!(protocol.kind(), ErrorKind::ProtocolError);
        assert_eq!(AuthError::Dispatch(DispatchError::Closed).kind(), ErrorKind::Other);
    }

    #[test]
    fn git_errors_display_transparently() {
        let err = AuthError::from(GitError::Cancelled);
        assert_eq!(err.to_string(), GitError::Cancelled.to_string());
    }

    #[test]
    fn user_stops() {
        assert!(AuthError::Cancelled.is_user_stop());
        assert!(AuthError::Declined {
            message: "x".into()
        }
        .is_user_stop());
        assert!(!AuthError::Provider("x".into()).is_user_stop());
    }
}
