//! Connection identity types.
//!
//! The realtime layer only needs to know *who* is on the other end of a
//! connection, if anyone. Anonymous viewers are allowed to watch polls;
//! only the mutation layer cares whether a user may change them.

use super::UserId;
use thiserror::Error;

/// Identity attached to a connection at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    /// No token was presented.
    #[default]
    Anonymous,
    /// A verified token identified this user.
    User(UserId),
}

impl Viewer {
    /// Returns the user id for authenticated viewers.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::User(_))
    }
}

impl From<Option<UserId>> for Viewer {
    fn from(user: Option<UserId>) -> Self {
        user.map(Viewer::User).unwrap_or_default()
    }
}

/// Authentication errors that can occur during token verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is malformed, has a bad signature, or lacks a usable subject.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token signature is valid but it has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The verifier could not be reached or is misconfigured.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if the client should obtain a fresh token.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AuthError::InvalidToken | AuthError::TokenExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_from_option() {
        assert_eq!(Viewer::from(None), Viewer::Anonymous);
        let user = UserId::from(3);
        assert_eq!(Viewer::from(Some(user)), Viewer::User(user));
        assert_eq!(Viewer::User(user).user_id(), Some(user));
        assert!(!Viewer::Anonymous.is_authenticated());
    }

    #[test]
    fn auth_error_requires_reauthentication_for_token_errors() {
        assert!(AuthError::InvalidToken.requires_reauthentication());
        assert!(AuthError::TokenExpired.requires_reauthentication());
        assert!(!AuthError::service_unavailable("down").requires_reauthentication());
    }

    #[test]
    fn auth_error_service_unavailable_displays_message() {
        let err = AuthError::service_unavailable("no secret configured");
        assert_eq!(
            format!("{}", err),
            "Auth service unavailable: no secret configured"
        );
    }
}
