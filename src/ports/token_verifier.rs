//! Token verification port - who is on the other end of a connection.
//!
//! The realtime layer does not authenticate the transport itself; it only
//! resolves an optional access token to a user id at handshake time so that
//! per-viewer state can be attributed. Implementations exist for HS256 JWTs
//! and for tests.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};

/// Resolves an access token to the user it was issued for.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature and expiry
/// - Return `AuthError::InvalidToken` for malformed or badly signed tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` when verification is impossible
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw token (without any `Bearer ` prefix).
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}
