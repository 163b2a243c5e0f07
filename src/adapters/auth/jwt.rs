//! HS256 JWT verifier.
//!
//! Tokens are issued by the poll API with the numeric user id in `sub`
//! (either as a JSON string or a number) and an `exp` claim. The realtime
//! layer shares the signing secret and only checks signature and expiry.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::TokenVerifier;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Subject,
    #[allow(dead_code)]
    exp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Subject {
    Number(i64),
    Text(String),
}

impl Subject {
    fn user_id(&self) -> Result<UserId, AuthError> {
        match self {
            Subject::Number(n) => Ok(UserId::from(*n)),
            Subject::Text(s) => s.parse().map_err(|_| {
                tracing::warn!("JWT subject is not a numeric user id");
                AuthError::InvalidToken
            }),
        }
    }
}

/// Verifies HS256 tokens signed with a shared secret.
pub struct HmacTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacTokenVerifier {
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                tracing::debug!("Token expired");
                AuthError::TokenExpired
            }
            other => {
                tracing::debug!(error = ?other, "Token rejected");
                AuthError::InvalidToken
            }
        })?;

        data.claims.sub.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-key";

    fn verifier() -> HmacTokenVerifier {
        HmacTokenVerifier::new(&SecretString::new(SECRET.to_string()))
    }

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn accepts_string_subject() {
        let token = sign(json!({"sub": "17", "exp": in_one_hour()}), SECRET);
        assert_eq!(verifier().verify(&token).await, Ok(UserId::from(17)));
    }

    #[tokio::test]
    async fn accepts_numeric_subject() {
        let token = sign(json!({"sub": 5, "exp": in_one_hour()}), SECRET);
        assert_eq!(verifier().verify(&token).await, Ok(UserId::from(5)));
    }

    #[tokio::test]
    async fn rejects_wrong_secret() {
        let token = sign(json!({"sub": "17", "exp": in_one_hour()}), "other-secret");
        assert_eq!(verifier().verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        let token = sign(json!({"sub": "17", "exp": exp}), SECRET);
        assert_eq!(verifier().verify(&token).await, Err(AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn rejects_non_numeric_subject() {
        let token = sign(json!({"sub": "alice", "exp": in_one_hour()}), SECRET);
        assert_eq!(verifier().verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        assert_eq!(verifier().verify("not.a.jwt").await, Err(AuthError::InvalidToken));
    }
}
