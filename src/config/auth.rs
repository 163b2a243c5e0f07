//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

const MIN_SECRET_BYTES: usize = 32;

/// Handshake token verification and event ingress protection.
///
/// Without a `jwt_secret` every connection is anonymous. Without an
/// `ingest_secret` anyone who can reach `/internal/events` can publish, so
/// it is required in production.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the poll API
    pub jwt_secret: Option<SecretString>,

    /// Expected `X-Internal-Token` on event ingress requests
    pub ingest_secret: Option<SecretString>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Production requires a JWT secret of reasonable length and an ingest
    /// secret.
    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        match &self.jwt_secret {
            Some(secret) if secret.expose_secret().is_empty() => {
                Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"))
            }
            Some(secret)
                if environment == Environment::Production
                    && secret.expose_secret().len() < MIN_SECRET_BYTES =>
            {
                Err(ValidationError::WeakJwtSecret(MIN_SECRET_BYTES))
            }
            _ => Ok(()),
        }?;

        match &self.ingest_secret {
            Some(secret) if secret.expose_secret().is_empty() => {
                Err(ValidationError::MissingRequired("AUTH__INGEST_SECRET"))
            }
            None if environment == Environment::Production => {
                Err(ValidationError::MissingRequired("AUTH__INGEST_SECRET"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: Some(SecretString::new(secret.to_string())),
            ingest_secret: Some(SecretString::new("ingest".to_string())),
        }
    }

    #[test]
    fn no_secret_means_anonymous_only() {
        let config = AuthConfig {
            ingest_secret: Some(SecretString::new("ingest".to_string())),
            ..AuthConfig::default()
        };
        assert!(!config.is_enabled());
        assert!(config.validate(Environment::Production).is_ok());
    }

    #[test]
    fn production_requires_ingest_secret() {
        let config = AuthConfig::default();
        assert!(config.validate(Environment::Development).is_ok());
        assert_eq!(
            config.validate(Environment::Production),
            Err(ValidationError::MissingRequired("AUTH__INGEST_SECRET"))
        );
    }

    #[test]
    fn empty_ingest_secret_is_rejected() {
        let config = AuthConfig {
            ingest_secret: Some(SecretString::new(String::new())),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.validate(Environment::Development),
            Err(ValidationError::MissingRequired("AUTH__INGEST_SECRET"))
        );
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            with_secret("").validate(Environment::Development),
            Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"))
        );
    }

    #[test]
    fn short_secret_only_allowed_outside_production() {
        let config = with_secret("dev-secret");
        assert!(config.validate(Environment::Development).is_ok());
        assert_eq!(
            config.validate(Environment::Production),
            Err(ValidationError::WeakJwtSecret(32))
        );
    }
}
