use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::{Store, User};

/// What's inside a token: the user's public fields plus expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub group: String,
    pub is_superuser: bool,
    pub is_active: bool,
    /// Expiration (unix timestamp, seconds).
    pub exp: i64,
}

/// Errors specific to token decoding.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, wrong algorithm, unparseable payload (including a
    /// missing user id), or expiry in the past.
    #[error("Malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

/// Issues and verifies the service's bearer tokens (HS256).
///
/// Keys are derived once from the configured secret; handlers share a
/// single instance through the application state. There is no fallback
/// secret — construction requires an explicit `AuthConfig`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.token_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::minutes(config.token_ttl_minutes),
        }
    }

    /// Issue a signed token for a user with the configured lifetime.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_with_ttl(user, self.ttl)
    }

    /// Issue a signed token with an explicit lifetime. The signature
    /// covers the entire payload; any mutation invalidates it.
    pub fn issue_with_ttl(&self, user: &User, ttl: Duration) -> Result<String, TokenError> {
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            group: user.group.clone(),
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            exp: (Utc::now() + ttl).timestamp(),
        };

        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Decode a token, validating signature, algorithm and expiry only.
    /// Does not touch the store.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Full verification: the token decodes and the user it names still
    /// exists in the store.
    ///
    /// Every failure collapses to `false` — this is the boolean contract
    /// the rest of the service relies on. Callers that need a reason use
    /// `decode` directly.
    pub async fn verify(&self, token: &str, store: &Store) -> bool {
        let Ok(claims) = self.decode(token) else {
            return false;
        };

        store.user_exists(claims.id).await.unwrap_or(false)
    }
}
