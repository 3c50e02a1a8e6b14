use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parlor_config::AuthConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const MAX_TOKEN_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("credential expired")]
    Expired,
    #[error("failed to issue credential: {0}")]
    TokenCreation(String),
}

/// The identity a verified credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Resolves a bearer credential to a user identity.
///
/// Shared by the websocket handshake and the REST middleware so that both
/// surfaces accept exactly the same tokens.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Token payload. The user id travels in `_id`, which is what the platform's
/// session issuer writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// HS256 verifier and issuer.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl JwtVerifier {
    pub fn new(secret: &str, token_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced when the claim is present but not required.
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let ttl_seconds = config.token_ttl_seconds.min(MAX_TOKEN_TTL_SECONDS) as i64;
        Self::new(&config.jwt_secret, Duration::seconds(ttl_seconds))
    }

    /// Issue a token for `user_id` valid for the configured lifetime.
    pub fn issue(&self, user_id: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.token_ttl)
            .map(|at| at.timestamp())
            .unwrap_or(i64::MAX);
        self.issue_with_claims(&Claims {
            user_id: user_id.to_string(),
            iat: Some(now.timestamp()),
            exp: Some(expires),
        })
    }

    pub fn issue_with_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        if claims.user_id.trim().is_empty() {
            return Err(AuthError::TokenCreation("user id must not be empty".into()));
        }
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| AuthError::TokenCreation(err.to_string()))
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
            debug!(error = %err, "rejected credential");
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredential(err.to_string()),
            }
        })?;

        if data.claims.user_id.trim().is_empty() {
            return Err(AuthError::InvalidCredential("empty user id".into()));
        }

        Ok(AuthenticatedUser {
            user_id: data.claims.user_id,
        })
    }
}
