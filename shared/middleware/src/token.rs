//! HS256 bearer tokens for authenticated accounts.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use shield_config::AuthConfig;
use shield_models::{Account, Claims};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Signing and verification keys shared by the login flow and the auth middleware.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    expiry: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, issuer: impl Into<String>, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            expiry: Duration::hours(expiry_hours),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.jwt_issuer.clone(), config.jwt_expiry_hours)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            exp: (now + self.expiry).timestamp() as usize,
            iat: now.timestamp() as usize,
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}
