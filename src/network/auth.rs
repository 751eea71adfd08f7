//! Gateway Authentication
//!
//! Validates JWTs issued by an external provider and maps the subject
//! claim to the ledger account the connection may sign for. The gateway
//! never issues tokens.

use std::collections::HashSet;

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::account::Account;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Skip expiry validation (testing only).
    pub skip_expiry: bool,
    /// Treat the raw token as the account name (local development only).
    pub insecure_dev: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: env_flag("AUTH_SKIP_EXPIRY"),
            insecure_dev: env_flag("AUTH_INSECURE_DEV"),
        }
    }

    /// A verification key is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// JWT claims expected from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the ledger account name.
    pub sub: String,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Account the token holder signs for.
    pub fn account(&self) -> Account {
        Account::new(self.sub.as_str())
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token is malformed.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature check failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token expired.
    #[error("token expired")]
    Expired,
    /// Issuer mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience mismatch.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim absent.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Any other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = HashSet::new();
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // jsonwebtoken allows some leeway; expiry is strict here
    if !config.skip_expiry && claims.exp > 0 {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Resolve the account a connection authenticates as.
pub fn authenticate(token: &str, config: &AuthConfig) -> Result<Account, AuthError> {
    if config.is_configured() {
        return validate_token(token, config).map(|c| c.account());
    }
    if config.insecure_dev && !token.is_empty() {
        return Ok(Account::new(token));
    }
    Err(AuthError::NotConfigured)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
