//! Bearer credential capability
//!
//! A bearer credential carries a subject (username), an optional role claim
//! (only present on admin credentials) and an expiry. Expiry is checked
//! against the caller-supplied instant rather than the wall clock so the
//! whole service can run on an injected [`crate::Clock`].

use crate::rbac::Role;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Token errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token expired")]
    Expired,
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// Claims carried by a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    /// Role claim, admin credentials only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Issued at (seconds since Unix epoch)
    pub iat: i64,

    /// Expiry (seconds since Unix epoch)
    pub exp: i64,

    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Claims for `subject` valid for `ttl` from `now`
    pub fn new(
        subject: impl Into<String>,
        role: Option<Role>,
        issuer: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: subject.into(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: issuer.into(),
        }
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Opaque sign/verify capability for bearer credentials
pub trait TokenSigner: Send + Sync + fmt::Debug {
    /// Sign claims into a compact token
    fn sign(&self, claims: &Claims) -> Result<String>;

    /// Verify signature and issuer, then expiry relative to `now`
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims>;
}

/// HS256 JWT signer
pub struct JwtTokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl JwtTokenSigner {
    /// Signer using a shared secret
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Issuer this signer expects
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

impl fmt::Debug for JwtTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtTokenSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenSigner for JwtTokenSigner {
    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}
