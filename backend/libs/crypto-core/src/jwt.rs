//! Bearer token verification
//!
//! The gateway verifies externally issued tokens and never issues them.
//! A `JwtValidator` is built once at startup from either a shared secret
//! (HS256) or an RSA public key (RS256) and passed to whoever needs it;
//! there is no global key state.
//!
//! Failures split into two classes the gateway maps differently:
//! a missing or structurally broken credential is `Unauthorized`, a
//! well-formed token with a bad signature, expired lifetime or wrong
//! issuer/audience is `Forbidden`.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use murmur_common::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("invalid verification key: {0}")]
    Key(String),
}

impl JwtError {
    /// Credential absent or unparseable, as opposed to present but not trusted
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, JwtError::Missing | JwtError::Malformed(_))
    }
}

impl From<JwtError> for ServiceError {
    fn from(err: JwtError) -> Self {
        match err {
            _ if err.is_unauthenticated() => ServiceError::Unauthorized(err.to_string()),
            JwtError::Key(_) => ServiceError::Internal(err.to_string()),
            _ => ServiceError::Forbidden(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::InvalidSignature,
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => JwtError::Rejected(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat | ErrorKind::InvalidEcdsaKey => {
                JwtError::Key(err.to_string())
            }
            _ => JwtError::Malformed(err.to_string()),
        }
    }
}

/// Claims every accepted token must carry; everything else is kept verbatim
#[derive(Debug, Deserialize)]
struct RegisteredClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Identity derived from a verified token, valid for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub subject_id: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Remaining claims (`jti`, `email`, `role`, ...)
    pub claims: Map<String, Value>,
}

impl Principal {
    /// Token id, used for revocation lookups
    pub fn token_id(&self) -> Option<&str> {
        self.claims.get("jti").and_then(Value::as_str)
    }
}

fn timestamp(secs: i64, claim: &str) -> Result<DateTime<Utc>, JwtError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| JwtError::Malformed(format!("{} out of range", claim)))
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, JwtError> {
    let header = header.ok_or(JwtError::Missing)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| JwtError::Malformed("expected 'Bearer <token>'".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(JwtError::Malformed(format!("unsupported scheme '{}'", scheme)));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(JwtError::Missing);
    }
    Ok(token)
}

#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    /// Shared-secret verification
    pub fn hs256(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// RSA public key verification
    pub fn rs256_pem(public_key_pem: &str) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA public key: {e}")))?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        // Only the configured algorithm is accepted, no fallback
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self
    }

    /// Allowed clock skew for `exp`/`nbf`
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    /// Verify the signature and lifetime and derive the principal
    pub fn validate(&self, token: &str) -> Result<Principal, JwtError> {
        if token.split('.').count() != 3 {
            return Err(JwtError::Malformed("expected three dot-separated segments".into()));
        }

        let data = decode::<RegisteredClaims>(token, &self.key, &self.validation)?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(JwtError::Malformed("empty subject".into()));
        }

        Ok(Principal {
            subject_id: claims.sub,
            issued_at: claims.iat.map(|iat| timestamp(iat, "iat")).transpose()?,
            expires_at: timestamp(claims.exp, "exp")?,
            claims: claims.rest,
        })
    }

    /// Verify the token carried by an `Authorization` header value
    pub fn validate_header(&self, header: Option<&str>) -> Result<Principal, JwtError> {
        self.validate(bearer_token(header)?)
    }
}
