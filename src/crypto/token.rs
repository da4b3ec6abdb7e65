//! Signed bearer tokens.
//!
//! Tokens are HMAC-signed JWTs carrying `sub` (the user's email), `iat`, `exp`
//! and a `scope` that keeps access, refresh and email-confirmation tokens from
//! being used in place of one another.
//!
//! Expiry is checked against a caller-supplied clock instead of the library's
//! internal one, so verification is a pure function of the token, the
//! configured key and `now`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    AccessToken,
    RefreshToken,
    EmailToken,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::AccessToken => "access_token",
            TokenScope::RefreshToken => "refresh_token",
            TokenScope::EmailToken => "email_token",
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims carried by every token this service issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identity (user email). Empty when the claim was absent.
    #[serde(default)]
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub scope: Option<TokenScope>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing secret must not be empty")]
    EmptySecret,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token signature does not match")]
    InvalidSignature,

    #[error("Token was not signed with the configured algorithm")]
    AlgorithmMismatch,

    #[error("Token has expired")]
    Expired,

    #[error("Token has no subject")]
    MissingSubject,

    #[error("Token scope is not {expected}")]
    WrongScope { expected: TokenScope },

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Only secret-keyed algorithms make sense with a shared signing secret
fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    let algorithm = Algorithm::from_str(&name.trim().to_uppercase())
        .map_err(|_| TokenError::UnsupportedAlgorithm(name.to_string()))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(TokenError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Issues and verifies tokens with one secret and one algorithm
#[derive(Clone)]
pub struct TokenSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let algorithm = parse_algorithm(algorithm)?;
        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a token for `subject` valid from `now` until `now + ttl`
    pub fn issue(
        &self,
        subject: &str,
        scope: TokenScope,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            scope: Some(scope),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Decode and validate a token, returning its claims.
    ///
    /// A token stays valid through the second named by `exp` and is rejected
    /// once `now` is past it. There is no leeway.
    pub fn verify(
        &self,
        token: &str,
        expected_scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::AlgorithmMismatch,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;

        if claims.exp < now.timestamp() {
            return Err(TokenError::Expired);
        }

        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }

        if claims.scope != Some(expected_scope) {
            return Err(TokenError::WrongScope {
                expected: expected_scope,
            });
        }

        Ok(claims)
    }

    /// Verify a token and return only its subject
    pub fn subject(
        &self,
        token: &str,
        expected_scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.verify(token, expected_scope, now).map(|claims| claims.sub)
    }
}
