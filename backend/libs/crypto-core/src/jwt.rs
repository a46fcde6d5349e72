//! Bearer token verification for chat services
//!
//! A [`TokenVerifier`] is built once at startup from configuration and shared
//! (behind an `Arc`) by every component that authenticates callers: the
//! WebSocket identity gate and the HTTP auth middleware.
//!
//! Two algorithms are supported:
//! - **HS256** with a shared secret (`JWT_SECRET`), matching the token issuer
//!   of the main backend
//! - **RS256** with a PEM public key (`JWT_PUBLIC_KEY_PEM`) for deployments
//!   where the issuer signs with a private RSA key
//!
//! The verifier never falls back from one algorithm to the other.
//!
//! ```ignore
//! let verifier = TokenVerifier::hs256(b"secret");
//! let user_id = verifier.user_id(token)?;
//! ```
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT claims issued by the identity service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("invalid token payload")]
    MalformedSubject,

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Validates bearer tokens and resolves them to user IDs
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// HS256 verifier backed by a shared secret
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// RS256 verifier backed by a PEM-encoded RSA public key
    pub fn rs256_pem(public_key_pem: &str) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("failed to parse RSA public key: {e}")))?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        Self { key, validation }
    }

    /// Verify signature and expiry, returning the decoded claims
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => {
                    tracing::debug!(error = %e, "JWT validation failed");
                    JwtError::Invalid(e.to_string())
                }
            })
    }

    /// Verify the token and parse its subject as a user ID
    pub fn user_id(&self, token: &str) -> Result<Uuid, JwtError> {
        let claims = self.verify(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| JwtError::MalformedSubject)
    }
}

/// Issues tokens. Production tokens come from the identity service; this is
/// used by tests and local tooling.
pub struct TokenSigner {
    key: EncodingKey,
    algorithm: Algorithm,
}

impl TokenSigner {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    pub fn rs256_pem(private_key_pem: &str) -> Result<Self, JwtError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("failed to parse RSA private key: {e}")))?;
        Ok(Self {
            key,
            algorithm: Algorithm::RS256,
        })
    }

    /// Sign an access token for `user_id` valid for `ttl`
    pub fn sign(&self, user_id: Uuid, ttl: Duration) -> Result<String, JwtError> {
        self.sign_subject(&user_id.to_string(), ttl)
    }

    /// Sign a token with an arbitrary subject (negative `ttl` yields an expired token)
    pub fn sign_subject(&self, subject: &str, ttl: Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type: Some("access".to_string()),
            email: None,
        };

        encode(&Header::new(self.algorithm), &claims, &self.key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }
}
