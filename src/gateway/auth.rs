//! Bearer credential issue and validation.
//!
//! Credentials are HS256 JSON Web Tokens. The header names the signing key
//! (`kid`) so keys can be rotated while older tokens stay verifiable.

use crate::gateway::ports::TtlKeyStoreRef;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const REVOKED_PREFIX: &str = "revoked:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("malformed credential")]
    Malformed,
    #[error("credential signed with unknown key")]
    UnknownKey,
    #[error("invalid credential signature")]
    BadSignature,
    #[error("credential has expired")]
    Expired,
    #[error("credential has been revoked")]
    Revoked,
    #[error("unauthorized")]
    NotOwner,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::Malformed => "malformed_credential",
            AuthError::UnknownKey => "unknown_key",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "credential_expired",
            AuthError::Revoked => "credential_revoked",
            AuthError::NotOwner => "not_owner",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::Expired,
            JwtErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::Malformed,
        }
    }
}

/// HMAC secret identified by `kid`.
#[derive(Clone, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    pub secret: String,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            secret: secret.into(),
        }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.as_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Token claims. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub claims: Claims,
}

/// Issues, validates and revokes bearer credentials.
pub struct AuthGuard {
    keys: Vec<SigningKey>,
    token_ttl: Duration,
    revocations: TtlKeyStoreRef,
    validation: Validation,
}

impl AuthGuard {
    /// The first key signs new tokens; every key verifies.
    pub fn new(keys: Vec<SigningKey>, token_ttl: Duration, revocations: TtlKeyStoreRef) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            keys,
            token_ttl,
            revocations,
            validation,
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp: iat.saturating_add(self.token_ttl.as_secs() as i64),
            jti: format!("{:032x}", rand::random::<u128>()),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self.keys.first().ok_or(AuthError::UnknownKey)?;
        let header = Header {
            kid: Some(key.kid.clone()),
            ..Header::new(Algorithm::HS256)
        };
        Ok(jsonwebtoken::encode(&header, claims, &key.encoding_key())?)
    }

    /// Validates an `Authorization` value: `Bearer <token>` or a bare token.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = extract_token(authorization).ok_or(AuthError::MissingCredential)?;
        let claims = self.verify(token).inspect_err(|err| {
            debug!(error = %err, "credential rejected");
        })?;

        if self
            .revocations
            .contains(&format!("{REVOKED_PREFIX}{}", claims.jti))
            .await
        {
            debug!(username = %claims.sub, "revoked credential presented");
            return Err(AuthError::Revoked);
        }

        Ok(Principal {
            username: claims.sub.clone(),
            claims,
        })
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header.kid.ok_or(AuthError::UnknownKey)?;
        let key = self
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or(AuthError::UnknownKey)?;

        let data = jsonwebtoken::decode::<Claims>(token, &key.decoding_key(), &self.validation)?;
        Ok(data.claims)
    }

    /// Revokes the principal's credential until it would have expired anyway.
    pub async fn revoke(&self, principal: &Principal) {
        let remaining = principal.claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return;
        }
        self.revocations
            .insert_if_absent(
                &format!("{REVOKED_PREFIX}{}", principal.claims.jti),
                Duration::from_secs(remaining as u64),
            )
            .await;
        info!(username = %principal.username, "credential revoked");
    }

    /// Revocations are only needed until the token expires on its own.
    pub async fn purge_revocations(&self) -> usize {
        self.revocations.purge_expired(Duration::ZERO).await
    }
}

fn extract_token(authorization: Option<&str>) -> Option<&str> {
    let raw = authorization?.trim();
    if raw.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim();
    (!token.is_empty()).then_some(token)
}
