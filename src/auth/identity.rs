// src/auth/identity.rs

use chrono::Utc;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header, errors::ErrorKind};
use serde::Deserialize;
use sqlx::{SqlitePool, types::Json};
use thiserror::Error;

use crate::{
    auth::key_cache::{KeyCache, KeyCacheError},
    models::user::{FederatedIdentity, User},
};

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
const LEEWAY_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed identity assertion: {0}")]
    MalformedAssertion(String),

    #[error("assertion signed with unknown key {0}")]
    UnknownSigningKey(String),

    #[error("assertion signature is invalid")]
    SignatureInvalid,

    #[error("assertion was issued for another client")]
    AudienceMismatch,

    #[error("assertion was issued by an untrusted issuer")]
    IssuerMismatch,

    #[error("assertion has expired")]
    AssertionExpired,

    #[error(transparent)]
    KeyFetch(#[from] KeyCacheError),

    #[error("user storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidRsaKey(_) => {
                IdentityError::SignatureInvalid
            }
            ErrorKind::InvalidAudience => IdentityError::AudienceMismatch,
            ErrorKind::InvalidIssuer => IdentityError::IssuerMismatch,
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                IdentityError::AudienceMismatch
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
                IdentityError::IssuerMismatch
            }
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                IdentityError::AssertionExpired
            }
            _ => IdentityError::MalformedAssertion(err.to_string()),
        }
    }
}

/// Claims of an OpenID Connect id token that end up in the user profile.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    hd: Option<String>,
}

impl From<IdTokenClaims> for FederatedIdentity {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            picture: claims.picture,
            hosted_domain: claims.hd,
        }
    }
}

/// Turns signed identity assertions into local users.
#[derive(Clone)]
pub struct IdentityResolver {
    pool: SqlitePool,
    keys: KeyCache,
    client_id: String,
    issuers: Vec<String>,
}

impl IdentityResolver {
    pub fn new(pool: SqlitePool, keys: KeyCache, client_id: String, issuers: Vec<String>) -> Self {
        Self {
            pool,
            keys,
            client_id,
            issuers,
        }
    }

    /// Verifies `assertion` and returns the user it identifies, creating the
    /// user on first login and refreshing the stored profile otherwise.
    ///
    /// Does not create a session.
    pub async fn resolve_from_assertion(&self, assertion: &str) -> Result<User, IdentityError> {
        let identity = self.verify(assertion).await?;
        self.upsert(identity).await
    }

    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, IdentityError> {
        if assertion.is_empty() {
            return Err(IdentityError::MalformedAssertion("empty assertion".to_string()));
        }

        let header = decode_header(assertion)
            .map_err(|e| IdentityError::MalformedAssertion(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::MalformedAssertion("missing kid".to_string()))?;

        let key = self
            .keys
            .key_for(&kid)
            .await?
            .ok_or(IdentityError::UnknownSigningKey(kid))?;

        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::SignatureInvalid);
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&self.issuers);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.leeway = LEEWAY_SECS;

        let data = decode::<IdTokenClaims>(assertion, &key.decoding_key()?, &validation)?;
        Ok(data.claims.into())
    }

    async fn upsert(&self, identity: FederatedIdentity) -> Result<User, IdentityError> {
        let now = Utc::now();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (federated_subject, profile, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(federated_subject) DO UPDATE SET
                profile = excluded.profile,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&identity.subject)
        .bind(Json(&identity))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Federated login for user {}", id);

        Ok(User {
            id,
            federated: Some(identity),
        })
    }
}
