// src/models/signing_key.rs

use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use serde::Serialize;
use sqlx::FromRow;

/// A public RSA signing key published by the identity provider.
/// Represents one row of the 'signing_keys' table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SigningKey {
    /// Key id, matched against the `kid` header of an assertion.
    pub kid: String,
    pub algorithm: String,
    /// Base64url modulus, as published in the JWKS document.
    pub modulus: String,
    /// Base64url public exponent.
    pub exponent: String,
    pub expires_at: DateTime<Utc>,
}

impl SigningKey {
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_components(&self.modulus, &self.exponent)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
