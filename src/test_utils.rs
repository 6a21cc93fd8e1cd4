// src/test_utils.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use sqlx::SqlitePool;

use crate::{
    auth::key_cache::{KeyCache, KeyCacheError, KeyFetcher, keys_from_jwks},
    models::signing_key::SigningKey,
};

#[path = "../tests/fixtures/keys.rs"]
mod keys;

#[allow(unused_imports)]
pub use keys::*;

/// Serves the fixture JWKS, fresh for an hour from each fetch.
pub struct FixtureKeyFetcher;

#[async_trait]
impl KeyFetcher for FixtureKeyFetcher {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
        let set: JwkSet =
            serde_json::from_str(JWKS).map_err(|e| KeyCacheError::Fetch(e.to_string()))?;
        Ok(keys_from_jwks(&set, Utc::now() + chrono::Duration::hours(1)))
    }
}

pub fn fixture_key_cache(pool: SqlitePool) -> KeyCache {
    KeyCache::new(pool, Arc::new(FixtureKeyFetcher))
}
