// src/auth/key_cache.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet, KeyAlgorithm};
use reqwest::header::{CACHE_CONTROL, EXPIRES, HeaderMap};
use sqlx::SqlitePool;
use thiserror::Error;
use url::Url;

use crate::models::signing_key::SigningKey;

#[derive(Debug, Error)]
pub enum KeyCacheError {
    #[error("failed to fetch signing keys: {0}")]
    Fetch(String),

    #[error("signing key storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<reqwest::Error> for KeyCacheError {
    fn from(err: reqwest::Error) -> Self {
        KeyCacheError::Fetch(err.to_string())
    }
}

/// Source of the identity provider's published keys.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetches the current key set, each key stamped with the instant the
    /// set stops being fresh.
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyCacheError>;
}

/// Fetches a JWKS document over HTTP.
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpKeyFetcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, KeyCacheError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
        let fetched_at = Utc::now();
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;

        let expires_at = freshness_deadline(response.headers(), fetched_at)?;
        let set: JwkSet = response.json().await?;
        Ok(keys_from_jwks(&set, expires_at))
    }
}

/// Works out when a fetched key set goes stale.
///
/// `Cache-Control: max-age` counts from `fetched_at` and wins over `Expires`.
/// A response with neither is rejected, as it could never be refreshed.
pub fn freshness_deadline(
    headers: &HeaderMap,
    fetched_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, KeyCacheError> {
    let max_age = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|directive| {
            directive
                .trim()
                .strip_prefix("max-age=")
                .and_then(|secs| secs.trim_matches('"').parse::<i64>().ok())
        });
    if let Some(secs) = max_age {
        return chrono::Duration::try_seconds(secs.max(0))
            .and_then(|age| fetched_at.checked_add_signed(age))
            .ok_or_else(|| KeyCacheError::Fetch(format!("max-age {secs} is out of range")));
    }

    let expires = headers
        .get(EXPIRES)
        .ok_or_else(|| KeyCacheError::Fetch("response has no freshness headers".to_string()))?
        .to_str()
        .map_err(|e| KeyCacheError::Fetch(e.to_string()))?;

    DateTime::parse_from_rfc2822(expires)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| KeyCacheError::Fetch(format!("bad Expires header {expires:?}: {e}")))
}

/// Keeps the RSA keys of a JWKS document that carry a key id and are usable
/// with RS256. A key without an `alg` is assumed to be RS256.
pub fn keys_from_jwks(set: &JwkSet, expires_at: DateTime<Utc>) -> Vec<SigningKey> {
    set.keys
        .iter()
        .filter_map(|jwk| {
            let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
                return None;
            };
            if jwk
                .common
                .key_algorithm
                .is_some_and(|alg| alg != KeyAlgorithm::RS256)
            {
                return None;
            }
            let kid = jwk.common.key_id.clone()?;
            Some(SigningKey {
                kid,
                algorithm: "RS256".to_string(),
                modulus: rsa.n.clone(),
                exponent: rsa.e.clone(),
                expires_at,
            })
        })
        .collect()
}

/// Store-backed cache of the provider's signing keys.
///
/// The whole set is replaced on refresh and never patched.
#[derive(Clone)]
pub struct KeyCache {
    pool: SqlitePool,
    fetcher: Arc<dyn KeyFetcher>,
}

impl KeyCache {
    pub fn new(pool: SqlitePool, fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self { pool, fetcher }
    }

    /// Returns the cached keys while all of them are fresh, otherwise clears
    /// the cache and fetches a new set. Stale keys are never returned.
    pub async fn get_usable_keys(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
        let cached = match self.load().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Failed to read cached signing keys, refetching: {}", e);
                Vec::new()
            }
        };

        let now = Utc::now();
        if !cached.is_empty() && cached.iter().all(|key| !key.is_expired_at(now)) {
            return Ok(cached);
        }
        self.refresh().await
    }

    /// Finds the usable key with id `kid`.
    pub async fn key_for(&self, kid: &str) -> Result<Option<SigningKey>, KeyCacheError> {
        let keys = self.get_usable_keys().await?;
        Ok(keys.into_iter().find(|key| key.kid == kid))
    }

    /// Drops every cached key.
    pub async fn invalidate(&self) -> Result<(), KeyCacheError> {
        sqlx::query("DELETE FROM signing_keys")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetches a fresh set regardless of the cached one. Writing the set
    /// back is best effort; the fetched keys are returned either way.
    pub async fn refresh(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
        if let Err(e) = self.invalidate().await {
            tracing::warn!("Failed to clear signing key cache: {}", e);
        }

        let keys = self.fetcher.fetch().await?;
        if keys.is_empty() {
            return Err(KeyCacheError::Fetch(
                "provider published no usable RSA keys".to_string(),
            ));
        }
        tracing::info!("Fetched {} signing keys from identity provider", keys.len());

        if let Err(e) = self.store(&keys).await {
            tracing::warn!("Failed to cache signing keys: {}", e);
        }
        Ok(keys)
    }

    async fn load(&self) -> Result<Vec<SigningKey>, sqlx::Error> {
        sqlx::query_as::<_, SigningKey>(
            "SELECT kid, algorithm, modulus, exponent, expires_at FROM signing_keys ORDER BY expires_at",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn store(&self, keys: &[SigningKey]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM signing_keys")
            .execute(&mut *tx)
            .await?;
        for key in keys {
            sqlx::query(
                "INSERT INTO signing_keys (kid, algorithm, modulus, exponent, expires_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&key.kid)
            .bind(&key.algorithm)
            .bind(&key.modulus)
            .bind(&key.exponent)
            .bind(key.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{Router, http::StatusCode, routing::get};
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::{
        db::connect_in_memory,
        test_utils::{JWKS, KEY_ID},
    };

    /// Serves a configurable key set and counts calls.
    struct FakeFetcher {
        keys: Mutex<Option<Vec<SigningKey>>>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn serving(keys: Option<Vec<SigningKey>>) -> Arc<Self> {
            Arc::new(Self {
                keys: Mutex::new(keys),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, keys: Option<Vec<SigningKey>>) {
            *self.keys.lock().unwrap() = keys;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeyFetcher for FakeFetcher {
        async fn fetch(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| KeyCacheError::Fetch("provider unreachable".to_string()))
        }
    }

    fn key(kid: &str, expires_at: DateTime<Utc>) -> SigningKey {
        SigningKey {
            kid: kid.to_string(),
            algorithm: "RS256".to_string(),
            modulus: "bW9kdWx1cw".to_string(),
            exponent: "AQAB".to_string(),
            expires_at,
        }
    }

    fn in_an_hour() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn empty_cache_fetches_then_serves_from_store() {
        let pool = connect_in_memory().await.unwrap();
        let fetcher = FakeFetcher::serving(Some(vec![key("a", in_an_hour()), key("b", in_an_hour())]));
        let cache = KeyCache::new(pool, fetcher.clone());

        assert_eq!(cache.get_usable_keys().await.unwrap().len(), 2);
        assert_eq!(cache.get_usable_keys().await.unwrap().len(), 2);
        assert_eq!(fetcher.calls(), 1);

        assert_eq!(cache.key_for("b").await.unwrap().unwrap().kid, "b");
        assert!(cache.key_for("zzz").await.unwrap().is_none());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_cache_with_failing_fetch_returns_error_not_stale_keys() {
        let pool = connect_in_memory().await.unwrap();
        let expired = Utc::now() - chrono::Duration::minutes(1);
        let fetcher = FakeFetcher::serving(Some(vec![key("old", expired)]));
        let cache = KeyCache::new(pool.clone(), fetcher.clone());

        // Seed the store with an already expired set.
        cache.refresh().await.unwrap();
        fetcher.set(None);

        let err = cache.get_usable_keys().await.unwrap_err();
        assert!(matches!(err, KeyCacheError::Fetch(_)));

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signing_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn expired_cache_is_replaced_wholesale() {
        let pool = connect_in_memory().await.unwrap();
        let expired = Utc::now() - chrono::Duration::minutes(1);
        let fetcher = FakeFetcher::serving(Some(vec![key("old", expired), key("older", expired)]));
        let cache = KeyCache::new(pool, fetcher.clone());
        cache.refresh().await.unwrap();

        fetcher.set(Some(vec![key("new", in_an_hour())]));
        let keys = cache.get_usable_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, "new");
        assert!(cache.key_for("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_back_still_returns_fetched_keys() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("DROP TABLE signing_keys")
            .execute(&pool)
            .await
            .unwrap();
        let fetcher = FakeFetcher::serving(Some(vec![key("a", in_an_hour())]));
        let cache = KeyCache::new(pool, fetcher.clone());

        let keys = cache.get_usable_keys().await.unwrap();
        assert_eq!(keys[0].kid, "a");
        assert!(cache.invalidate().await.is_err());
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let pool = connect_in_memory().await.unwrap();
        let fetcher = FakeFetcher::serving(Some(vec![key("a", in_an_hour())]));
        let cache = KeyCache::new(pool, fetcher.clone());

        cache.get_usable_keys().await.unwrap();
        cache.invalidate().await.unwrap();
        cache.get_usable_keys().await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn empty_key_set_is_a_fetch_error() {
        let pool = connect_in_memory().await.unwrap();
        let cache = KeyCache::new(pool, FakeFetcher::serving(Some(Vec::new())));
        assert!(matches!(
            cache.get_usable_keys().await,
            Err(KeyCacheError::Fetch(_))
        ));
    }

    #[test]
    fn max_age_wins_over_expires() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=19845, must-revalidate"));
        headers.insert(EXPIRES, HeaderValue::from_static("Thu, 01 Dec 1994 16:00:00 GMT"));
        assert_eq!(
            freshness_deadline(&headers, now).unwrap(),
            now + chrono::Duration::seconds(19845)
        );
    }

    #[test]
    fn out_of_range_max_age_is_a_fetch_error() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=9223372036854775807"));
        assert!(matches!(
            freshness_deadline(&headers, Utc::now()),
            Err(KeyCacheError::Fetch(_))
        ));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=1000000000000000"));
        assert!(matches!(
            freshness_deadline(&headers, Utc::now()),
            Err(KeyCacheError::Fetch(_))
        ));
    }

    #[test]
    fn expires_is_used_without_max_age() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public"));
        headers.insert(EXPIRES, HeaderValue::from_static("Thu, 01 Dec 1994 16:00:00 GMT"));
        let deadline = freshness_deadline(&headers, Utc::now()).unwrap();
        assert_eq!(deadline.to_rfc3339(), "1994-12-01T16:00:00+00:00");
    }

    #[test]
    fn missing_freshness_headers_is_an_error() {
        assert!(freshness_deadline(&HeaderMap::new(), Utc::now()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(EXPIRES, HeaderValue::from_static("soon"));
        assert!(freshness_deadline(&headers, Utc::now()).is_err());
    }

    #[test]
    fn only_rsa_keys_with_ids_are_kept() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                {"kty": "RSA", "use": "sig", "alg": "RS256", "kid": "k1", "n": "bW9k", "e": "AQAB"},
                {"kty": "RSA", "use": "sig", "alg": "RS256", "n": "bW9k", "e": "AQAB"},
                {"kty": "EC", "crv": "P-256", "kid": "ec",
                 "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                 "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"}
            ]
        }))
        .unwrap();
        let keys = keys_from_jwks(&set, in_an_hour());
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, "k1");
        assert_eq!(keys[0].algorithm, "RS256");
        assert_eq!(keys[0].exponent, "AQAB");
    }

    #[test]
    fn keys_for_other_algorithms_are_skipped() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                {"kty": "RSA", "alg": "RS512", "kid": "rs512", "n": "bW9k", "e": "AQAB"},
                {"kty": "RSA", "alg": "PS256", "kid": "ps256", "n": "bW9k", "e": "AQAB"},
                {"kty": "RSA", "kid": "no-alg", "n": "bW9k", "e": "AQAB"}
            ]
        }))
        .unwrap();
        let keys = keys_from_jwks(&set, in_an_hour());
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, "no-alg");
        assert_eq!(keys[0].algorithm, "RS256");
    }

    /// Local stand-in for the provider's certs endpoint.
    async fn spawn_certs_server() -> Url {
        let app = Router::new()
            .route(
                "/certs",
                get(|| async { ([(CACHE_CONTROL, "public, max-age=3600")], JWKS) }),
            )
            .route(
                "/broken",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    ([(CACHE_CONTROL, "max-age=60")], JWKS)
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn http_fetcher_reads_keys_and_max_age() {
        let base = spawn_certs_server().await;
        let fetcher = HttpKeyFetcher::new(base.join("certs").unwrap(), Duration::from_secs(5)).unwrap();

        let before = Utc::now();
        let keys = fetcher.fetch().await.unwrap();
        let after = Utc::now();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, KEY_ID);
        assert!(keys[0].expires_at >= before + chrono::Duration::seconds(3600));
        assert!(keys[0].expires_at <= after + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn http_fetcher_treats_error_status_as_fetch_error() {
        let base = spawn_certs_server().await;
        let fetcher = HttpKeyFetcher::new(base.join("broken").unwrap(), Duration::from_secs(5)).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(KeyCacheError::Fetch(_))));
    }

    #[tokio::test]
    async fn http_fetcher_times_out_as_fetch_error() {
        let base = spawn_certs_server().await;
        let fetcher =
            HttpKeyFetcher::new(base.join("slow").unwrap(), Duration::from_millis(100)).unwrap();
        assert!(matches!(fetcher.fetch().await, Err(KeyCacheError::Fetch(_))));
    }
}
