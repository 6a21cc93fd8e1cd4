// tests/fixtures/keys.rs

//! RSA fixtures and id-token minting shared by the unit tests in `src/` and
//! the integration tests in `tests/`.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const CLIENT_ID: &str = "quizdrum-test-client";
/// `kid` of the key published in `JWKS`.
pub const KEY_ID: &str = "test-key-1";
pub const SIGNING_KEY_PEM: &str = include_str!("signing_key.pem");
/// A key the provider never published.
pub const ROGUE_KEY_PEM: &str = include_str!("rogue_key.pem");
pub const JWKS: &str = include_str!("signing_key.jwk.json");

/// Claims of a valid id token for `CLIENT_ID`.
pub fn id_token_claims(subject: &str, email: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": "https://accounts.google.com",
        "aud": CLIENT_ID,
        "sub": subject,
        "email": email,
        "email_verified": true,
        "name": "Test User",
        "iat": now,
        "exp": now + 600,
    })
}

pub fn mint_assertion(claims: &Value, kid: Option<&str>, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}
