// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use quizdrum::{
    auth::key_cache::{KeyCacheError, KeyFetcher, keys_from_jwks},
    config::Config,
    db, models::signing_key::SigningKey, routes,
    state::AppState,
};
use reqwest::{Response, header};
use serde_json::Value;

#[path = "../fixtures/keys.rs"]
mod keys;

pub use keys::*;

/// Serves the fixture key set in place of the identity provider.
pub struct FixtureKeyFetcher;

#[async_trait]
impl KeyFetcher for FixtureKeyFetcher {
    async fn fetch(&self) -> Result<Vec<SigningKey>, KeyCacheError> {
        let set: JwkSet =
            serde_json::from_str(JWKS).map_err(|e| KeyCacheError::Fetch(e.to_string()))?;
        Ok(keys_from_jwks(&set, Utc::now() + chrono::Duration::hours(1)))
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port against a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");

    let config = Config::for_tests(CLIENT_ID);
    let state = AppState::new(pool, config, Arc::new(FixtureKeyFetcher));
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

/// `sid=<token>` taken from a login response, ready for a `Cookie` header.
pub fn session_cookie_of(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login response sets a cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Logs in a fresh guest. Returns the session cookie and the user id.
    pub async fn guest_login(&self) -> (String, i64) {
        let response = self
            .client
            .post(self.url("/api/common/guest-login"))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);
        let cookie = session_cookie_of(&response);
        let body: Value = response.json().await.unwrap();
        (cookie, body["user_id"].as_i64().unwrap())
    }

    pub async fn oauth_login(&self, assertion: &str) -> Response {
        self.client
            .post(self.url("/api/common/oauth-login"))
            .form(&[("idtoken", assertion)])
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, cookie: &str, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header(header::COOKIE, cookie)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_form(&self, cookie: &str, path: &str, form: &[(&str, &str)]) -> Response {
        self.client
            .post(self.url(path))
            .header(header::COOKIE, cookie)
            .form(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_form(&self, cookie: &str, path: &str, form: &[(&str, &str)]) -> Response {
        self.client
            .put(self.url(path))
            .header(header::COOKIE, cookie)
            .form(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a quiz as `cookie`'s user and returns its id.
    pub async fn create_quiz(&self, cookie: &str, title: &str) -> i64 {
        let response = self
            .post_form(
                cookie,
                "/api/quizmaster/newquiz",
                &[("quiz-title", title), ("quiz-descr", "<p>fun</p>")],
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    /// Adds a text question to `quiz_id` and returns its id.
    pub async fn create_text_question(&self, cookie: &str, quiz_id: i64, title: &str) -> i64 {
        let quiz_id = quiz_id.to_string();
        let response = self
            .post_form(
                cookie,
                "/api/quizmaster/question/new",
                &[
                    ("quiz-id", quiz_id.as_str()),
                    ("qn-title", title),
                    ("qn-body", ""),
                    ("qn-type", "text"),
                ],
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }
}
