// src/utils/cookie.rs

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Duration, Utc};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sid";

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `Set-Cookie` value for a new session.
pub fn session_cookie(token: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Expires={}; HttpOnly; Path=/; SameSite=Strict",
        expires_at.format(HTTP_DATE)
    )
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_session_cookie(now: DateTime<Utc>) -> String {
    format!(
        "{SESSION_COOKIE}=; Expires={}; HttpOnly; Path=/; SameSite=Strict",
        (now - Duration::hours(24)).format(HTTP_DATE)
    )
}

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
