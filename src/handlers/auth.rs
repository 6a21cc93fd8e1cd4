// src/handlers/auth.rs

use axum::{
    Extension, Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{
        identity::IdentityResolver,
        session::{FEDERATED_SESSION_DAYS, GUEST_SESSION_DAYS, SessionStore},
    },
    error::AppError,
    models::user::User,
    utils::cookie::{SESSION_COOKIE, expired_session_cookie, read_cookie, session_cookie},
};

#[derive(Debug, Deserialize)]
pub struct OauthLoginForm {
    #[serde(default)]
    pub idtoken: String,
}

/// Creates an anonymous user with a 30 day session.
pub async fn guest_login(
    State(sessions): State<SessionStore>,
) -> Result<impl IntoResponse, AppError> {
    let issued = sessions
        .create_guest_session(Duration::days(GUEST_SESSION_DAYS))
        .await?;
    tracing::info!("Guest user {} logged in", issued.user_id);

    Ok((
        [(header::SET_COOKIE, session_cookie(&issued.token, issued.expires_at))],
        Json(json!({ "user_id": issued.user_id })),
    ))
}

/// Verifies a signed identity assertion and opens a 60 day session for the
/// matching (possibly new) user.
pub async fn oauth_login(
    State(identity): State<IdentityResolver>,
    State(sessions): State<SessionStore>,
    payload: Result<Form<OauthLoginForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    if payload.idtoken.trim().is_empty() {
        return Err(AppError::BadRequest("missing idtoken".to_string()));
    }

    let user = identity.resolve_from_assertion(payload.idtoken.trim()).await?;
    let expires_at = Utc::now() + Duration::days(FEDERATED_SESSION_DAYS);
    let token = sessions.create_session_for_user(user.id, expires_at).await?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, expires_at))],
        Json(user),
    ))
}

/// Always clears the cookie. Removing the session row is best effort.
pub async fn logout(
    State(sessions): State<SessionStore>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = read_cookie(&headers, SESSION_COOKIE) {
        if let Err(e) = sessions.delete(&token).await {
            tracing::warn!("Failed to delete session on logout: {}", e);
        }
    }

    (
        [(header::SET_COOKIE, expired_session_cookie(Utc::now()))],
        Json(json!({ "message": "logged out" })),
    )
}

pub async fn whoami(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}
