// src/auth/middleware.rs

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    auth::session::SessionStore,
    error::AppError,
    utils::cookie::{SESSION_COOKIE, read_cookie},
};

/// Axum Middleware: Session.
///
/// Resolves the `sid` cookie to a `User` and injects it into the request
/// extensions. A missing, unknown or expired session is a 401.
pub async fn session_middleware(
    State(sessions): State<SessionStore>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = read_cookie(req.headers(), SESSION_COOKIE).ok_or_else(|| {
        AppError::AuthError("cookie error, please logout and then login again".to_string())
    })?;

    let user = sessions.resolve(&token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
