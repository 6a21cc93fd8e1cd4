// src/error.rs

use axum::{
    Json,
    extract::rejection::FormRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{
    auth::{access::AccessError, identity::IdentityError, session::SessionError},
    services::{
        answer_ledger::LedgerError, questions::QuestionError, quiz_state::QuizStateError,
        quizzes::QuizError,
    },
    utils::form::FormError,
};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized (no valid session or failed login)
    AuthError(String),

    // 403 Forbidden (logged in, but not allowed)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., quiz not accepting responses)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<FormError> for AppError {
    fn from(err: FormError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<FormRejection> for AppError {
    fn from(err: FormRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound | SessionError::Expired => AppError::AuthError(
                "cookie error, please logout and then login again".to_string(),
            ),
            SessionError::Storage(e) => e.into(),
        }
    }
}

/// Every verification failure is a 401; only infrastructure trouble is a 500.
impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::KeyFetch(e) => AppError::InternalServerError(e.to_string()),
            IdentityError::Storage(e) => e.into(),
            other => AppError::AuthError(format!("oauth login failed: {other}")),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied => AppError::Forbidden("no write privileges".to_string()),
            AccessError::Storage(e) => e.into(),
        }
    }
}

impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::NotFound => AppError::NotFound("quiz not found".to_string()),
            QuizError::Storage(e) => e.into(),
        }
    }
}

impl From<QuestionError> for AppError {
    fn from(err: QuestionError) -> Self {
        match err {
            QuestionError::NotFound => AppError::NotFound("question not found".to_string()),
            QuestionError::QuizChanged => AppError::BadRequest(err.to_string()),
            QuestionError::Storage(e) => e.into(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => AppError::NotFound("answer not found".to_string()),
            LedgerError::Unauthorized => {
                AppError::Forbidden("answer belongs to another user".to_string())
            }
            LedgerError::Storage(e) => e.into(),
        }
    }
}

impl From<QuizStateError> for AppError {
    fn from(err: QuizStateError) -> Self {
        match err {
            QuizStateError::NotFound => {
                AppError::NotFound("quiz or question not found".to_string())
            }
            QuizStateError::Storage(e) => e.into(),
        }
    }
}
