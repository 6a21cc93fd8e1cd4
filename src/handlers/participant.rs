// src/handlers/participant.rs

use axum::{
    Extension, Form, Json,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{answer::AnswerSubmission, quiz::ProfileForm, user::User},
    state::AppState,
    utils::form::FormFields,
};

/// Registers the caller in a quiz under a display name.
pub async fn set_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Form<ProfileForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    payload.validate()?;

    state
        .quizzes
        .register_participant(payload.quiz_id, user.id, payload.profile_name.trim())
        .await?;
    Ok(StatusCode::OK)
}

/// Records the caller's answer to the live quiz question.
///
/// The quiz must be accepting responses, the question must be a live member
/// of the quiz, and the answer must fit the question's kind.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(pairs) = payload?;
    let submission = AnswerSubmission::from_form(&FormFields::new(pairs))?;

    if !state.quiz_state.is_accepting(submission.quiz_id).await? {
        return Err(AppError::Conflict(
            "quiz is not accepting responses".to_string(),
        ));
    }

    let question = state
        .questions
        .get_in_quiz(submission.quiz_id, submission.question_id)
        .await?;
    submission
        .value
        .check_against(&question)
        .map_err(AppError::BadRequest)?;

    let now = Utc::now();
    let answer_id = match submission.answer_id {
        Some(answer_id) => {
            let existing = state.ledger.get(answer_id).await?;
            if existing.is_some_and(|answer| answer.question_id != question.id) {
                return Err(AppError::BadRequest(
                    "ans-id does not belong to qn-id".to_string(),
                ));
            }
            state
                .ledger
                .submit_update(answer_id, user.id, &submission.value, now)
                .await?;
            answer_id
        }
        None => {
            state
                .ledger
                .submit(question.id, user.id, &submission.value, now)
                .await?
        }
    };

    Ok(Json(json!({ "answer_id": answer_id })))
}

/// Which question is live and whether submissions are open. Needs no session.
pub async fn get_status(
    State(state): State<AppState>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.quiz_state.status(quiz_id).await?;
    Ok(Json(status))
}
