// src/handlers/quizmaster.rs

use axum::{
    Extension, Form, Json,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        answer::parse_score_assignments,
        question::{Question, QuestionDraft},
        quiz::{AcceptingForm, AddQuizmasterForm, NewQuizForm, UpdateQuizForm},
        user::User,
    },
    state::AppState,
    utils::{form::FormFields, html::clean_html},
};

/// Lists live quizzes, flagging the ones the caller may edit.
pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = state.quizzes.list_for(&user).await?;
    Ok(Json(quizzes))
}

/// Creates a quiz owned by the caller.
pub async fn new_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Form<NewQuizForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    payload.validate()?;

    let quiz = state
        .quizzes
        .create(&user, payload.title.trim(), &clean_html(&payload.description))
        .await?;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// A quiz together with its live questions.
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.access.require_write(&user, quiz_id).await?;
    let quiz = state.quizzes.get(quiz_id).await?;
    let questions = state.questions.list_for_quiz(quiz_id).await?;
    Ok(Json(json!({ "quiz": quiz, "questions": questions })))
}

pub async fn update_properties(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
    payload: Result<Form<UpdateQuizForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    payload.validate()?;
    state.access.require_write(&user, quiz_id).await?;

    state
        .quizzes
        .update_metadata(quiz_id, payload.title.trim(), &clean_html(&payload.description))
        .await?;
    Ok(StatusCode::OK)
}

pub async fn delete_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.access.require_write(&user, quiz_id).await?;
    state.quizzes.soft_delete(quiz_id).await?;
    tracing::info!("User {} deleted quiz {}", user.id, quiz_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reinstate_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.access.require_write(&user, quiz_id).await?;
    state.quizzes.reinstate(quiz_id).await?;
    Ok(StatusCode::OK)
}

/// Appends a co-quizmaster identified by user id, federated subject or email.
pub async fn add_quizmaster(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
    payload: Result<Form<AddQuizmasterForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    state.access.require_write(&user, quiz_id).await?;

    let entry = payload
        .into_profile()
        .map_err(|e| AppError::BadRequest(format!("invalid user-id: {e}")))?
        .ok_or_else(|| {
            AppError::BadRequest("need one of user-id, google-sub or google-email".to_string())
        })?;

    state.quizzes.add_quizmaster(quiz_id, entry).await?;
    Ok(StatusCode::OK)
}

/// Shows a question to participants and opens submissions for it.
pub async fn set_active(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((quiz_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    state.access.require_write(&user, quiz_id).await?;
    state.quiz_state.set_live_question(quiz_id, question_id).await?;
    Ok(StatusCode::OK)
}

pub async fn set_accepting_responses(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(quiz_id): Path<i64>,
    payload: Result<Form<AcceptingForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(payload) = payload?;
    state.access.require_write(&user, quiz_id).await?;
    state
        .quiz_state
        .set_accepting(quiz_id, payload.accepting())
        .await?;
    Ok(StatusCode::OK)
}

pub async fn new_question(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(pairs) = payload?;
    let draft = QuestionDraft::from_form(&FormFields::new(pairs))?;
    state.access.require_write(&user, draft.quiz_id).await?;

    let question = state.questions.create(&draft).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Loads a question and checks the caller may edit its quiz.
async fn writable_question(
    state: &AppState,
    user: &User,
    question_id: i64,
) -> Result<Question, AppError> {
    let question = state.questions.get(question_id).await?;
    state.access.require_write(user, question.quiz_id).await?;
    Ok(question)
}

pub async fn get_question(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = writable_question(&state, &user, question_id).await?;
    Ok(Json(question))
}

pub async fn update_question(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
    payload: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(pairs) = payload?;
    let draft = QuestionDraft::from_form(&FormFields::new(pairs))?;
    writable_question(&state, &user, question_id).await?;

    state.questions.update(question_id, &draft).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_question(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    writable_question(&state, &user, question_id).await?;
    state.questions.soft_delete(question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_all_answers(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    writable_question(&state, &user, question_id).await?;
    let answers = state.ledger.answers_for_question(question_id).await?;
    Ok(Json(answers))
}

/// Applies the grading form to the answers of one question.
pub async fn save_scores(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(question_id): Path<i64>,
    payload: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(pairs) = payload?;
    let scores = parse_score_assignments(&FormFields::new(pairs))?;
    writable_question(&state, &user, question_id).await?;

    let updated = state.ledger.assign_scores(question_id, &scores).await?;
    tracing::info!(
        "User {} updated {} scores on question {}",
        user.id,
        updated,
        question_id
    );
    Ok(Json(json!({ "updated": updated })))
}
