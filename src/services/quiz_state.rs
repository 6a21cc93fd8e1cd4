// src/services/quiz_state.rs

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::quiz::QuizStatus;

#[derive(Debug, Error)]
pub enum QuizStateError {
    #[error("quiz or question not found")]
    NotFound,

    #[error("quiz state storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// The live question pointer and the accepting-responses gate of a quiz.
#[derive(Clone)]
pub struct QuizState {
    pool: SqlitePool,
}

impl QuizState {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Makes `question_id` the live question and opens the gate.
    ///
    /// The membership check and the write are one conditional statement, so
    /// a question deleted concurrently can never become live.
    pub async fn set_live_question(&self, quiz_id: i64, question_id: i64) -> Result<(), QuizStateError> {
        let result = sqlx::query(
            r#"
            UPDATE quizzes
            SET live_question_id = ?, accepting_responses = TRUE, updated_at = ?
            WHERE id = ?
              AND deleted_at IS NULL
              AND EXISTS (
                  SELECT 1 FROM questions
                  WHERE id = ? AND quiz_id = ? AND deleted_at IS NULL
              )
            "#,
        )
        .bind(question_id)
        .bind(Utc::now())
        .bind(quiz_id)
        .bind(question_id)
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QuizStateError::NotFound);
        }
        tracing::info!("Quiz {} is now showing question {}", quiz_id, question_id);
        Ok(())
    }

    pub async fn set_accepting(&self, quiz_id: i64, accepting: bool) -> Result<(), QuizStateError> {
        let result = sqlx::query(
            "UPDATE quizzes SET accepting_responses = ?, updated_at = ? WHERE id = ?",
        )
        .bind(accepting)
        .bind(Utc::now())
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QuizStateError::NotFound);
        }
        Ok(())
    }

    pub async fn is_accepting(&self, quiz_id: i64) -> Result<bool, QuizStateError> {
        Ok(self.status(quiz_id).await?.accepting_responses)
    }

    pub async fn status(&self, quiz_id: i64) -> Result<QuizStatus, QuizStateError> {
        sqlx::query_as::<_, QuizStatus>(
            "SELECT live_question_id AS question_id, accepting_responses FROM quizzes WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(QuizStateError::NotFound)
    }
}
