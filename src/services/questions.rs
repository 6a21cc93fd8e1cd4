// src/services/questions.rs

use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use thiserror::Error;

use crate::models::question::{Question, QuestionDraft};

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("question not found")]
    NotFound,

    #[error("a question cannot be moved to another quiz")]
    QuizChanged,

    #[error("question storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct QuestionService {
    pool: SqlitePool,
}

impl QuestionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Adds a question to a live quiz. `NotFound` when the quiz is missing
    /// or soft-deleted.
    pub async fn create(&self, draft: &QuestionDraft) -> Result<Question, QuestionError> {
        let now = Utc::now();
        sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (quiz_id, title, html_body, kind, choices, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM quizzes WHERE id = ? AND deleted_at IS NULL)
            RETURNING *
            "#,
        )
        .bind(draft.quiz_id)
        .bind(&draft.title)
        .bind(&draft.html_body)
        .bind(draft.kind)
        .bind(Json(&draft.choices))
        .bind(now)
        .bind(now)
        .bind(draft.quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(QuestionError::NotFound)
    }

    /// Fetches a question, including soft-deleted ones.
    pub async fn get(&self, question_id: i64) -> Result<Question, QuestionError> {
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QuestionError::NotFound)
    }

    /// Fetches a question only if it is live and belongs to `quiz_id`.
    pub async fn get_in_quiz(&self, quiz_id: i64, question_id: i64) -> Result<Question, QuestionError> {
        sqlx::query_as::<_, Question>(
            "SELECT * FROM questions WHERE id = ? AND quiz_id = ? AND deleted_at IS NULL",
        )
        .bind(question_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(QuestionError::NotFound)
    }

    /// Live questions of a quiz in creation order.
    pub async fn list_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>, QuestionError> {
        Ok(sqlx::query_as::<_, Question>(
            "SELECT * FROM questions WHERE quiz_id = ? AND deleted_at IS NULL ORDER BY id",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Replaces the contents of a live question. The draft's quiz id must
    /// be the question's current quiz.
    pub async fn update(&self, question_id: i64, draft: &QuestionDraft) -> Result<(), QuestionError> {
        let result = sqlx::query(
            r#"
            UPDATE questions
            SET title = ?, html_body = ?, kind = ?, choices = ?, updated_at = ?
            WHERE id = ? AND quiz_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.html_body)
        .bind(draft.kind)
        .bind(Json(&draft.choices))
        .bind(Utc::now())
        .bind(question_id)
        .bind(draft.quiz_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.get(question_id).await?;
            if existing.quiz_id != draft.quiz_id {
                return Err(QuestionError::QuizChanged);
            }
            return Err(QuestionError::NotFound);
        }
        Ok(())
    }

    /// Soft-deletes a question. If it was live, its quiz stops showing it
    /// and stops accepting responses.
    pub async fn soft_delete(&self, question_id: i64) -> Result<(), QuestionError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE questions SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QuestionError::NotFound);
        }

        sqlx::query(
            "UPDATE quizzes SET live_question_id = NULL, accepting_responses = FALSE WHERE live_question_id = ?",
        )
        .bind(question_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
