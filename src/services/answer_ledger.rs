// src/services/answer_ledger.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, types::Json};
use thiserror::Error;

use crate::models::answer::{Answer, AnswerValue};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("answer not found")]
    NotFound,

    #[error("answer belongs to another user")]
    Unauthorized,

    #[error("answer storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Owns the answers table. At most one answer exists per
/// (question, solver), and awarded points survive resubmission.
#[derive(Clone)]
pub struct AnswerLedger {
    pool: SqlitePool,
}

impl AnswerLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores the solver's answer to a question, replacing an earlier one.
    /// Returns the id of the answer row, which is stable across resubmission.
    pub async fn submit(
        &self,
        question_id: i64,
        solver_id: i64,
        value: &AnswerValue,
        submitted_at: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO answers (question_id, solver_id, value, points_awarded, submitted_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(question_id, solver_id) DO UPDATE SET
                value = excluded.value,
                submitted_at = excluded.submitted_at
            RETURNING id
            "#,
        )
        .bind(question_id)
        .bind(solver_id)
        .bind(Json(value))
        .bind(submitted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Edits an answer by id on behalf of `solver_id`. Only the answer's own
    /// solver may edit it; the row is untouched otherwise.
    pub async fn submit_update(
        &self,
        answer_id: i64,
        solver_id: i64,
        value: &AnswerValue,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE answers SET value = ?, submitted_at = ? WHERE id = ? AND solver_id = ?",
        )
        .bind(Json(value))
        .bind(submitted_at)
        .bind(answer_id)
        .bind(solver_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.get(answer_id).await? {
            Some(answer) => {
                tracing::warn!(
                    "User {} tried to update answer {} owned by user {}",
                    solver_id,
                    answer_id,
                    answer.solver_id
                );
                Err(LedgerError::Unauthorized)
            }
            None => Err(LedgerError::NotFound),
        }
    }

    /// Applies grading decisions to the answers of one question. Ids of
    /// answers to other questions are ignored. Returns how many rows changed.
    pub async fn assign_scores(
        &self,
        question_id: i64,
        scores: &HashMap<i64, i64>,
    ) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for (answer_id, points) in scores {
            let result = sqlx::query(
                "UPDATE answers SET points_awarded = ? WHERE id = ? AND question_id = ? AND points_awarded != ?",
            )
            .bind(points)
            .bind(answer_id)
            .bind(question_id)
            .bind(points)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn answers_for_question(&self, question_id: i64) -> Result<Vec<Answer>, LedgerError> {
        Ok(sqlx::query_as::<_, Answer>(
            "SELECT * FROM answers WHERE question_id = ? ORDER BY submitted_at, id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?)
    }

    #[cfg(test)]
    pub async fn answer_for(
        &self,
        question_id: i64,
        solver_id: i64,
    ) -> Result<Option<Answer>, LedgerError> {
        Ok(sqlx::query_as::<_, Answer>(
            "SELECT * FROM answers WHERE question_id = ? AND solver_id = ?",
        )
        .bind(question_id)
        .bind(solver_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get(&self, answer_id: i64) -> Result<Option<Answer>, LedgerError> {
        Ok(sqlx::query_as::<_, Answer>("SELECT * FROM answers WHERE id = ?")
            .bind(answer_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
