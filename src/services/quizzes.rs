// src/services/quizzes.rs

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool, types::Json};
use thiserror::Error;

use crate::{
    auth::access::{AccessControl, decide, insert_creator_grant},
    models::{
        quiz::{ParticipantProfile, Quiz, QuizSummary, QuizmasterProfile},
        user::User,
    },
};

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("quiz not found")]
    NotFound,

    #[error("quiz storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Quiz metadata and the rosters embedded in each quiz.
#[derive(Clone)]
pub struct QuizService {
    pool: SqlitePool,
    access: AccessControl,
}

impl QuizService {
    pub fn new(pool: SqlitePool, access: AccessControl) -> Self {
        Self { pool, access }
    }

    /// Creates a quiz with `creator` as its first quizmaster. The creator's
    /// full access grant is committed in the same transaction.
    pub async fn create(
        &self,
        creator: &User,
        title: &str,
        html_description: &str,
    ) -> Result<Quiz, QuizError> {
        let now = Utc::now();
        let roster = vec![QuizmasterProfile::for_user(creator)];

        let mut tx = self.pool.begin().await?;
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (title, html_description, quizmasters, participants, created_at, updated_at)
            VALUES (?, ?, ?, '[]', ?, ?)
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(html_description)
        .bind(Json(&roster))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        insert_creator_grant(&mut tx, creator.id, quiz.id).await?;
        tx.commit().await?;

        tracing::info!("User {} created quiz {}", creator.id, quiz.id);
        Ok(quiz)
    }

    /// Fetches a quiz, soft-deleted or not.
    pub async fn get(&self, quiz_id: i64) -> Result<Quiz, QuizError> {
        sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = ?")
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QuizError::NotFound)
    }

    /// Live quizzes, each flagged with whether `user` may edit it.
    pub async fn list_for(&self, user: &User) -> Result<Vec<QuizSummary>, QuizError> {
        let quizzes =
            sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE deleted_at IS NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let grants: HashMap<i64, _> = self
            .access
            .grants_for_user(user.id)
            .await?
            .into_iter()
            .map(|grant| (grant.quiz_id, grant))
            .collect();

        Ok(quizzes
            .into_iter()
            .map(|quiz| {
                let can_write = decide(grants.get(&quiz.id), Some(quiz.quizmasters.as_slice()), user);
                QuizSummary {
                    id: quiz.id,
                    title: quiz.title,
                    description: quiz.html_description,
                    can_write,
                }
            })
            .collect())
    }

    pub async fn update_metadata(
        &self,
        quiz_id: i64,
        title: &str,
        html_description: &str,
    ) -> Result<(), QuizError> {
        let result = sqlx::query(
            "UPDATE quizzes SET title = ?, html_description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(html_description)
        .bind(Utc::now())
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QuizError::NotFound);
        }
        Ok(())
    }

    pub async fn soft_delete(&self, quiz_id: i64) -> Result<(), QuizError> {
        let result = sqlx::query(
            "UPDATE quizzes SET deleted_at = COALESCE(deleted_at, ?) WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QuizError::NotFound);
        }
        Ok(())
    }

    pub async fn reinstate(&self, quiz_id: i64) -> Result<(), QuizError> {
        let result = sqlx::query("UPDATE quizzes SET deleted_at = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(QuizError::NotFound);
        }
        Ok(())
    }

    /// Appends a co-quizmaster. An identical entry is not added twice.
    pub async fn add_quizmaster(
        &self,
        quiz_id: i64,
        entry: QuizmasterProfile,
    ) -> Result<(), QuizError> {
        let mut tx = self.pool.begin().await?;
        let Json(mut roster) = lock_roster::<QuizmasterProfile>(&mut tx, quiz_id, "quizmasters").await?;

        if !roster.contains(&entry) {
            roster.push(entry);
            sqlx::query("UPDATE quizzes SET quizmasters = ? WHERE id = ?")
                .bind(Json(&roster))
                .bind(quiz_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Records `user_id` as a participant named `profile_name`, replacing
    /// the name if the user registered before.
    pub async fn register_participant(
        &self,
        quiz_id: i64,
        user_id: i64,
        profile_name: &str,
    ) -> Result<(), QuizError> {
        let mut tx = self.pool.begin().await?;
        let Json(mut participants) =
            lock_roster::<ParticipantProfile>(&mut tx, quiz_id, "participants").await?;

        match participants.iter_mut().find(|p| p.user_id == user_id) {
            Some(existing) => {
                existing.profile_name = profile_name.to_string();
                existing.completed_registration = true;
            }
            None => participants.push(ParticipantProfile {
                user_id,
                profile_name: profile_name.to_string(),
                completed_registration: true,
            }),
        }

        sqlx::query("UPDATE quizzes SET participants = ? WHERE id = ?")
            .bind(Json(&participants))
            .bind(quiz_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Takes the write lock on a live quiz row, then reads one of its roster
/// columns. Writing first keeps a concurrent roster edit from interleaving
/// between the read and the write-back.
async fn lock_roster<T>(
    conn: &mut SqliteConnection,
    quiz_id: i64,
    column: &'static str,
) -> Result<Json<Vec<T>>, QuizError>
where
    T: serde::de::DeserializeOwned + Send + Unpin + 'static,
{
    let touched = sqlx::query("UPDATE quizzes SET updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(Utc::now())
        .bind(quiz_id)
        .execute(&mut *conn)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(QuizError::NotFound);
    }

    let sql = format!("SELECT {column} FROM quizzes WHERE id = ?");
    let (roster,): (Json<Vec<T>>,) = sqlx::query_as(&sql)
        .bind(quiz_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(roster)
}
