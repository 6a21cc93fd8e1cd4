// src/auth/access.rs

use sqlx::{SqliteConnection, SqlitePool, types::Json};
use thiserror::Error;

use crate::models::{
    quiz::{AccessGrant, QuizmasterProfile},
    user::User,
};

#[derive(Debug, Error)]
pub enum AccessError {
    /// Same error whether a grant denied access or the roster had no match.
    #[error("no write privileges for this quiz")]
    Denied,

    #[error("access storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// True when any roster entry identifies `user`.
pub fn roster_matches(roster: &[QuizmasterProfile], user: &User) -> bool {
    roster.iter().any(|entry| entry.matches(user))
}

/// The write decision given everything the two tiers need.
///
/// A direct grant is final. Without one, guests are refused and federated
/// users are checked against the quizmaster roster.
pub fn decide(grant: Option<&AccessGrant>, roster: Option<&[QuizmasterProfile]>, user: &User) -> bool {
    if let Some(grant) = grant {
        return grant.write_allowed;
    }
    if user.is_guest() {
        return false;
    }
    roster.is_some_and(|roster| roster_matches(roster, user))
}

/// Decides whether a user may change a quiz.
#[derive(Clone)]
pub struct AccessControl {
    pool: SqlitePool,
}

impl AccessControl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// First tier: the explicit (user, quiz) grant, if one exists.
    pub async fn direct_grant(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<AccessGrant>, sqlx::Error> {
        sqlx::query_as::<_, AccessGrant>(
            "SELECT user_id, quiz_id, read_allowed, write_allowed FROM access_grants WHERE user_id = ? AND quiz_id = ?",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Second tier: the quiz's embedded quizmaster roster. Guests and
    /// missing quizzes never match. Soft-deleted quizzes are still checked
    /// so that their quizmasters can reinstate them.
    pub async fn roster_allows(&self, user: &User, quiz_id: i64) -> Result<bool, sqlx::Error> {
        if user.is_guest() {
            return Ok(false);
        }
        let roster = self.roster(quiz_id).await?;
        Ok(decide(None, roster.as_deref(), user))
    }

    pub async fn can_write(&self, user: &User, quiz_id: i64) -> Result<bool, AccessError> {
        if let Some(grant) = self.direct_grant(user.id, quiz_id).await? {
            return Ok(grant.write_allowed);
        }
        Ok(self.roster_allows(user, quiz_id).await?)
    }

    pub async fn require_write(&self, user: &User, quiz_id: i64) -> Result<(), AccessError> {
        if self.can_write(user, quiz_id).await? {
            Ok(())
        } else {
            tracing::debug!("User {} denied write to quiz {}", user.id, quiz_id);
            Err(AccessError::Denied)
        }
    }

    /// All grants held by a user, for evaluating many quizzes at once.
    pub async fn grants_for_user(&self, user_id: i64) -> Result<Vec<AccessGrant>, sqlx::Error> {
        sqlx::query_as::<_, AccessGrant>(
            "SELECT user_id, quiz_id, read_allowed, write_allowed FROM access_grants WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn roster(&self, quiz_id: i64) -> Result<Option<Vec<QuizmasterProfile>>, sqlx::Error> {
        let row: Option<(Json<Vec<QuizmasterProfile>>,)> =
            sqlx::query_as("SELECT quizmasters FROM quizzes WHERE id = ?")
                .bind(quiz_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(roster),)| roster))
    }
}

/// Gives a quiz's creator full access. Runs on the caller's transaction so
/// the quiz and its grant are committed together.
pub async fn insert_creator_grant(
    conn: &mut SqliteConnection,
    user_id: i64,
    quiz_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO access_grants (user_id, quiz_id, read_allowed, write_allowed) VALUES (?, ?, TRUE, TRUE)",
    )
    .bind(user_id)
    .bind(quiz_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{db::connect_in_memory, models::user::FederatedIdentity};

    fn federated(id: i64, subject: &str, email: &str) -> User {
        User {
            id,
            federated: Some(FederatedIdentity {
                subject: subject.into(),
                email: Some(email.into()),
                email_verified: Some(true),
                name: None,
                given_name: None,
                family_name: None,
                picture: None,
                hosted_domain: None,
            }),
        }
    }

    async fn insert_user(pool: &SqlitePool) -> i64 {
        let now = Utc::now();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (created_at, updated_at) VALUES (?, ?) RETURNING id",
        )
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_quiz(pool: &SqlitePool, roster: Vec<QuizmasterProfile>) -> i64 {
        let now = Utc::now();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO quizzes (title, quizmasters, created_at, updated_at) VALUES ('Q', ?, ?, ?) RETURNING id",
        )
        .bind(Json(roster))
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    async fn grant(pool: &SqlitePool, user_id: i64, quiz_id: i64, write: bool) {
        sqlx::query("INSERT INTO access_grants (user_id, quiz_id, read_allowed, write_allowed) VALUES (?, ?, TRUE, ?)")
            .bind(user_id)
            .bind(quiz_id)
            .bind(write)
            .execute(pool)
            .await
            .unwrap();
    }

    #[test]
    fn decide_prefers_grant_over_roster() {
        let user = federated(1, "sub-1", "one@example.com");
        let roster = vec![QuizmasterProfile::for_user(&user)];
        let denied = AccessGrant {
            user_id: 1,
            quiz_id: 1,
            read_allowed: true,
            write_allowed: false,
        };
        assert!(!decide(Some(&denied), Some(roster.as_slice()), &user));
        assert!(decide(None, Some(roster.as_slice()), &user));
        assert!(!decide(None, None, &user));
        assert!(!decide(None, Some(roster.as_slice()), &User::guest(1)));
    }

    #[tokio::test]
    async fn creator_grant_allows_write() {
        let pool = connect_in_memory().await.unwrap();
        let access = AccessControl::new(pool.clone());
        let user_id = insert_user(&pool).await;
        let quiz_id = insert_quiz(&pool, Vec::new()).await;

        let mut conn = pool.acquire().await.unwrap();
        insert_creator_grant(&mut conn, user_id, quiz_id).await.unwrap();
        drop(conn);

        let guest = User::guest(user_id);
        let grant = access.direct_grant(user_id, quiz_id).await.unwrap().unwrap();
        assert!(grant.read_allowed && grant.write_allowed);
        assert!(access.can_write(&guest, quiz_id).await.unwrap());
        assert!(access.require_write(&guest, quiz_id).await.is_ok());
    }

    #[tokio::test]
    async fn denying_grant_is_final_even_with_roster_match() {
        let pool = connect_in_memory().await.unwrap();
        let access = AccessControl::new(pool.clone());
        let user_id = insert_user(&pool).await;
        let user = federated(user_id, "sub-x", "x@example.com");
        let quiz_id = insert_quiz(&pool, vec![QuizmasterProfile::for_user(&user)]).await;
        grant(&pool, user_id, quiz_id, false).await;

        assert!(access.roster_allows(&user, quiz_id).await.unwrap());
        assert!(!access.can_write(&user, quiz_id).await.unwrap());
        assert!(matches!(
            access.require_write(&user, quiz_id).await,
            Err(AccessError::Denied)
        ));
    }

    #[tokio::test]
    async fn guest_without_grant_is_denied() {
        let pool = connect_in_memory().await.unwrap();
        let access = AccessControl::new(pool.clone());
        let user_id = insert_user(&pool).await;
        let quiz_id = insert_quiz(
            &pool,
            vec![QuizmasterProfile {
                user_id: Some(user_id),
                ..Default::default()
            }],
        )
        .await;

        let guest = User::guest(user_id);
        assert!(!access.roster_allows(&guest, quiz_id).await.unwrap());
        assert!(!access.can_write(&guest, quiz_id).await.unwrap());
    }

    #[tokio::test]
    async fn roster_fallback_uses_entry_priority() {
        let pool = connect_in_memory().await.unwrap();
        let access = AccessControl::new(pool.clone());
        let user = federated(42, "sub-42", "answer@example.com");
        let quiz_id = insert_quiz(
            &pool,
            vec![
                // Subject set and different: the matching email is not consulted.
                QuizmasterProfile {
                    user_id: None,
                    federated_subject: Some("other".into()),
                    federated_email: Some("answer@example.com".into()),
                },
                QuizmasterProfile {
                    federated_email: Some("someone@example.com".into()),
                    ..Default::default()
                },
            ],
        )
        .await;
        assert!(!access.can_write(&user, quiz_id).await.unwrap());

        let by_email = insert_quiz(
            &pool,
            vec![QuizmasterProfile {
                federated_email: Some("answer@example.com".into()),
                ..Default::default()
            }],
        )
        .await;
        assert!(access.can_write(&user, by_email).await.unwrap());
    }

    #[tokio::test]
    async fn missing_quiz_is_denied() {
        let pool = connect_in_memory().await.unwrap();
        let access = AccessControl::new(pool);
        let user = federated(1, "sub-1", "one@example.com");
        assert!(!access.can_write(&user, 999).await.unwrap());
    }
}
