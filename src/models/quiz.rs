// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::user::User;

/// Represents the 'quizzes' table, with rosters stored as JSON arrays.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    /// Sanitized HTML shown above the questions.
    pub html_description: String,
    /// Users allowed to run the quiz. The first entry is the creator.
    pub quizmasters: Json<Vec<QuizmasterProfile>>,
    pub participants: Json<Vec<ParticipantProfile>>,
    /// Question currently shown to participants, if any.
    pub live_question_id: Option<i64>,
    pub accepting_responses: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One quizmaster roster entry. Any subset of the fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizmasterProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_email: Option<String>,
}

impl QuizmasterProfile {
    /// Roster entry describing `user` with every identifier it has.
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: Some(user.id),
            federated_subject: user.subject().map(str::to_string),
            federated_email: user.email().map(str::to_string),
        }
    }

    /// The most authoritative identifier set on the entry decides the match:
    /// subject first, then user id, then email. Lower ranked identifiers are
    /// not consulted once a higher ranked one is present.
    pub fn matches(&self, user: &User) -> bool {
        if let Some(subject) = self.federated_subject.as_deref().filter(|s| !s.is_empty()) {
            return user.subject() == Some(subject);
        }
        if let Some(id) = self.user_id.filter(|id| *id != 0) {
            return id == user.id;
        }
        if let Some(email) = self.federated_email.as_deref().filter(|e| !e.is_empty()) {
            return user.email() == Some(email);
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.federated_subject.is_none() && self.federated_email.is_none()
    }
}

/// A participant registered to a quiz under a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub user_id: i64,
    pub profile_name: String,
    pub completed_registration: bool,
}

/// Represents the 'access_grants' table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize)]
pub struct AccessGrant {
    pub user_id: i64,
    pub quiz_id: i64,
    pub read_allowed: bool,
    pub write_allowed: bool,
}

/// Live session state of a quiz as polled by participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize)]
pub struct QuizStatus {
    pub question_id: Option<i64>,
    pub accepting_responses: bool,
}

/// Quiz listing entry for the current user.
#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub can_write: bool,
}

/// Form for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct NewQuizForm {
    #[serde(rename = "quiz-title")]
    #[validate(length(min = 1, max = 200, message = "Quiz title must be 1 to 200 characters."))]
    pub title: String,
    #[serde(rename = "quiz-descr", default)]
    #[validate(length(max = 10000))]
    pub description: String,
}

/// Form for editing quiz metadata. Both fields are mandatory.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizForm {
    #[serde(rename = "qz-title", default)]
    #[validate(length(min = 1, max = 200, message = "quiz title and descr must be specified"))]
    pub title: String,
    #[serde(rename = "qz-descr", default)]
    #[validate(length(min = 1, max = 10000, message = "quiz title and descr must be specified"))]
    pub description: String,
}

/// Form for appending a co-quizmaster to the roster.
#[derive(Debug, Default, Deserialize)]
pub struct AddQuizmasterForm {
    #[serde(rename = "user-id", default)]
    pub user_id: Option<String>,
    #[serde(rename = "google-sub", default)]
    pub federated_subject: Option<String>,
    #[serde(rename = "google-email", default)]
    pub federated_email: Option<String>,
}

impl AddQuizmasterForm {
    /// Builds the roster entry; `None` when no identifier was supplied.
    pub fn into_profile(self) -> Result<Option<QuizmasterProfile>, std::num::ParseIntError> {
        let user_id = match non_blank(self.user_id) {
            Some(raw) => Some(raw.parse::<i64>()?),
            None => None,
        };
        let profile = QuizmasterProfile {
            user_id,
            federated_subject: non_blank(self.federated_subject),
            federated_email: non_blank(self.federated_email),
        };
        Ok((!profile.is_empty()).then_some(profile))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Form toggling the accepting-responses gate. Only `ar=true` opens it.
#[derive(Debug, Deserialize)]
pub struct AcceptingForm {
    #[serde(default)]
    pub ar: String,
}

impl AcceptingForm {
    pub fn accepting(&self) -> bool {
        self.ar == "true"
    }
}

/// Form registering the caller as a named participant.
#[derive(Debug, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(rename = "quiz-id")]
    pub quiz_id: i64,
    #[serde(rename = "profile-name", default)]
    #[validate(length(min = 1, max = 100, message = "did not get a profile name"))]
    pub profile_name: String,
}
