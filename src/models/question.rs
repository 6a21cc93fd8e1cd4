// src/models/question.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::utils::{
    form::{FormError, FormFields},
    html::clean_html,
};

/// Kind of answer a question expects. Stored as its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AnswerKind {
    Text,
    Int,
    Float,
    Bool,
    /// Multiple choice, answered with a zero based index into the choices.
    #[serde(rename = "mcq")]
    #[sqlx(rename = "mcq")]
    Choice,
}

impl AnswerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerKind::Text => "text",
            AnswerKind::Int => "int",
            AnswerKind::Float => "float",
            AnswerKind::Bool => "bool",
            AnswerKind::Choice => "mcq",
        }
    }
}

impl fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(AnswerKind::Text),
            "int" => Ok(AnswerKind::Int),
            "float" => Ok(AnswerKind::Float),
            "bool" => Ok(AnswerKind::Bool),
            "mcq" => Ok(AnswerKind::Choice),
            other => Err(format!("unexpected question type: {other}")),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub title: String,
    /// Sanitized HTML body.
    pub html_body: String,
    pub kind: AnswerKind,
    /// Sanitized HTML of each option. Empty unless `kind` is `mcq`.
    pub choices: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Question {
    #[cfg(test)]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Validated question contents from the create and update forms.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub quiz_id: i64,
    pub title: String,
    pub html_body: String,
    pub kind: AnswerKind,
    pub choices: Vec<String>,
}

impl QuestionDraft {
    /// Parses `quiz-id`, `qn-title`, `qn-body`, `qn-type` and the repeated
    /// `mcq-opt` fields. HTML is sanitized on the way in.
    pub fn from_form(form: &FormFields) -> Result<Self, FormError> {
        let quiz_id = form.require_i64("quiz-id")?;

        let title = form.require("qn-title")?.trim();
        if title.is_empty() {
            return Err(FormError::invalid("qn-title", "question title is empty"));
        }
        if title.chars().count() > 500 {
            return Err(FormError::invalid("qn-title", "question title is too long"));
        }

        let html_body = clean_html(form.get("qn-body").unwrap_or_default());

        let kind: AnswerKind = form
            .require("qn-type")?
            .parse()
            .map_err(|e| FormError::invalid("qn-type", e))?;

        let choices = if kind == AnswerKind::Choice {
            let choices: Vec<String> = form
                .get_all("mcq-opt")
                .filter(|opt| !opt.trim().is_empty())
                .map(clean_html)
                .collect();
            if choices.len() < 2 {
                return Err(FormError::invalid(
                    "mcq-opt",
                    "a multiple choice question must have at least two options",
                ));
            }
            choices
        } else {
            Vec::new()
        };

        Ok(Self {
            quiz_id,
            title: title.to_string(),
            html_body,
            kind,
            choices,
        })
    }
}
