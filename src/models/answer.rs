// src/models/answer.rs

use std::{collections::HashMap, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::{
    models::question::{AnswerKind, Question},
    utils::form::{FormError, FormFields},
};

static SCORE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ans-([0-9]+)-score$").expect("score field pattern is valid"));

/// A typed answer. Exactly one variant is ever set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Zero based index into the question's choices.
    Choice(i64),
}

impl AnswerValue {
    pub fn kind(&self) -> AnswerKind {
        match self {
            AnswerValue::Text(_) => AnswerKind::Text,
            AnswerValue::Int(_) => AnswerKind::Int,
            AnswerValue::Float(_) => AnswerKind::Float,
            AnswerValue::Bool(_) => AnswerKind::Bool,
            AnswerValue::Choice(_) => AnswerKind::Choice,
        }
    }

    /// Checks that this value answers `question`: same kind, and an index
    /// within the option list for multiple choice.
    pub fn check_against(&self, question: &Question) -> Result<(), String> {
        if self.kind() != question.kind {
            return Err(format!(
                "question expects a {} answer, got {}",
                question.kind,
                self.kind()
            ));
        }
        if let AnswerValue::Choice(index) = self {
            let in_range = usize::try_from(*index).is_ok_and(|i| i < question.choices.len());
            if !in_range {
                return Err(format!("choice {index} is out of range"));
            }
        }
        Ok(())
    }
}

/// Represents the 'answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub solver_id: i64,
    pub value: Json<AnswerValue>,
    /// Set by grading only; kept when the solver resubmits.
    pub points_awarded: i64,
    pub submitted_at: DateTime<Utc>,
}

/// A participant's submission parsed from the submit-answer form.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSubmission {
    pub quiz_id: i64,
    pub question_id: i64,
    /// Present when the participant is editing an earlier answer.
    pub answer_id: Option<i64>,
    pub value: AnswerValue,
}

impl AnswerSubmission {
    /// Reads `qz-id`, `qn-id`, the optional `ans-id`, and the first of
    /// `ans-text`, `ans-int64`, `ans-float`, `ans-bool`, `ans-mcq` present.
    pub fn from_form(form: &FormFields) -> Result<Self, FormError> {
        let quiz_id = form.require_i64("qz-id")?;
        let question_id = form.require_i64("qn-id")?;
        let answer_id = form.optional_i64("ans-id")?;

        let value = if let Some(text) = form.get("ans-text") {
            AnswerValue::Text(text.to_string())
        } else if let Some(raw) = form.get("ans-int64") {
            AnswerValue::Int(
                raw.trim()
                    .parse()
                    .map_err(|e| FormError::invalid("ans-int64", e))?,
            )
        } else if let Some(raw) = form.get("ans-float") {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|e| FormError::invalid("ans-float", e))?;
            if !value.is_finite() {
                return Err(FormError::invalid("ans-float", "value is not finite"));
            }
            AnswerValue::Float(value)
        } else if let Some(raw) = form.get("ans-bool") {
            AnswerValue::Bool(
                parse_bool(raw.trim())
                    .ok_or_else(|| FormError::invalid("ans-bool", "expected true or false"))?,
            )
        } else if let Some(raw) = form.get("ans-mcq") {
            AnswerValue::Choice(
                raw.trim()
                    .parse()
                    .map_err(|e| FormError::invalid("ans-mcq", e))?,
            )
        } else {
            return Err(FormError::invalid(
                "ans-*",
                "did not get any supported answer type",
            ));
        };

        Ok(Self {
            quiz_id,
            question_id,
            answer_id,
            value,
        })
    }
}

/// Accepts the spellings browsers and scripts commonly send for booleans.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Extracts grading decisions from the save-scores form.
///
/// Each `ans-<id>-score` field carries either an integer score or the word
/// `custom`, in which case the score is read from `ans-<id>-custom-score`.
pub fn parse_score_assignments(form: &FormFields) -> Result<HashMap<i64, i64>, FormError> {
    let mut scores = HashMap::new();
    for (name, value) in form.iter() {
        let Some(captures) = SCORE_FIELD.captures(name) else {
            continue;
        };
        let answer_id: i64 = captures[1]
            .parse()
            .map_err(|e| FormError::invalid(name, e))?;

        let score: i64 = if value == "custom" {
            let custom_name = format!("ans-{answer_id}-custom-score");
            let raw = form
                .get(&custom_name)
                .map(str::trim)
                .filter(|raw| !raw.is_empty())
                .ok_or_else(|| {
                    FormError::invalid(
                        custom_name.as_str(),
                        "custom score option was chosen but no value was provided",
                    )
                })?;
            raw.parse()
                .map_err(|e| FormError::invalid(custom_name.as_str(), e))?
        } else {
            value
                .trim()
                .parse()
                .map_err(|e| FormError::invalid(name, e))?
        };
        scores.insert(answer_id, score);
    }
    Ok(scores)
}
