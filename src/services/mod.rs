// src/services/mod.rs

pub mod answer_ledger;
pub mod questions;
pub mod quiz_state;
pub mod quizzes;
