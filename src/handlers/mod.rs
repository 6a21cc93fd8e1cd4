// src/handlers/mod.rs

pub mod auth;
pub mod participant;
pub mod quizmaster;
