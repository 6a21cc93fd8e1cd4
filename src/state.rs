// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{
    auth::{
        access::AccessControl,
        identity::IdentityResolver,
        key_cache::{KeyCache, KeyFetcher},
        session::SessionStore,
    },
    config::Config,
    services::{
        answer_ledger::AnswerLedger, questions::QuestionService, quiz_state::QuizState,
        quizzes::QuizService,
    },
};

/// Shared application state. Every component is a cheap clone over the pool.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub sessions: SessionStore,
    pub identity: IdentityResolver,
    pub access: AccessControl,
    pub quizzes: QuizService,
    pub questions: QuestionService,
    pub ledger: AnswerLedger,
    pub quiz_state: QuizState,
}

impl AppState {
    /// Wires all components over one pool. The key fetcher is injected so
    /// tests can serve a fixture key set.
    pub fn new(pool: SqlitePool, config: Config, fetcher: Arc<dyn KeyFetcher>) -> Self {
        let keys = KeyCache::new(pool.clone(), fetcher);
        let access = AccessControl::new(pool.clone());
        let identity = IdentityResolver::new(
            pool.clone(),
            keys,
            config.oauth_client_id.clone(),
            config.oauth_issuers.clone(),
        );
        Self {
            sessions: SessionStore::new(pool.clone()),
            identity,
            quizzes: QuizService::new(pool.clone(), access.clone()),
            access,
            questions: QuestionService::new(pool.clone()),
            ledger: AnswerLedger::new(pool.clone()),
            quiz_state: QuizState::new(pool.clone()),
            pool,
            config,
        }
    }
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for IdentityResolver {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

