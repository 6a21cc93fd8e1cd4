// src/routes.rs

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    auth::middleware::session_middleware,
    handlers::{auth, participant, quizmaster},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Login, logout and the quiz status poll are public.
/// * Everything else sits behind the session middleware.
/// * Static assets are served from the configured directory under `/static`.
pub fn create_router(state: AppState) -> Router {
    let session = || middleware::from_fn_with_state(state.clone(), session_middleware);

    let common_routes = Router::new()
        .route("/whoami", get(auth::whoami))
        .route_layer(session())
        .route("/guest-login", post(auth::guest_login))
        .route("/oauth-login", post(auth::oauth_login))
        .route("/logout", post(auth::logout));

    let quizmaster_routes = Router::new()
        .route("/newquiz", post(quizmaster::new_quiz))
        .route("/quiz/{quizid}", get(quizmaster::get_quiz))
        .route(
            "/quiz/{quizid}/updateproperties",
            put(quizmaster::update_properties),
        )
        .route("/quiz/{quizid}/delete", delete(quizmaster::delete_quiz))
        .route("/quiz/{quizid}/reinstate", put(quizmaster::reinstate_quiz))
        .route(
            "/quiz/{quizid}/addquizmaster",
            post(quizmaster::add_quizmaster),
        )
        .route(
            "/quiz/{quizid}/setactive/{questionid}",
            post(quizmaster::set_active),
        )
        .route(
            "/quiz/{quizid}/setacceptingresponses",
            post(quizmaster::set_accepting_responses),
        )
        .route("/question/new", post(quizmaster::new_question))
        .route("/question/{questionid}", get(quizmaster::get_question))
        .route(
            "/question/{questionid}/update",
            put(quizmaster::update_question),
        )
        .route(
            "/question/{questionid}/delete",
            delete(quizmaster::delete_question),
        )
        .route(
            "/question/{questionid}/getallanswers",
            get(quizmaster::get_all_answers),
        )
        .route(
            "/question/{questionid}/savescores",
            post(quizmaster::save_scores),
        )
        .route_layer(session());

    let participant_routes = Router::new()
        .route("/set-profile", post(participant::set_profile))
        .route("/submit-answer", post(participant::submit_answer))
        .route_layer(session())
        .route("/quiz/{quizid}/getstatus", get(participant::get_status));

    let quiz_list = Router::new()
        .route("/api/quizzes", get(quizmaster::list_quizzes))
        .route_layer(session());

    Router::new()
        .nest("/api/common", common_routes)
        .nest("/api/quizmaster", quizmaster_routes)
        .nest("/api/participant", participant_routes)
        .merge(quiz_list)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
