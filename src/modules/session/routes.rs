use axum::{
    routing::{get, post},
    Router,
};

use crate::modules::session::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", post(controller::create_session))
        .route("/api/session/{id}", get(controller::load_session))
        .route("/api/sessions", get(controller::list_sessions))
        .route("/api/chat", post(controller::chat))
        .route("/api/chat/clear", post(controller::clear_chat))
}
