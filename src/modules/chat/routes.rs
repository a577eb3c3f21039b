use axum::{routing::post, Router};

use crate::modules::chat::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ai-chat", post(controller::ai_chat))
        .route("/api/ai/suggestions", post(controller::suggestions))
}
