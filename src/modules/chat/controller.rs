use axum::extract::rejection::JsonRejection;
use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::modules::chat::schema::{
    ChatProxyRequest, MessageResponse, ProxyReply, SuggestionsRequest, SuggestionsResponse,
    UsageInfo,
};
use crate::services::completion::FALLBACK_MODEL;
use crate::services::emotion::Emotion;
use crate::AppState;

pub async fn ai_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatProxyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProxyReply>), (StatusCode, Json<MessageResponse>)> {
    // Anything that is not `{"messages": [...]}` is a client error.
    let Json(payload) = payload.map_err(|err| {
        tracing::warn!(error = %err, "rejected malformed proxy request");
        (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "Invalid messages format".to_string(),
            }),
        )
    })?;

    match state.completion.chat(&payload.messages).await {
        Ok(reply) => Ok((StatusCode::OK, Json(ProxyReply::from(reply)))),
        Err(err) => {
            tracing::error!(error = %err, "proxy request failed in transit");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProxyReply {
                    content: "I'm sorry, there was an error processing your request. Please \
                              try again later."
                        .to_string(),
                    emotion: Emotion::Concern,
                    model: FALLBACK_MODEL.to_string(),
                    usage: UsageInfo::default(),
                    error: Some(err.to_string()),
                }),
            ))
        }
    }
}

pub async fn suggestions(
    State(state): State<AppState>,
    Json(payload): Json<SuggestionsRequest>,
) -> Result<Json<SuggestionsResponse>, (StatusCode, Json<MessageResponse>)> {
    if let Err(e) = payload.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: e.to_string(),
            }),
        ));
    }

    let suggestions = state.completion.suggest(&payload.context).await;

    Ok(Json(SuggestionsResponse { suggestions }))
}
