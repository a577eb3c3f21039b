use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::modules::session::model::{ChatSession, Message, MessageRole};
use crate::modules::session::schema::{
    ChatTurnResponse, MessagePayload, SendMessageRequest, SessionListResponse, SessionResponse,
    SessionSummary, StatusResponse,
};
use crate::AppState;

fn to_message_payload(message: &Message) -> MessagePayload {
    MessagePayload {
        id: message.id.to_string(),
        role: message.role.as_str().to_string(),
        content: message.content.clone(),
        timestamp: message.timestamp.to_rfc3339(),
        emotion: message.emotion,
        model: message.metadata.as_ref().map(|meta| meta.model_name.clone()),
    }
}

fn to_session_response(session: &ChatSession) -> SessionResponse {
    SessionResponse {
        id: session.id.to_string(),
        title: session.title.clone(),
        messages: session.messages.iter().map(to_message_payload).collect(),
        message_count: session.messages.len(),
        created_at: session.created_at.to_rfc3339(),
        updated_at: session.updated_at.to_rfc3339(),
    }
}

fn to_session_summary(session: &ChatSession) -> SessionSummary {
    SessionSummary {
        id: session.id.to_string(),
        title: session.title.clone(),
        message_count: session.messages.len(),
        created_at: session.created_at.to_rfc3339(),
        updated_at: session.updated_at.to_rfc3339(),
    }
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    let session = state.orchestrator.create_new_session();
    (StatusCode::CREATED, Json(to_session_response(&session)))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.orchestrator.sessions();

    Json(SessionListResponse {
        total: sessions.len(),
        data: sessions.iter().map(to_session_summary).collect(),
    })
}

pub async fn load_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<StatusResponse>)> {
    let id = Uuid::parse_str(&id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                message: "Invalid ID format".to_string(),
            }),
        )
    })?;

    match state.orchestrator.load_session(id) {
        Some(session) => Ok(Json(to_session_response(&session))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(StatusResponse {
                message: "Session not found".to_string(),
            }),
        )),
    }
}

pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ChatTurnResponse>, (StatusCode, Json<StatusResponse>)> {
    if let Err(e) = payload.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                message: e.to_string(),
            }),
        ));
    }

    let handle = state.orchestrator.send_message(&payload.message).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                message: "Message cannot be empty".to_string(),
            }),
        )
    })?;
    handle.wait().await;

    let messages = state.orchestrator.messages();
    let session_id = state
        .orchestrator
        .current_session()
        .map(|session| session.id.to_string())
        .unwrap_or_default();

    let message = messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::User)
        .map(to_message_payload)
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    message: "Turn finished without a user message".to_string(),
                }),
            )
        })?;

    let response = messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::Assistant)
        .map(to_message_payload);

    Ok(Json(ChatTurnResponse {
        session_id,
        message,
        response,
        error: state.orchestrator.error(),
    }))
}

pub async fn clear_chat(State(state): State<AppState>) -> Json<StatusResponse> {
    state.orchestrator.clear_chat();

    Json(StatusResponse {
        message: "Chat cleared".to_string(),
    })
}
