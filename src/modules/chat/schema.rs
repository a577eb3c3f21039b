use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::modules::session::model::MessageRole;
use crate::services::completion::AiReply;
use crate::services::emotion::Emotion;

#[derive(Debug, Deserialize)]
pub struct ChatProxyRequest {
    pub messages: Vec<ChatTurn>,
}

/// One normalized history entry, the shape the orchestrator and the proxy
/// agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SuggestionsRequest {
    #[validate(length(min = 1, message = "Context cannot be empty"))]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProxyReply {
    pub content: String,
    pub emotion: Emotion,
    pub model: String,
    pub usage: UsageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AiReply> for ProxyReply {
    fn from(reply: AiReply) -> Self {
        Self {
            content: reply.content,
            emotion: reply.emotion,
            model: reply.model,
            usage: reply.usage,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
