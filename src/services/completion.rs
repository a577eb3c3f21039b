use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::modules::chat::schema::{ChatTurn, UsageInfo};
use crate::modules::session::model::MessageRole;
use crate::services::emotion::{self, Emotion};

pub const DEFAULT_MODEL: &str = "command";
pub const FALLBACK_MODEL: &str = "error-fallback";

const UPSTREAM_ERROR_CONTENT: &str =
    "I'm sorry, I encountered an error talking to my language model. Please try again.";
const EMPTY_RESPONSE_CONTENT: &str =
    "I'm sorry, I couldn't generate a proper response. Please try again.";

const SUGGESTION_PROMPT: &str = "Generate 3-5 engaging conversation starters or follow-up \
questions based on the context. Keep them concise and interesting.";

const FALLBACK_SUGGESTIONS: [&str; 4] = [
    "Tell me more about that",
    "What are your thoughts on this?",
    "How does this make you feel?",
    "What would you like to explore next?",
];

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("request cancelled")]
    Cancelled,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("missing upstream API key")]
    MissingApiKey,
}

#[derive(Debug, Serialize)]
struct UpstreamTurn {
    role: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct UpstreamChatRequest {
    message: String,
    chat_history: Vec<UpstreamTurn>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct UpstreamChatResponse {
    text: Option<String>,
    model: Option<String>,
    meta: Option<UpstreamMeta>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMeta {
    billable_units: Option<BillableUnits>,
}

#[derive(Debug, Deserialize)]
struct BillableUnits {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AiReply {
    pub content: String,
    pub emotion: Emotion,
    pub model: String,
    pub usage: UsageInfo,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl UpstreamConfig {
    pub fn from_env() -> Result<Self, CompletionError> {
        let api_key = env::var("UPSTREAM_API_KEY").map_err(|_| CompletionError::MissingApiKey)?;
        let base_url = env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| "https://api.cohere.ai/v1".to_string());
        let model = env::var("UPSTREAM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            base_url,
            api_key,
            model,
            temperature: 0.7,
            max_tokens: 1000,
        })
    }
}

/// Boundary the orchestrator talks to for one completion turn. Chunks are
/// provisional; the returned reply is authoritative.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        chunks: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<AiReply, CompletionError>;
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    config: UpstreamConfig,
}

impl CompletionClient {
    pub fn new() -> Result<Self, CompletionError> {
        Ok(Self::with_config(UpstreamConfig::from_env()?))
    }

    pub fn with_config(config: UpstreamConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    // One upstream call per invocation; no retries, no caching. Upstream
    // failures are folded into a well-formed fallback reply, only transport
    // errors surface as Err.
    pub async fn chat(&self, turns: &[ChatTurn]) -> Result<AiReply, CompletionError> {
        let request = self.build_request(turns);

        let response = self
            .client
            .post(format!("{}/chat", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "upstream chat request failed");
            return Ok(Self::fallback_reply(UPSTREAM_ERROR_CONTENT));
        }

        let parsed: UpstreamChatResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "upstream chat response was not valid JSON");
                return Ok(Self::fallback_reply(EMPTY_RESPONSE_CONTENT));
            }
        };

        let text = match parsed.text {
            Some(text) if !text.is_empty() => text,
            _ => {
                tracing::warn!("upstream chat response carried no text");
                return Ok(Self::fallback_reply(EMPTY_RESPONSE_CONTENT));
            }
        };

        let usage = parsed
            .meta
            .and_then(|meta| meta.billable_units)
            .map(|units| {
                let prompt_tokens = units.input_tokens.unwrap_or(0);
                let completion_tokens = units.output_tokens.unwrap_or(0);
                UsageInfo {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                }
            })
            .unwrap_or_default();

        Ok(AiReply {
            emotion: emotion::classify(&text).emotion,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            usage,
            content: text,
        })
    }

    pub async fn suggest(&self, context: &str) -> Vec<String> {
        let turns = vec![ChatTurn {
            role: MessageRole::User,
            content: format!("{}\n\n{}", SUGGESTION_PROMPT, context),
        }];

        let reply = match self.chat(&turns).await {
            Ok(reply) if reply.model != FALLBACK_MODEL => reply,
            Ok(_) => return Self::fallback_suggestions(),
            Err(err) => {
                tracing::warn!(error = %err, "suggestion request failed");
                return Self::fallback_suggestions();
            }
        };

        let suggestions: Vec<String> = reply
            .content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(5)
            .map(str::to_string)
            .collect();

        if suggestions.is_empty() {
            Self::fallback_suggestions()
        } else {
            suggestions
        }
    }

    fn build_request(&self, turns: &[ChatTurn]) -> UpstreamChatRequest {
        let message = turns.last().map(|turn| turn.content.clone()).unwrap_or_default();

        // Everything before the latest message becomes provider history.
        let chat_history = turns
            .iter()
            .take(turns.len().saturating_sub(1))
            .map(|turn| UpstreamTurn {
                role: match turn.role {
                    MessageRole::Assistant => "CHATBOT".to_string(),
                    MessageRole::User => "USER".to_string(),
                },
                message: turn.content.clone(),
            })
            .collect();

        UpstreamChatRequest {
            message,
            chat_history,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn fallback_reply(content: &str) -> AiReply {
        AiReply {
            content: content.to_string(),
            emotion: Emotion::Concern,
            model: FALLBACK_MODEL.to_string(),
            usage: UsageInfo::default(),
        }
    }

    fn fallback_suggestions() -> Vec<String> {
        FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        chunks: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<AiReply, CompletionError> {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            result = self.chat(turns) => result?,
        };

        // Non-streaming upstream: the whole reply arrives as a single chunk.
        let _ = chunks.send(reply.content.clone());
        Ok(reply)
    }
}
