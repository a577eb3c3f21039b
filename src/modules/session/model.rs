use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::emotion::Emotion;

pub const DEFAULT_SESSION_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub response_time_ms: u64,
    pub token_count: u32,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            role,
            timestamp: Utc::now(),
            emotion: None,
            metadata: None,
        }
    }

    pub fn user(content: String) -> Self {
        Self::new(MessageRole::User, content)
    }

    // Stands in for the assistant reply while the turn is in flight; content
    // stays mutable until the turn reaches a terminal state.
    pub fn assistant_placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub emotion: Emotion,
    pub confidence: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Concise,
    Detailed,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Professional,
    Casual,
    Creative,
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub response_length: ResponseLength,
    pub tone: Tone,
    pub language: String,
    pub theme: Theme,
    pub animations: bool,
    pub sound_effects: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            response_length: ResponseLength::Detailed,
            tone: Tone::Casual,
            language: "en".to_string(),
            theme: Theme::Dark,
            animations: true,
            sound_effects: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub emotion_history: Vec<EmotionSnapshot>,
    pub user_preferences: UserPreferences,
}

impl ChatSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            emotion_history: Vec::new(),
            user_preferences: UserPreferences::default(),
        }
    }

    // The title is only rewritten while it still carries the placeholder.
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

// First five words of the opening message; the marker is appended whenever
// the full text runs past 30 characters.
pub fn conversation_title(first_message: &str) -> String {
    let words: Vec<&str> = first_message.split(' ').take(5).collect();
    let marker = if first_message.len() > 30 { "..." } else { "" };
    format!("{}{}", words.join(" "), marker)
}
