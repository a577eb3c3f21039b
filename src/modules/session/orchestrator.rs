use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::modules::chat::schema::ChatTurn;
use crate::modules::session::model::{
    conversation_title, ChatSession, EmotionSnapshot, Message, MessageMetadata,
};
use crate::modules::session::store::ChatHistoryStore;
use crate::services::completion::{AiReply, CompletionBackend, CompletionError};
use crate::services::emotion::{self, Emotion};

struct ChatState {
    messages: Vec<Message>,
    sessions: Vec<ChatSession>,
    current_id: Option<Uuid>,
    is_loading: bool,
    error: Option<String>,
}

struct InflightTurn {
    turn_id: Uuid,
    token: CancellationToken,
}

struct Inner {
    backend: Arc<dyn CompletionBackend>,
    store: ChatHistoryStore,
    state: Mutex<ChatState>,
    // Lock order: inflight before state, never the other way around.
    inflight: Mutex<Option<InflightTurn>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            if let Some(turn) = inflight.take() {
                turn.token.cancel();
            }
        }
    }
}

/// Owns the authoritative chat state for the active session and drives one
/// user turn at a time. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ChatOrchestrator {
    inner: Arc<Inner>,
}

pub struct TurnHandle {
    join: JoinHandle<()>,
}

impl TurnHandle {
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

fn current_position(state: &ChatState) -> Option<usize> {
    let id = state.current_id?;
    state.sessions.iter().position(|session| session.id == id)
}

impl ChatOrchestrator {
    pub fn new(backend: Arc<dyn CompletionBackend>, store: ChatHistoryStore) -> Self {
        let sessions = store.load(Vec::new());

        let orchestrator = Self {
            inner: Arc::new(Inner {
                backend,
                store,
                state: Mutex::new(ChatState {
                    messages: Vec::new(),
                    sessions,
                    current_id: None,
                    is_loading: false,
                    error: None,
                }),
                inflight: Mutex::new(None),
            }),
        };

        // Resume the most recent session, or start fresh.
        let most_recent = {
            let state = orchestrator.state();
            state.sessions.first().cloned()
        };
        match most_recent {
            Some(session) => {
                let mut state = orchestrator.state();
                state.messages = session.messages.clone();
                state.current_id = Some(session.id);
            }
            None => {
                orchestrator.create_new_session();
            }
        }

        orchestrator
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.inner.state.lock().expect("chat state lock poisoned")
    }

    fn inflight(&self) -> MutexGuard<'_, Option<InflightTurn>> {
        self.inner.inflight.lock().expect("inflight lock poisoned")
    }

    pub fn create_new_session(&self) -> ChatSession {
        let session = ChatSession::new();

        let snapshot = {
            let mut state = self.state();
            // A session that never saw a message is expendable; replace it
            // instead of letting empty sessions pile up.
            state.sessions.retain(|existing| !existing.messages.is_empty());
            state.sessions.insert(0, session.clone());
            state.current_id = Some(session.id);
            state.messages.clear();
            state.error = None;
            state.sessions.clone()
        };

        self.inner.store.save(&snapshot);
        session
    }

    // Looks the session up in the persisted list; an unknown id leaves the
    // current state untouched.
    pub fn load_session(&self, id: Uuid) -> Option<ChatSession> {
        let persisted = self.inner.store.load(Vec::new());
        let session = persisted.into_iter().find(|candidate| candidate.id == id)?;

        let mut state = self.state();
        state.messages = session.messages.clone();
        state.current_id = Some(session.id);
        state.error = None;
        match state.sessions.iter_mut().find(|existing| existing.id == id) {
            Some(slot) => *slot = session.clone(),
            None => state.sessions.insert(0, session.clone()),
        }

        Some(session)
    }

    /// Starts one user turn. Returns `None` without side effects when the
    /// trimmed input is empty or no session is current; otherwise cancels any
    /// turn still in flight and spawns the new one.
    pub fn send_message(&self, content: &str) -> Option<TurnHandle> {
        let text = content.trim();
        if text.is_empty() {
            return None;
        }
        if self.state().current_id.is_none() {
            return None;
        }

        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id;
        let started = placeholder.timestamp;
        let token = CancellationToken::new();

        // Single-flight: the previous turn is cancelled before the new one
        // becomes visible, so it can no longer finalize.
        {
            let mut inflight = self.inflight();
            if let Some(previous) = inflight.take() {
                previous.token.cancel();
            }
            *inflight = Some(InflightTurn {
                turn_id: placeholder_id,
                token: token.clone(),
            });
        }

        let history = {
            let mut state = self.state();
            state.error = None;
            state.messages.push(Message::user(text.to_string()));

            let history: Vec<ChatTurn> = state
                .messages
                .iter()
                .map(|message| ChatTurn {
                    role: message.role,
                    content: message.content.clone(),
                })
                .collect();

            state.messages.push(placeholder);
            state.is_loading = true;
            history
        };

        let orchestrator = self.clone();
        let user_text = text.to_string();
        let join = tokio::spawn(async move {
            orchestrator
                .run_turn(user_text, placeholder_id, started, history, token)
                .await;
        });

        Some(TurnHandle { join })
    }

    pub fn clear_chat(&self) {
        let snapshot = {
            let mut state = self.state();
            state.messages.clear();
            state.error = None;
            if let Some(position) = current_position(&state) {
                state.sessions[position].clear_messages();
            }
            state.sessions.clone()
        };

        self.inner.store.save(&snapshot);
    }

    /// Aborts the in-flight turn, if any. The turn's own cleanup removes the
    /// placeholder and clears the loading flag.
    pub fn cancel(&self) {
        let inflight = self.inflight();
        if let Some(turn) = inflight.as_ref() {
            turn.token.cancel();
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.state().sessions.clone()
    }

    pub fn current_session(&self) -> Option<ChatSession> {
        let state = self.state();
        current_position(&state).map(|position| state.sessions[position].clone())
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    async fn run_turn(
        self,
        user_text: String,
        placeholder_id: Uuid,
        started: DateTime<Utc>,
        history: Vec<ChatTurn>,
        token: CancellationToken,
    ) {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let backend = self.inner.backend.clone();

        let request = backend.complete(&history, chunk_tx, token.clone());
        tokio::pin!(request);

        let mut chunks_open = true;
        let result = loop {
            tokio::select! {
                biased;
                // A user-initiated abort always wins over a racing completion.
                _ = token.cancelled() => break Err(CompletionError::Cancelled),
                maybe = chunk_rx.recv(), if chunks_open => match maybe {
                    Some(chunk) => self.apply_chunk(placeholder_id, &chunk),
                    None => chunks_open = false,
                },
                result = &mut request => {
                    // Flush chunks that were queued before completion.
                    while let Ok(chunk) = chunk_rx.try_recv() {
                        self.apply_chunk(placeholder_id, &chunk);
                    }
                    break result;
                }
            }
        };

        match result {
            Ok(reply) => self.finish_turn(&user_text, placeholder_id, started, reply),
            Err(CompletionError::Cancelled) => self.discard_turn(placeholder_id),
            Err(err) => self.fail_turn(placeholder_id, &err),
        }
    }

    // Chunk accumulation is provisional; the completion payload overwrites it.
    fn apply_chunk(&self, placeholder_id: Uuid, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        let mut state = self.state();
        if let Some(message) = state
            .messages
            .iter_mut()
            .find(|message| message.id == placeholder_id)
        {
            message.content.push_str(chunk);
        }
    }

    fn finish_turn(
        &self,
        user_text: &str,
        placeholder_id: Uuid,
        started: DateTime<Utc>,
        reply: AiReply,
    ) {
        let snapshot = emotion::classify(&reply.content);
        let response_time_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
        let token_count = if reply.usage.total_tokens > 0 {
            reply.usage.total_tokens
        } else {
            reply.content.len() as u32
        };

        let mut inflight = self.inflight();
        let is_current = inflight
            .as_ref()
            .is_some_and(|turn| turn.turn_id == placeholder_id);
        if !is_current {
            // Superseded after completion; the reply belongs to a dead turn.
            drop(inflight);
            self.discard_turn(placeholder_id);
            return;
        }

        let sessions = {
            let mut state = self.state();

            if let Some(message) = state
                .messages
                .iter_mut()
                .find(|message| message.id == placeholder_id)
            {
                message.content = reply.content.clone();
                message.emotion = Some(reply.emotion);
                message.metadata = Some(MessageMetadata {
                    response_time_ms,
                    token_count,
                    model_name: reply.model.clone(),
                });
            }

            let messages = state.messages.clone();
            if let Some(position) = current_position(&state) {
                let mut session = state.sessions.remove(position);
                session.messages = messages;
                session.updated_at = Utc::now();
                if session.has_default_title() {
                    session.title = conversation_title(user_text);
                }
                session.emotion_history.push(EmotionSnapshot {
                    emotion: reply.emotion,
                    confidence: snapshot.confidence,
                    intensity: snapshot.intensity,
                });
                // Most recently active first.
                state.sessions.insert(0, session);
            }

            state.is_loading = false;
            state.sessions.clone()
        };

        *inflight = None;
        drop(inflight);

        self.inner.store.save(&sessions);
    }

    // Cancelled turns leave no trace: the placeholder goes away and the
    // session is never touched.
    fn discard_turn(&self, placeholder_id: Uuid) {
        let mut inflight = self.inflight();
        let is_current = inflight
            .as_ref()
            .is_some_and(|turn| turn.turn_id == placeholder_id);
        if is_current {
            *inflight = None;
        }

        let mut state = self.state();
        state.messages.retain(|message| message.id != placeholder_id);
        if is_current {
            state.is_loading = false;
        }
    }

    fn fail_turn(&self, placeholder_id: Uuid, err: &CompletionError) {
        tracing::error!(error = %err, "chat turn failed");

        let mut inflight = self.inflight();
        let is_current = inflight
            .as_ref()
            .is_some_and(|turn| turn.turn_id == placeholder_id);
        if !is_current {
            drop(inflight);
            self.discard_turn(placeholder_id);
            return;
        }
        *inflight = None;

        // A failed turn keeps its placeholder as a visible apology.
        let mut state = self.state();
        if let Some(message) = state
            .messages
            .iter_mut()
            .find(|message| message.id == placeholder_id)
        {
            message.content = format!(
                "I'm sorry, I encountered an error: {}. Please try again later.",
                err
            );
            message.emotion = Some(Emotion::Concern);
        }
        state.error = Some(err.to_string());
        state.is_loading = false;
    }
}
