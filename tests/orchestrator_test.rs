use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use aethermind::modules::chat::schema::{ChatTurn, UsageInfo};
use aethermind::modules::session::model::{MessageRole, ResponseLength, Theme, Tone};
use aethermind::modules::session::orchestrator::ChatOrchestrator;
use aethermind::modules::session::store::{ChatHistoryStore, FileStorage};
use aethermind::services::completion::{
    AiReply, CompletionBackend, CompletionClient, CompletionError, UpstreamConfig,
};
use aethermind::services::emotion::Emotion;

#[derive(Clone)]
enum Script {
    Reply { chunks: Vec<String>, reply: AiReply },
    WaitForCancel,
}

// Scripted by the latest user message, so concurrent turns stay deterministic.
struct ScriptedBackend {
    calls: AtomicUsize,
    scripts: HashMap<String, Script>,
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        chunks: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<AiReply, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let last_user = turns
            .iter()
            .rev()
            .find(|turn| turn.role == MessageRole::User)
            .map(|turn| turn.content.clone())
            .unwrap_or_default();

        match self.scripts.get(&last_user).cloned() {
            Some(Script::Reply { chunks: parts, reply }) => {
                for part in parts {
                    let _ = chunks.send(part);
                }
                Ok(reply)
            }
            Some(Script::WaitForCancel) => {
                cancel.cancelled().await;
                Err(CompletionError::Cancelled)
            }
            None => panic!("no script for message {last_user:?}"),
        }
    }
}

fn reply(content: &str, emotion: Emotion) -> AiReply {
    AiReply {
        content: content.to_string(),
        emotion,
        model: "command".to_string(),
        usage: UsageInfo {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        },
    }
}

fn orchestrator_with(
    scripts: Vec<(&str, Script)>,
    dir: &Path,
) -> (ChatOrchestrator, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend {
        calls: AtomicUsize::new(0),
        scripts: scripts
            .into_iter()
            .map(|(key, script)| (key.to_string(), script))
            .collect(),
    });
    let storage = FileStorage::new(dir).unwrap();
    let store = ChatHistoryStore::new(Arc::new(storage));
    let orchestrator = ChatOrchestrator::new(backend.clone(), store);

    (orchestrator, backend)
}

fn persisted_sessions(dir: &Path) -> Vec<aethermind::modules::session::model::ChatSession> {
    ChatHistoryStore::new(Arc::new(FileStorage::new(dir).unwrap())).load(Vec::new())
}

#[tokio::test]
async fn test_empty_input_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, backend) = orchestrator_with(vec![], dir.path());

    assert!(orchestrator.send_message("").is_none());
    assert!(orchestrator.send_message("   ").is_none());

    assert!(orchestrator.messages().is_empty());
    assert!(!orchestrator.is_loading());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_successful_turn_finalizes_from_the_completion_payload() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, backend) = orchestrator_with(
        vec![(
            "Tell me something nice",
            Script::Reply {
                chunks: vec!["provisional chunk".to_string()],
                reply: reply("That is a great and wonderful idea!", Emotion::Joy),
            },
        )],
        dir.path(),
    );

    let handle = orchestrator.send_message("Tell me something nice").unwrap();
    handle.wait().await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "Tell me something nice");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    // The completion payload overrides whatever chunks accumulated.
    assert_eq!(messages[1].content, "That is a great and wonderful idea!");
    assert_eq!(messages[1].emotion, Some(Emotion::Joy));

    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata.token_count, 3);
    assert_eq!(metadata.model_name, "command");

    assert!(!orchestrator.is_loading());
    assert!(orchestrator.error().is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    let session = orchestrator.current_session().unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.title, "Tell me something nice");
    assert_eq!(session.emotion_history.len(), 1);
    assert_eq!(session.emotion_history[0].emotion, Emotion::Joy);

    let persisted = persisted_sessions(dir.path());
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].messages.len(), 2);
}

#[tokio::test]
async fn test_long_first_message_becomes_a_truncated_title() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(
        vec![(
            "Explain quantum computing mechanics in depth",
            Script::Reply {
                chunks: vec![],
                reply: reply("It is complicated.", Emotion::Neutral),
            },
        )],
        dir.path(),
    );

    let handle = orchestrator
        .send_message("Explain quantum computing mechanics in depth")
        .unwrap();
    handle.wait().await;

    let session = orchestrator.current_session().unwrap();
    assert_eq!(session.title, "Explain quantum computing mechanics in...");
}

#[tokio::test]
async fn test_second_send_cancels_the_first_turn() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, backend) = orchestrator_with(
        vec![
            ("A", Script::WaitForCancel),
            (
                "B",
                Script::Reply {
                    chunks: vec![],
                    reply: reply("Answer to B", Emotion::Neutral),
                },
            ),
        ],
        dir.path(),
    );

    let first = orchestrator.send_message("A").unwrap();
    let second = orchestrator.send_message("B").unwrap();
    first.wait().await;
    second.wait().await;

    let messages = orchestrator.messages();
    // Both user messages survive, but only B's turn was finalized.
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content, "A");
    assert_eq!(messages[1].content, "B");
    assert_eq!(messages[2].role, MessageRole::Assistant);
    assert_eq!(messages[2].content, "Answer to B");

    // A's request may be cancelled before it ever reaches the backend.
    assert!(backend.calls.load(Ordering::SeqCst) >= 1);
    assert!(!orchestrator.is_loading());
    assert!(orchestrator.error().is_none());
}

#[tokio::test]
async fn test_explicit_cancel_discards_the_placeholder_silently() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) =
        orchestrator_with(vec![("A", Script::WaitForCancel)], dir.path());

    let handle = orchestrator.send_message("A").unwrap();
    orchestrator.cancel();
    handle.wait().await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "A");
    assert_eq!(messages[0].role, MessageRole::User);

    assert!(!orchestrator.is_loading());
    assert!(orchestrator.error().is_none());

    // A cancelled turn never touches the persisted session.
    let persisted = persisted_sessions(dir.path());
    assert!(persisted.iter().all(|session| session.messages.is_empty()));
}

#[tokio::test]
async fn test_transport_failure_becomes_an_apologetic_reply() {
    let dir = tempfile::tempdir().unwrap();
    // Nothing listens here, so the request fails at the transport level.
    let client = CompletionClient::with_config(UpstreamConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: "test-key".to_string(),
        model: "command".to_string(),
        temperature: 0.7,
        max_tokens: 1000,
    });
    let store = ChatHistoryStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));
    let orchestrator = ChatOrchestrator::new(Arc::new(client), store);

    let handle = orchestrator.send_message("Hello out there").unwrap();
    handle.wait().await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1]
        .content
        .starts_with("I'm sorry, I encountered an error"));
    assert_eq!(messages[1].emotion, Some(Emotion::Concern));

    assert!(orchestrator.error().is_some());
    assert!(!orchestrator.is_loading());

    // Failed turns never reach the persisted session.
    let persisted = persisted_sessions(dir.path());
    assert!(persisted.iter().all(|session| session.messages.is_empty()));
}

#[tokio::test]
async fn test_clear_chat_truncates_but_keeps_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(
        vec![(
            "Hello",
            Script::Reply {
                chunks: vec![],
                reply: reply("Hi!", Emotion::Neutral),
            },
        )],
        dir.path(),
    );

    let handle = orchestrator.send_message("Hello").unwrap();
    handle.wait().await;

    let before = orchestrator.current_session().unwrap();
    assert_eq!(before.messages.len(), 2);

    orchestrator.clear_chat();

    let after = orchestrator.current_session().unwrap();
    assert!(orchestrator.messages().is_empty());
    assert!(after.messages.is_empty());
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert!(orchestrator.error().is_none());

    let persisted = persisted_sessions(dir.path());
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].messages.is_empty());
}

#[tokio::test]
async fn test_new_session_replaces_an_unused_one() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(vec![], dir.path());

    let bootstrap = orchestrator.current_session().unwrap();
    let fresh = orchestrator.create_new_session();

    let sessions = orchestrator.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, fresh.id);
    assert_ne!(bootstrap.id, fresh.id);

    let prefs = &fresh.user_preferences;
    assert_eq!(prefs.response_length, ResponseLength::Detailed);
    assert_eq!(prefs.tone, Tone::Casual);
    assert_eq!(prefs.language, "en");
    assert_eq!(prefs.theme, Theme::Dark);
    assert!(prefs.animations);
    assert!(prefs.sound_effects);
}

#[tokio::test]
async fn test_used_sessions_are_kept_when_a_new_one_starts() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(
        vec![(
            "Hello",
            Script::Reply {
                chunks: vec![],
                reply: reply("Hi!", Emotion::Neutral),
            },
        )],
        dir.path(),
    );

    let handle = orchestrator.send_message("Hello").unwrap();
    handle.wait().await;
    let used = orchestrator.current_session().unwrap();

    let fresh = orchestrator.create_new_session();

    let sessions = orchestrator.sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, fresh.id);
    assert_eq!(sessions[1].id, used.id);
    assert!(orchestrator.messages().is_empty());
}

#[tokio::test]
async fn test_load_session_restores_a_persisted_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(
        vec![(
            "Hello",
            Script::Reply {
                chunks: vec![],
                reply: reply("Hi!", Emotion::Neutral),
            },
        )],
        dir.path(),
    );

    let handle = orchestrator.send_message("Hello").unwrap();
    handle.wait().await;
    let used = orchestrator.current_session().unwrap();

    orchestrator.create_new_session();
    assert!(orchestrator.messages().is_empty());

    let loaded = orchestrator.load_session(used.id).unwrap();
    assert_eq!(loaded.id, used.id);
    assert_eq!(orchestrator.current_session().unwrap().id, used.id);
    assert_eq!(orchestrator.messages().len(), 2);
    assert!(orchestrator.error().is_none());
}

#[tokio::test]
async fn test_loading_an_unknown_session_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _backend) = orchestrator_with(vec![], dir.path());

    let current = orchestrator.current_session().unwrap();
    assert!(orchestrator.load_session(uuid::Uuid::new_v4()).is_none());
    assert_eq!(orchestrator.current_session().unwrap().id, current.id);
}

#[tokio::test]
async fn test_bootstrap_resumes_the_most_recent_session() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (orchestrator, _backend) = orchestrator_with(
            vec![(
                "Hello",
                Script::Reply {
                    chunks: vec![],
                    reply: reply("Hi!", Emotion::Neutral),
                },
            )],
            dir.path(),
        );
        let handle = orchestrator.send_message("Hello").unwrap();
        handle.wait().await;
    }

    let (resumed, _backend) = orchestrator_with(vec![], dir.path());
    let current = resumed.current_session().unwrap();
    assert_eq!(current.messages.len(), 2);
    assert_eq!(resumed.messages().len(), 2);
    assert_eq!(current.title, "Hello");
}
