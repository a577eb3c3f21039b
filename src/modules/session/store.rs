use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::modules::session::model::ChatSession;

pub const SESSIONS_KEY: &str = "chat-sessions";

/// Opaque durable dictionary; the store never assumes anything beyond
/// get/set of whole string values.
pub trait KvStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        fs::write(self.path_for(key), value)
    }
}

#[derive(Clone)]
pub struct ChatHistoryStore {
    storage: Arc<dyn KvStorage>,
}

impl ChatHistoryStore {
    pub fn new(storage: Arc<dyn KvStorage>) -> Self {
        Self { storage }
    }

    // The whole session list is the unit of persistence. Write failures are
    // logged and swallowed; in-memory state stays authoritative for the rest
    // of the process lifetime.
    pub fn save(&self, sessions: &[ChatSession]) {
        let json = match serde_json::to_string(sessions) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize chat sessions");
                return;
            }
        };

        if let Err(err) = self.storage.set(SESSIONS_KEY, &json) {
            tracing::warn!(error = %err, "failed to persist chat sessions");
        }
    }

    pub fn load(&self, default: Vec<ChatSession>) -> Vec<ChatSession> {
        let Some(raw) = self.storage.get(SESSIONS_KEY) else {
            return default;
        };

        match serde_json::from_str(&raw) {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse persisted chat sessions");
                default
            }
        }
    }
}
