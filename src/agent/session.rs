use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::llm::types::{ChatMessage, ToolCall};

/// One chat conversation. Held in memory only; conversation persistence is
/// deliberately out of scope.
#[derive(Debug, Default)]
pub struct ChatSession {
    pub messages: Vec<ChatMessage>,
    /// Tool call parked until a human approves or rejects it.
    pub pending: Option<ToolCall>,
}

/// In-memory session registry keyed by UUID. Each session carries its own
/// lock so concurrent conversations never contend with each other.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<ChatSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session, creating it when `id` is None or unknown.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Arc<Mutex<ChatSession>>) {
        let mut map = self.inner.lock().await;
        let id = id.unwrap_or_else(Uuid::new_v4);
        let session = map
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatSession::default())))
            .clone();
        (id, session)
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<ChatSession>>> {
        self.inner.lock().await.get(&id).cloned()
    }
}
