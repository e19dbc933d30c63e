//! Conversation memory and per-session ownership.
//!
//! [`ConversationMemory`] is an append-only transcript. It is passed by
//! `&mut` into [`crate::answer::Answerer::answer`], so whoever owns it
//! decides its scope. [`SessionStore`] gives each session its own memory
//! behind its own async mutex: requests on different sessions never touch
//! the same transcript, and requests on one session are serialized.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::models::ConversationTurn;

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.turns.push(ConversationTurn::new(input, output));
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render the transcript for a prompt, one `Human:`/`AI:` pair per turn.
    pub fn render_history(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("Human: {}\nAI: {}", t.input, t.output))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Shared handle to one session's memory.
pub type SessionHandle = Arc<Mutex<ConversationMemory>>;

struct SessionEntry {
    memory: SessionHandle,
    last_used: Instant,
}

/// Session id → conversation memory, for the lifetime of the process.
///
/// Holds at most `max_sessions` entries; adding one more evicts the session
/// that was used least recently.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Handle for `id`, creating an empty memory on first use.
    pub async fn get_or_create(&self, id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.last_used = Instant::now();
            return entry.memory.clone();
        }
        let memory = Arc::new(Mutex::new(ConversationMemory::new()));
        self.insert_locked(&mut sessions, id, memory.clone());
        memory
    }

    /// Store a memory built outside the store under `id`, replacing any
    /// existing session with that id.
    pub async fn insert(&self, id: &str, memory: ConversationMemory) -> SessionHandle {
        let handle = Arc::new(Mutex::new(memory));
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id);
        self.insert_locked(&mut sessions, id, handle.clone());
        handle
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(id).map(|e| e.memory.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn insert_locked(
        &self,
        sessions: &mut HashMap<String, SessionEntry>,
        id: &str,
        memory: SessionHandle,
    ) {
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!(session = %oldest, "evicting least recently used session");
            sessions.remove(&oldest);
        }
        sessions.insert(
            id.to_string(),
            SessionEntry {
                memory,
                last_used: Instant::now(),
            },
        );
    }
}
