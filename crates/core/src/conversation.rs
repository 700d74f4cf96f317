use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_MEMORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn label(self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Sliding window over the most recent `max_exchanges` question/answer pairs.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<ChatTurn>,
    max_exchanges: usize,
}

impl ChatHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_exchanges.saturating_mul(2)),
            max_exchanges,
        }
    }

    pub fn max_exchanges(&self) -> usize {
        self.max_exchanges
    }

    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push_back(ChatTurn::new(ChatRole::User, question));
        self.turns.push_back(ChatTurn::new(ChatRole::Assistant, answer));

        let limit = self.max_exchanges.saturating_mul(2);
        while self.turns.len() > limit {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

pub fn render_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-session chat histories. Sessions never share turns.
#[derive(Debug)]
pub struct SessionStore {
    window: usize,
    sessions: RwLock<HashMap<Uuid, ChatHistory>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WINDOW)
    }
}

impl SessionStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(id, ChatHistory::new(self.window));
        id
    }

    /// Unknown sessions read as empty and are not created.
    pub async fn history(&self, session: Uuid) -> Vec<ChatTurn> {
        self.sessions
            .read()
            .await
            .get(&session)
            .map(ChatHistory::turns)
            .unwrap_or_default()
    }

    pub async fn record_exchange(&self, session: Uuid, question: &str, answer: &str) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session)
            .or_insert_with(|| ChatHistory::new(self.window))
            .push_exchange(question, answer);
    }

    pub async fn clear(&self, session: Uuid) {
        if let Some(history) = self.sessions.write().await.get_mut(&session) {
            history.clear();
        }
    }

    pub async fn remove(&self, session: Uuid) -> bool {
        self.sessions.write().await.remove(&session).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
