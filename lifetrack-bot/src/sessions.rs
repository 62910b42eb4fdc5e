//! In-memory per-chat state. Nothing here survives a restart.

use chrono::NaiveDateTime;
use dashmap::DashMap;

use crate::graphql::models::User;

/// Event prepared from a template, waiting for the user to confirm or
/// rename it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTemplate {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub event_type: String,
}

/// What the next plain-text message from a chat should be used for
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PendingInput {
    #[default]
    None,
    Note,
    NoteSearch,
    Event,
    EventTitle(EventTemplate),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub auth_token: Option<String>,
    pub user: Option<User>,
    pub current_directory: String,
    pub pending: PendingInput,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            auth_token: None,
            user: None,
            current_directory: "/".to_string(),
            pending: PendingInput::None,
        }
    }
}

impl ChatSession {
    pub fn is_logged_in(&self) -> bool {
        self.auth_token.is_some()
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<i64, ChatSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a chat's state
    pub fn get(&self, chat_id: i64) -> ChatSession {
        self.sessions
            .get(&chat_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn token(&self, chat_id: i64) -> Option<String> {
        self.sessions.get(&chat_id).and_then(|s| s.auth_token.clone())
    }

    pub fn login(&self, chat_id: i64, token: String, user: Option<User>) {
        let mut session = self.sessions.entry(chat_id).or_default();
        session.auth_token = Some(token);
        session.user = user;
        log::info!("[SESSIONS] Chat {} logged in", chat_id);
    }

    /// Drop all state for a chat. Returns whether it was logged in.
    pub fn logout(&self, chat_id: i64) -> bool {
        let was_logged_in = self
            .sessions
            .remove(&chat_id)
            .map(|(_, s)| s.is_logged_in())
            .unwrap_or(false);
        if was_logged_in {
            log::info!("[SESSIONS] Chat {} logged out", chat_id);
        }
        was_logged_in
    }

    /// Replaces any input the chat was already waiting for.
    pub fn set_pending(&self, chat_id: i64, pending: PendingInput) {
        self.sessions.entry(chat_id).or_default().pending = pending;
    }

    pub fn take_pending(&self, chat_id: i64) -> PendingInput {
        self.sessions
            .get_mut(&chat_id)
            .map(|mut s| std::mem::take(&mut s.pending))
            .unwrap_or_default()
    }

    pub fn current_directory(&self, chat_id: i64) -> String {
        self.sessions
            .get(&chat_id)
            .map(|s| s.current_directory.clone())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn set_current_directory(&self, chat_id: i64, directory: &str) -> String {
        let directory = normalize_directory(directory);
        self.sessions.entry(chat_id).or_default().current_directory = directory.clone();
        directory
    }

    /// Chats holding a token, for the notification poller
    pub fn logged_in(&self) -> Vec<(i64, String)> {
        self.sessions
            .iter()
            .filter_map(|entry| entry.auth_token.clone().map(|t| (*entry.key(), t)))
            .collect()
    }
}

/// Leading slash, no trailing slash, `/` for root.
pub fn normalize_directory(directory: &str) -> String {
    let trimmed = directory.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
