//! In-memory conversation sessions
//!
//! Sessions live for the lifetime of the process. Each one sits behind its
//! own mutex; a turn holds that mutex until it has persisted its transcript.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::progress::TaskPlan;
use crate::ai::types::Message;
use crate::config::DEFAULT_SESSION_MAX;

/// One conversation
#[derive(Debug, Default)]
pub struct Session {
    pub messages: Vec<Message>,
    pub plan: TaskPlan,
}

impl Session {
    /// Replace the transcript, keeping only the newest `max` messages
    pub fn commit(&mut self, mut messages: Vec<Message>, max: usize) {
        trim_messages(&mut messages, max);
        self.messages = messages;
    }
}

/// Drop the oldest messages so at most `max` remain
pub fn trim_messages(messages: &mut Vec<Message>, max: usize) {
    if messages.len() > max {
        let excess = messages.len() - max;
        messages.drain(..excess);
    }
}

/// Returned when a session already has a turn in flight
#[derive(Debug, thiserror::Error)]
#[error("Session {0} is busy with another turn")]
pub struct SessionBusy(pub String);

/// Session id → session
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    max_messages: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_MAX)
    }
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Session for `id`, created empty if unknown
    pub async fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.to_string()).or_default())
    }

    /// Exclusive access for one turn. Fails instead of waiting if a turn is running.
    pub async fn acquire(&self, id: &str) -> Result<OwnedMutexGuard<Session>, SessionBusy> {
        self.get_or_create(id)
            .await
            .try_lock_owned()
            .map_err(|_| SessionBusy(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
