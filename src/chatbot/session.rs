//! Per-user conversation memory.
//!
//! Each user gets a bounded history of turns. The store hands out sessions
//! behind their own mutex, so holding a session lock serializes requests from
//! that user without blocking anyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chatbot::message::Turn;

/// Bounded, ordered history for one user.
#[derive(Debug)]
pub struct Session {
    user_id: i64,
    turns: Vec<Turn>,
    max_turns: usize,
}

impl Session {
    pub fn new(user_id: i64, max_history_pairs: usize) -> Self {
        Self {
            user_id,
            turns: Vec::new(),
            max_turns: max_history_pairs * 2,
        }
    }

    /// Append a turn, evicting the oldest turns once over capacity.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
            debug!("Trimmed {} turn(s) from session {}", excess, self.user_id);
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

struct Slot {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
}

/// In-memory map from user id to session.
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Slot>>,
    max_history_pairs: usize,
    /// Upper bound on live sessions (None = unbounded).
    max_sessions: Option<usize>,
}

impl SessionStore {
    pub fn new(max_history_pairs: usize, max_sessions: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history_pairs,
            max_sessions,
        }
    }

    /// Return the user's session, creating an empty one on first use.
    pub async fn get_or_create(&self, user_id: i64) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(slot) = sessions.get_mut(&user_id) {
            slot.last_used = Instant::now();
            return slot.session.clone();
        }

        if let Some(max) = self.max_sessions
            && sessions.len() >= max.max(1)
        {
            // Only evict idle sessions; a handed-out Arc means a request owns it.
            let oldest = sessions
                .iter()
                .filter(|(_, slot)| Arc::strong_count(&slot.session) == 1)
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    info!("Evicted least recently used session {}", id);
                }
                None => debug!("All {} sessions busy, exceeding cap of {}", sessions.len(), max),
            }
        }

        let session = Arc::new(Mutex::new(Session::new(user_id, self.max_history_pairs)));
        sessions.insert(
            user_id,
            Slot {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        info!("New session for user {} ({} active)", user_id, sessions.len());
        session
    }

    /// Look up a session without creating it.
    #[cfg(test)]
    pub async fn get(&self, user_id: i64) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.lock().await;
        sessions.get(&user_id).map(|slot| slot.session.clone())
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
