use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub player_id: String,
    pub client_id: String,
    pub name: String,
    pub joined_ms: f64,
    pub last_input_ms: f64,
}

/// Registered players keyed by player id.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: Session) {
        self.write().insert(session.player_id.clone(), session);
    }

    /// Record activity. Returns false for unknown players.
    pub fn touch(&self, player_id: &str, now_ms: f64) -> bool {
        match self.write().get_mut(player_id) {
            Some(session) => {
                session.last_input_ms = session.last_input_ms.max(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, player_id: &str) -> Option<Session> {
        self.read().get(player_id).cloned()
    }

    pub fn by_client(&self, client_id: &str) -> Option<Session> {
        self.read()
            .values()
            .find(|session| session.client_id == client_id)
            .cloned()
    }

    pub fn remove(&self, player_id: &str) -> Option<Session> {
        self.write().remove(player_id)
    }

    /// Sessions whose last input is older than `timeout_ms` before `now_ms`.
    pub fn expired(&self, now_ms: f64, timeout_ms: f64) -> Vec<Session> {
        self.read()
            .values()
            .filter(|session| now_ms - session.last_input_ms > timeout_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
