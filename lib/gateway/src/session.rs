//! Gateway session manager: a thread-safe table keyed by `SessionId`
//! implementing the per-connection state machine. Every method returns a
//! bool rather than throwing, so the gateway server translates failure to
//! the appropriate error kind at the call site.

use aether::SessionId;
use authsvc::Claims;
use hashbrown::HashMap;
use std::sync::RwLock;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Migrating,
    Disconnecting,
}

#[derive(Clone, Debug)]
pub struct ClientSession {
    pub id: SessionId,
    pub state: SessionState,
    pub claims: Option<Claims>,
    pub user_id: u64,
    pub peer_address: String,
    pub current_service: Option<String>,
    pub connected_at: u64,
    pub last_activity: u64,
}

impl ClientSession {
    fn new(id: SessionId, peer_address: String, now: u64) -> Self {
        ClientSession {
            id,
            state: SessionState::Unauthenticated,
            claims: None,
            user_id: 0,
            peer_address,
            current_service: None,
            connected_at: now,
            last_activity: now,
        }
    }
}

pub struct SessionManager {
    max_sessions: usize,
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        SessionManager {
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fails if capacity is reached or the id is already present.
    pub fn create_session(&self, id: SessionId, peer_address: impl Into<String>, now: u64) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.len() >= self.max_sessions || sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id, ClientSession::new(id, peer_address.into(), now));
        true
    }

    pub fn get(&self, id: SessionId) -> Option<ClientSession> {
        self.sessions.read().unwrap().get(&id).cloned()
    }

    /// Fails unless current state is Unauthenticated.
    pub fn authenticate_session(&self, id: SessionId, claims: Claims, user_id: u64, now: u64) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) if session.state == SessionState::Unauthenticated => {
                session.state = SessionState::Authenticated;
                session.claims = Some(claims);
                session.user_id = user_id;
                session.last_activity = now;
                true
            }
            _ => false,
        }
    }

    /// Idempotent; updates `lastActivity`.
    pub fn touch_session(&self, id: SessionId, now: u64) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Fails unless Authenticated.
    pub fn begin_migration(&self, id: SessionId, service: impl Into<String>) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) if session.state == SessionState::Authenticated => {
                session.state = SessionState::Migrating;
                session.current_service = Some(service.into());
                true
            }
            _ => false,
        }
    }

    /// Fails unless Migrating.
    pub fn complete_migration(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) if session.state == SessionState::Migrating => {
                session.state = SessionState::Authenticated;
                true
            }
            _ => false,
        }
    }

    /// No-op if the session is not present.
    pub fn remove_session(&self, id: SessionId) {
        self.sessions.write().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Authenticated sessions idle for longer than `timeout` seconds.
    pub fn find_idle_sessions(&self, timeout: u64, now: u64) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.state == SessionState::Authenticated && now.saturating_sub(s.last_activity) > timeout)
            .map(|s| s.id)
            .collect()
    }

    /// Unauthenticated sessions that connected more than `timeout` seconds
    /// ago without authenticating.
    pub fn find_expired_auth_sessions(&self, timeout: u64, now: u64) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.state == SessionState::Unauthenticated && now.saturating_sub(s.connected_at) > timeout)
            .map(|s| s.id)
            .collect()
    }
}
