use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{SessionError, Status};
use crate::session::{Session, SessionId};

/// Tracks the sessions that are currently in flight.
///
/// Registering a session returns a guard that removes the entry when the call is
/// over, whichever way it ended.
#[derive(Default)]
pub struct SessionMap {
    sessions: DashMap<SessionId, Session, ahash::RandomState>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `session`. Returns a guard that stops tracking it on drop.
    pub fn try_register(self: &Arc<Self>, session: &Session) -> Result<SessionGuard, SessionError> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(session.id()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyActive(session.id())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(SessionGuard {
                    id: session.id(),
                    map: Arc::clone(self),
                })
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel every tracked session. Returns how many were still open.
    pub fn cancel_all(&self, reason: &Status) -> usize {
        // Collect first so no shard lock is held while sessions wake their waiters.
        let sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        sessions
            .iter()
            .filter(|session| session.cancel(reason.clone()))
            .count()
    }

    fn remove(&self, id: &SessionId) {
        self.sessions.remove(id);
    }
}

/// Keeps a session tracked. When dropped, the entry is removed.
pub struct SessionGuard {
    id: SessionId,
    map: Arc<SessionMap>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard").field("id", &self.id).finish()
    }
}
