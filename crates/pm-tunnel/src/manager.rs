//! Session registry for one tunnel
//!
//! Invariant: a session is reachable from the registry if and only if it has
//! not yet completed its one-time destroy sequence. `remove` returning true
//! is the arbitration signal deciding which destroy caller notifies the peer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::session::Session;
use pm_protocol::SessionId;

/// Registry of active sessions on one tunnel
pub struct SessionManager {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Next id to hand out
    next_id: AtomicU32,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Allocate the next session id.
    ///
    /// The counter wraps to 0 at the sentinel without checking the registry
    /// for a still-live holder; ids are only unique while fewer than the
    /// wraparound threshold of sessions are allocated on one tunnel.
    pub fn allocate_id(&self) -> SessionId {
        let id = self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(SessionId::new(v).wrapping_next().as_u32())
            })
            .unwrap_or_default();
        SessionId::new(id)
    }

    /// Register a session without starting it.
    ///
    /// Refuses to displace a live session already holding the id; returns
    /// whether the session was inserted.
    pub fn insert(&self, session: Arc<Session>) -> bool {
        match self.sessions.entry(session.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    /// Register a session and immediately start it. Returns false without
    /// starting when the id is already taken.
    ///
    /// Start failure destroys the session so the peer's mirrored session
    /// tears down too.
    pub fn insert_and_start(&self, session: Arc<Session>) -> bool {
        if !self.insert(Arc::clone(&session)) {
            return false;
        }
        tokio::spawn(async move {
            if let Err(e) = session.start().await {
                tracing::warn!(id = %session.id(), "session start failed: {}", e);
                session.destroy(true);
            }
        });
        true
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| Arc::clone(&r))
    }

    /// Remove a session by ID. Returns true iff an entry existed.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Snapshot of all registered sessions (for teardown cascade)
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&self, value: u32) {
        self.next_id.store(value, Ordering::Release);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
