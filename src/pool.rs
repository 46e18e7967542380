//! Ownership-tracked reuse of session allocations.
//!
//! Accept and connect loops go through a [`SessionPool`] instead of
//! constructing a fresh [`Session`] per connection: [`SessionPool::checkout`]
//! leases a recycled session (or builds one when none is idle), and
//! [`SessionPool::release`] takes it back once its flow has finished. A
//! session that was not recycled cleanly is discarded rather than reused, so
//! no connection ever observes another connection's state.

use std::sync::Arc;

use tracing::trace;

use crate::session::{Role, Session, SessionConfig};

/// Pool of idle, recycled sessions sharing one configuration.
#[derive(Debug)]
pub struct SessionPool {
    config: Arc<SessionConfig>,
    idle: Vec<Session>,
}

impl SessionPool {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self { config, idle: Vec::new() }
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn idle_sessions(&self) -> usize {
        self.idle.len()
    }

    /// Leases a session for a new connection in the given role.
    pub fn checkout(&mut self, role: Role) -> Session {
        match self.idle.pop() {
            Some(mut session) => {
                trace!(idle = self.idle.len(), "reusing pooled session");
                session.lease(role);
                session
            }
            None => Session::new(role, self.config.clone()),
        }
    }

    /// Returns a session whose flow has finished. Only sessions the flow
    /// recycled are kept; anything else is discarded.
    pub fn release(&mut self, session: Session) {
        if session.is_free() {
            self.idle.push(session);
        }
    }
}
