//! Per-resource registry of live session cancellation tokens.

use std::collections::HashMap;

use parking_lot::Mutex;
use tether_core::{SessionError, SessionId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tracks the sessions attached to one resource.
///
/// Deleting the resource calls [`SessionRegistry::cancel_all`], which
/// cancels every registered token and empties the map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if the id is already present.
    pub fn push(&self, id: SessionId, token: CancellationToken) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id));
        }
        let _ = sessions.insert(id, token);
        Ok(())
    }

    /// Deregister a session. Returns `false` if it was not present.
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    /// Cancel and drop every registered session. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        for (id, token) in &drained {
            debug!(session_id = %id, "cancelling session");
            token.cancel();
        }
        drained.len()
    }

    /// Whether a session is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn push_and_remove() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.push(id.clone(), CancellationToken::new()).unwrap();
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_push_rejected() {
        let registry = SessionRegistry::new();
        let id = SessionId::from("s-1");
        registry.push(id.clone(), CancellationToken::new()).unwrap();

        let err = registry.push(id, CancellationToken::new()).unwrap_err();
        assert_matches!(err, SessionError::DuplicateSession(dup) if dup.as_str() == "s-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_all_cancels_and_clears() {
        let registry = SessionRegistry::new();
        let tokens: Vec<_> = (0..3).map(|_| CancellationToken::new()).collect();
        for token in &tokens {
            registry.push(SessionId::new(), token.clone()).unwrap();
        }

        assert_eq!(registry.cancel_all(), 3);
        assert!(registry.is_empty());
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
    }

    #[test]
    fn remove_after_cancel_all_is_noop() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.push(id.clone(), CancellationToken::new()).unwrap();
        let _ = registry.cancel_all();
        assert!(!registry.remove(&id));
    }
}
