//! Session-keyed registry of independent pipeline states

use super::state::PipelineState;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub type SessionId = String;

/// Owns one [`PipelineState`] per session id.
///
/// The map lock is held only to look a session up; work on a state runs under
/// that session's own mutex so sessions never block each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    config: PipelineConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<PipelineState>>>>,
}

impl SessionStore {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a fresh, empty session
    pub fn create(&self) -> SessionId {
        let id = Uuid::new_v4().to_string();
        let state = PipelineState::new(self.config.clone());
        self.sessions.write().insert(id.clone(), Arc::new(Mutex::new(state)));
        info!(session = %id, "session created");
        id
    }

    fn get(&self, id: &str) -> Result<Arc<Mutex<PipelineState>>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))
    }

    /// Run `f` with exclusive access to one session's state
    pub fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut PipelineState) -> T) -> Result<T> {
        let session = self.get(id)?;
        let mut state = session.lock();
        Ok(f(&mut state))
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.sessions
            .write()
            .remove(id)
            .map(|_| info!(session = %id, "session removed"))
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))
    }

    /// Ids of all open sessions, sorted
    pub fn list(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    const CSV: &[u8] = b"a,b\n1,2\n3,4\n5,6\n";

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::default();
        let first = store.create();
        let second = store.create();
        assert_ne!(first, second);

        store.with_session(&first, |s| s.load_bytes(CSV, None)).unwrap().unwrap();
        assert_eq!(store.with_session(&first, |s| s.stage()).unwrap(), Stage::Loaded);
        assert_eq!(store.with_session(&second, |s| s.stage()).unwrap(), Stage::Empty);
    }

    #[test]
    fn test_unknown_session() {
        let store = SessionStore::default();
        let err = store.with_session("missing", |s| s.stage()).unwrap_err();
        assert!(matches!(err, PipelineError::SessionNotFound(_)));
        assert!(store.remove("missing").is_err());
    }

    #[test]
    fn test_remove_and_list() {
        let store = SessionStore::default();
        let id = store.create();
        store.create();
        assert_eq!(store.len(), 2);
        store.remove(&id).unwrap();
        assert_eq!(store.list().len(), 1);
        assert!(!store.list().contains(&id));
    }

    #[test]
    fn test_concurrent_sessions() {
        let store = Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = store.create();
                    store.with_session(&id, |s| s.load_bytes(CSV, None)).unwrap().unwrap();
                    id
                })
            })
            .collect();
        for handle in handles {
            let id = handle.join().unwrap();
            assert_eq!(store.with_session(&id, |s| s.info().shape).unwrap(), Some((3, 2)));
        }
        assert_eq!(store.len(), 4);
    }
}
