//! Trait abstractions for runtime I/O

use crate::db::Database;
use crate::state_machine::SessionState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Durable per-session state, read and written once per turn
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` for a session that was never saved
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, String>;

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), String>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, String> {
        (**self).load(session_id).await
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), String> {
        (**self).save(session_id, state).await
    }
}

// ============================================================================
// SQLite implementation
// ============================================================================

/// Checkpoints kept in the sessions table
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    db: Database,
}

impl SqliteCheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, String> {
        self.db
            .get_session(session_id)
            .map(|row| row.map(|r| r.state))
            .map_err(|e| e.to_string())
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), String> {
        self.db
            .save_session(session_id, state)
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Checkpoints that live as long as the process
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, String> {
        let sessions = self.sessions.lock().map_err(|e| e.to_string())?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), String> {
        let mut sessions = self.sessions.lock().map_err(|e| e.to_string())?;
        sessions.insert(session_id.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::NextStep;

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let store = SqliteCheckpointStore::new(Database::open_in_memory().unwrap());
        assert_eq!(store.load("s1").await.unwrap(), None);

        let state = SessionState {
            next_step: NextStep::CollectVehicleData,
            ..Default::default()
        };
        store.save("s1", &state).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_in_memory_store_overwrites() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(store.load("s1").await.unwrap(), None);

        let mut state = SessionState::default();
        store.save("s1", &state).await.unwrap();
        state.eligibility_notified = true;
        store.save("s1", &state).await.unwrap();

        assert_eq!(store.load("s1").await.unwrap(), Some(state));
        assert_eq!(store.load("s2").await.unwrap(), None);
    }
}
