//! Process-local roster store used as the default backend and in tests.

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{models::SessionEntity, roster_store::RosterStore, storage::StorageResult};

/// In-memory [`RosterStore`] keeping snapshots in a concurrent map.
///
/// Operations never fail; the trait's error channel exists for backends
/// that talk to real databases.
#[derive(Debug, Default)]
pub struct MemoryRosterStore {
    sessions: DashMap<String, SessionEntity>,
}

impl MemoryRosterStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl RosterStore for MemoryRosterStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.sessions.insert(session.session_id.clone(), session);
        Box::pin(async { Ok(()) })
    }

    fn delete_session(&self, session_id: String) -> BoxFuture<'static, StorageResult<()>> {
        self.sessions.remove(&session_id);
        Box::pin(async { Ok(()) })
    }

    fn load_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let sessions = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        Box::pin(async move { Ok(sessions) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::BattlePhaseEntity;

    fn snapshot(session_id: &str) -> SessionEntity {
        SessionEntity {
            session_id: session_id.to_string(),
            phase: BattlePhaseEntity::Unpaired,
            pairing: None,
            teams: Vec::new(),
            invitations: Vec::new(),
            join_requests: Vec::new(),
        }
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let store = MemoryRosterStore::new();
        store.save_session(snapshot("s1")).await.unwrap();

        let mut updated = snapshot("s1");
        updated.phase = BattlePhaseEntity::PairedForming;
        store.save_session(updated).await.unwrap();

        let sessions = store.load_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phase, BattlePhaseEntity::PairedForming);
    }

    #[tokio::test]
    async fn delete_removes_snapshot() {
        let store = MemoryRosterStore::new();
        store.save_session(snapshot("s1")).await.unwrap();
        store.save_session(snapshot("s2")).await.unwrap();

        store.delete_session("s1".into()).await.unwrap();

        let sessions = store.load_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "s2");
    }
}
