pub mod memory;

use futures::future::BoxFuture;

use crate::dao::{models::SessionEntity, storage::StorageResult};

/// Abstraction over the persistence layer for session roster snapshots.
///
/// Mutating commands write the full session snapshot through this trait
/// before any event is broadcast, so a client can never observe an event
/// for a state it cannot subsequently read.
pub trait RosterStore: Send + Sync {
    /// Persist (create or replace) a session snapshot.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a session snapshot once the session empties out.
    fn delete_session(&self, session_id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Load every persisted session snapshot, used to rebuild state at boot.
    fn load_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
