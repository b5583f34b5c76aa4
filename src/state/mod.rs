pub mod battle;
pub mod hub;
pub mod roster;

use std::{sync::Arc, time::Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::{
    config::AppConfig,
    dao::{
        models::SessionEntity,
        roster_store::{RosterStore, memory::MemoryRosterStore},
    },
    error::ServiceError,
    services::notifier::{InviteNotifier, LogNotifier},
    state::{
        battle::BattlePhase,
        hub::SessionHub,
        roster::{Roster, SessionRoster, TeamStatus},
    },
};

/// Cheaply cloneable handle to the shared application state.
pub type SharedState = Arc<AppState>;

/// Handle for an active countdown timer task, keyed by session id.
pub struct CountdownHandle {
    /// Spawned tick task; aborting it cancels the countdown.
    pub handle: JoinHandle<()>,
    /// When the countdown began.
    pub started_at: Instant,
}

/// Central application state: roster registry, session hub, countdown
/// timers, and the persistence backend.
pub struct AppState {
    config: AppConfig,
    roster: Roster,
    hub: SessionHub,
    store: Arc<dyn RosterStore>,
    notifier: Arc<dyn InviteNotifier>,
    countdowns: DashMap<String, CountdownHandle>,
}

impl AppState {
    /// Construct the state with the default in-process store, wrapped in an
    /// [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_store(config, Arc::new(MemoryRosterStore::new()))
    }

    /// Construct the state against a specific store backend.
    pub fn with_store(config: AppConfig, store: Arc<dyn RosterStore>) -> SharedState {
        Arc::new(Self {
            config,
            roster: Roster::new(),
            hub: SessionHub::new(),
            store,
            notifier: Arc::new(LogNotifier),
            countdowns: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Authoritative roster registry.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Fan-out hub for connected clients.
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Persistence backend.
    pub fn store(&self) -> &Arc<dyn RosterStore> {
        &self.store
    }

    /// Outbound invite notification channel.
    pub fn notifier(&self) -> &Arc<dyn InviteNotifier> {
        &self.notifier
    }

    /// Registry of running countdown timer tasks.
    pub fn countdowns(&self) -> &DashMap<String, CountdownHandle> {
        &self.countdowns
    }

    /// Abort and drop the session's countdown task, if one is running.
    pub fn abort_countdown(&self, session_id: &str) -> bool {
        match self.countdowns.remove(session_id) {
            Some((_, countdown)) => {
                countdown.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Write the session snapshot through to the store.
    ///
    /// Called under the session lock so the persisted mutation is durable
    /// before any event for it is broadcast. An emptied session deletes its
    /// snapshot instead.
    pub async fn persist_session(&self, roster: &SessionRoster) -> Result<(), ServiceError> {
        if roster.is_empty() {
            self.store.delete_session(roster.session_id.clone()).await?;
        } else {
            self.store.save_session(SessionEntity::from(roster)).await?;
        }
        Ok(())
    }

    /// Rebuild the in-memory registry from persisted snapshots at boot.
    ///
    /// Interrupted countdowns cannot survive a restart: affected sessions
    /// fall back to `PairedForming` with ready flags cleared, mirroring the
    /// countdown-abort path.
    pub async fn hydrate(&self) -> Result<usize, ServiceError> {
        let snapshots = self.store.load_sessions().await?;
        let count = snapshots.len();

        for snapshot in snapshots {
            let mut session: SessionRoster = snapshot.into();

            if matches!(
                session.phase,
                BattlePhase::BothReady | BattlePhase::Countdown
            ) {
                session.phase = BattlePhase::PairedForming;
                for team in session.teams.values_mut() {
                    if team.is_ready() {
                        team.status = TeamStatus::Forming;
                    }
                }
            }

            for team in session.teams.values() {
                self.roster.register_team(team.id, &session.session_id);
                for member in &team.members {
                    self.roster
                        .record_membership(member.user_id, &session.session_id, team.id);
                }
            }
            for request in session.join_requests.values() {
                if request.is_pending() {
                    self.roster
                        .claim_pending_request(request.requester_id, request.id);
                }
            }

            self.roster.install_session(session);
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::{battle::BattleEvent, roster::Team};

    #[tokio::test]
    async fn hydrate_rebuilds_sessions_and_indexes() {
        let store = Arc::new(MemoryRosterStore::new());
        let state = AppState::with_store(AppConfig::default(), store.clone());

        let team_id = {
            let handle = state.roster().session_or_create("s1");
            let mut session = handle.lock().await;
            let mut team = Team::new("s1", "Alpha", 1, "ada", SystemTime::now());
            team.add_member(2, "bob", SystemTime::now()).unwrap();
            let team_id = team.id;
            session.teams.insert(team_id, team);
            state.persist_session(&session).await.unwrap();
            team_id
        };

        let restored = AppState::with_store(AppConfig::default(), store);
        assert_eq!(restored.hydrate().await.unwrap(), 1);
        assert_eq!(restored.roster().session_of_team(team_id), Some("s1".into()));
        assert_eq!(restored.roster().memberships_of(2), vec![("s1".into(), team_id)]);

        let handle = restored.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.teams.len(), 1);
    }

    #[tokio::test]
    async fn hydrate_rolls_an_interrupted_countdown_back_to_forming() {
        let store = Arc::new(MemoryRosterStore::new());
        let state = AppState::with_store(AppConfig::default(), store.clone());

        {
            let handle = state.roster().session_or_create("s1");
            let mut session = handle.lock().await;
            let mut side_a = Team::new("s1", "Alpha", 1, "ada", SystemTime::now());
            side_a.status = TeamStatus::Ready;
            let mut side_b = Team::new("s1", "Beta", 2, "bob", SystemTime::now());
            side_b.status = TeamStatus::Ready;
            session.teams.insert(side_a.id, side_a);
            session.teams.insert(side_b.id, side_b);
            session.apply_phase(BattleEvent::OpponentJoined).unwrap();
            session.apply_phase(BattleEvent::BothTeamsReady).unwrap();
            session.apply_phase(BattleEvent::CountdownStarted).unwrap();
            state.persist_session(&session).await.unwrap();
        }

        let restored = AppState::with_store(AppConfig::default(), store);
        restored.hydrate().await.unwrap();

        let handle = restored.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.phase, BattlePhase::PairedForming);
        assert!(session.teams.values().all(|team| !team.is_ready()));
    }
}
