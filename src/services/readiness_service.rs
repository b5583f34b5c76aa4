//! Readiness flags and the synchronized countdown into the match.
//!
//! The countdown task is owned by the same session whose phase it governs:
//! it re-acquires the session lock before transitioning, so a timer firing
//! and a concurrent client command are automatically serialized. Completion
//! and cancellation are mutually exclusive outcomes of the same timer.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::events::{TeamReadyEntry, TeamReadyStatusEvent},
    error::ServiceError,
    services::hub_events,
    state::{
        CountdownHandle, SharedState,
        battle::{BattleEvent, BattlePhase},
        roster::{SessionRoster, TeamStatus, UserId},
    },
};

/// Ready-flag snapshot of every team in the session, broadcast full-value.
pub(crate) fn ready_snapshot(session: &SessionRoster) -> TeamReadyStatusEvent {
    TeamReadyStatusEvent {
        session_id: session.session_id.clone(),
        phase: session.phase.into(),
        teams: session
            .teams
            .values()
            .map(|team| TeamReadyEntry {
                team_id: team.id,
                name: team.name.clone(),
                ready: team.is_ready(),
            })
            .collect(),
    }
}

/// Set or clear a team's ready flag; captain only.
///
/// Setting the second flag transitions the session into the countdown in
/// the same command, so "both flags true" and "timer started" are one
/// atomic observation and the countdown can never start twice.
pub async fn set_ready(
    state: &SharedState,
    user_id: UserId,
    team_id: Uuid,
    ready: bool,
) -> Result<TeamReadyStatusEvent, ServiceError> {
    let session_id = state
        .roster()
        .session_of_team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    let handle = state
        .roster()
        .session(&session_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let mut session = handle.lock().await;

    let team = session
        .team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    if team.captain_id != user_id {
        return Err(ServiceError::Forbidden(
            "only the captain can change the team's ready flag".into(),
        ));
    }
    let already_ready = team.is_ready();

    if ready {
        match session.phase {
            BattlePhase::Unpaired => Err(ServiceError::Conflict(
                "an opponent team must join before readying up".into(),
            )),
            BattlePhase::Started => Err(ServiceError::Conflict(
                "the battle already started".into(),
            )),
            // Both flags are already up; repeating the command is a no-op
            // and must not spawn a second timer.
            BattlePhase::BothReady | BattlePhase::Countdown => Ok(ready_snapshot(&session)),
            BattlePhase::PairedForming => {
                if already_ready {
                    return Ok(ready_snapshot(&session));
                }

                session
                    .team_mut(team_id)
                    .expect("team presence checked above")
                    .status = TeamStatus::Ready;

                let both_ready =
                    session.teams.len() == 2 && session.teams.values().all(|t| t.is_ready());
                if both_ready {
                    session.apply_phase(BattleEvent::BothTeamsReady)?;
                    session.apply_phase(BattleEvent::CountdownStarted)?;
                }

                state.persist_session(&session).await?;
                let snapshot = ready_snapshot(&session);
                drop(session);

                hub_events::broadcast_team_ready_status(state, snapshot.clone());
                if both_ready {
                    info!(session_id = %session_id, "both teams ready; starting countdown");
                    start_countdown(state, &session_id);
                }
                Ok(snapshot)
            }
        }
    } else {
        match session.phase {
            BattlePhase::Started => Err(ServiceError::Conflict(
                "the battle already started".into(),
            )),
            BattlePhase::Unpaired | BattlePhase::PairedForming => {
                if !already_ready {
                    return Ok(ready_snapshot(&session));
                }
                session
                    .team_mut(team_id)
                    .expect("team presence checked above")
                    .status = TeamStatus::Forming;
                state.persist_session(&session).await?;
                let snapshot = ready_snapshot(&session);
                drop(session);

                hub_events::broadcast_team_ready_status(state, snapshot.clone());
                Ok(snapshot)
            }
            BattlePhase::BothReady | BattlePhase::Countdown => {
                state.abort_countdown(&session_id);
                session.apply_phase(BattleEvent::CountdownAborted)?;
                session
                    .team_mut(team_id)
                    .expect("team presence checked above")
                    .status = TeamStatus::Forming;
                state.persist_session(&session).await?;
                let snapshot = ready_snapshot(&session);
                drop(session);

                info!(session_id = %session_id, "ready flag cleared; countdown aborted");
                hub_events::broadcast_team_ready_status(state, snapshot.clone());
                Ok(snapshot)
            }
        }
    }
}

/// Spawn the countdown tick task for a session, exactly once.
pub(crate) fn start_countdown(state: &SharedState, session_id: &str) {
    match state.countdowns().entry(session_id.to_string()) {
        Entry::Occupied(_) => {
            // A timer is already running for this session.
        }
        Entry::Vacant(slot) => {
            let task_state = state.clone();
            let task_session = session_id.to_string();
            let seconds = state.config().countdown_seconds();
            let handle =
                tokio::spawn(async move { run_countdown(task_state, task_session, seconds).await });
            slot.insert(CountdownHandle {
                handle,
                started_at: Instant::now(),
            });
        }
    }
}

async fn run_countdown(state: SharedState, session_id: String, seconds: u32) {
    for remaining in (1..=seconds).rev() {
        hub_events::broadcast_countdown_tick(&state, &session_id, remaining);
        sleep(Duration::from_secs(1)).await;
    }

    finish_countdown(&state, &session_id).await;
    state.countdowns().remove(&session_id);
}

/// Transition the session into the match once the timer reaches zero.
///
/// The phase check under the lock decides the race against a concurrent
/// abort: whichever side loses observes a terminal phase and backs off.
async fn finish_countdown(state: &SharedState, session_id: &str) {
    let Some(handle) = state.roster().session(session_id) else {
        return;
    };
    let mut session = handle.lock().await;

    if session.phase != BattlePhase::Countdown {
        // Aborted while this task was waiting for its final second.
        return;
    }
    if let Err(err) = session.apply_phase(BattleEvent::CountdownFinished) {
        warn!(session_id, error = %err, "countdown completion rejected");
        return;
    }
    for team in session.teams.values_mut() {
        team.status = TeamStatus::Playing;
    }
    if let Err(err) = state.persist_session(&session).await {
        warn!(session_id, error = %err, "failed to persist countdown completion");
    }
    drop(session);

    info!(session_id, "countdown finished; handing the session to the match runner");
    hub_events::broadcast_countdown_tick(state, session_id, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::{
            invitation::{InvitationKindDto, InviteRequest, RespondInvitationRequest},
            team::{CreateTeamRequest, TeamSummary},
        },
        services::{invitation_service, team_service},
        state::{AppState, hub::ClientConnection},
    };
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    async fn paired(state: &SharedState) -> (TeamSummary, TeamSummary) {
        let side_a = team_service::create_team(
            state,
            1,
            "ada",
            "s1",
            CreateTeamRequest { name: "Alpha".into() },
        )
        .await
        .unwrap();

        let invitation = invitation_service::create_invitation(
            state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 2,
                kind: InvitationKindDto::Opponent,
            },
        )
        .await
        .unwrap();
        invitation_service::respond_invitation(
            state,
            2,
            "bob",
            invitation.id,
            RespondInvitationRequest {
                accept: true,
                team_name: Some("Beta".into()),
            },
        )
        .await
        .unwrap();

        let teams = team_service::list_teams(state, "s1").await.unwrap();
        let side_b = teams
            .iter()
            .find(|team| team.name == "Beta")
            .cloned()
            .unwrap();
        (side_a, side_b)
    }

    fn watch_session(state: &SharedState, user_id: i64) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.hub().register(ClientConnection { user_id, tx });
        state.hub().subscribe("s1", user_id);
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(text.to_string());
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn both_ready_runs_the_countdown_to_started() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired(&state).await;
        let mut rx = watch_session(&state, 99);

        set_ready(&state, 1, side_a.id, true).await.unwrap();
        let snapshot = set_ready(&state, 2, side_b.id, true).await.unwrap();
        assert_eq!(
            snapshot.phase,
            crate::dto::team::BattlePhaseDto::Countdown
        );

        // Let the paused clock auto-advance through the five ticks.
        sleep(Duration::from_secs(7)).await;

        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.phase, BattlePhase::Started);
        assert!(
            session
                .teams
                .values()
                .all(|team| team.status == TeamStatus::Playing)
        );
        drop(session);
        assert!(state.countdowns().get("s1").is_none());

        let frames = drain(&mut rx);
        let ticks: Vec<String> = frames
            .into_iter()
            .filter(|frame| frame.contains("team_battle_countdown"))
            .collect();
        assert_eq!(ticks.len(), 6);
        for (tick, expected) in ticks.iter().zip([5u32, 4, 3, 2, 1, 0]) {
            assert!(
                tick.contains(&format!("\"remaining_seconds\":{expected}")),
                "unexpected tick order: {tick}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_the_ready_command_starts_only_one_timer() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired(&state).await;
        let mut rx = watch_session(&state, 99);

        set_ready(&state, 1, side_a.id, true).await.unwrap();
        set_ready(&state, 2, side_b.id, true).await.unwrap();
        // Duplicate ready commands with both flags already true.
        set_ready(&state, 1, side_a.id, true).await.unwrap();
        set_ready(&state, 2, side_b.id, true).await.unwrap();

        sleep(Duration::from_secs(7)).await;

        let frames = drain(&mut rx);
        let zero_ticks = frames
            .iter()
            .filter(|frame| {
                frame.contains("team_battle_countdown") && frame.contains("\"remaining_seconds\":0")
            })
            .count();
        assert_eq!(zero_ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_a_flag_aborts_the_countdown() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired(&state).await;

        set_ready(&state, 1, side_a.id, true).await.unwrap();
        set_ready(&state, 2, side_b.id, true).await.unwrap();
        assert!(state.countdowns().get("s1").is_some());

        let snapshot = set_ready(&state, 1, side_a.id, false).await.unwrap();
        assert_eq!(
            snapshot.phase,
            crate::dto::team::BattlePhaseDto::PairedForming
        );
        assert!(state.countdowns().get("s1").is_none());

        // Even well past the original deadline, the session never starts.
        sleep(Duration::from_secs(30)).await;
        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.phase, BattlePhase::PairedForming);
        let side_b_team = session.team(side_b.id).unwrap();
        assert!(side_b_team.is_ready());
        assert!(!session.team(side_a.id).unwrap().is_ready());
    }

    #[tokio::test]
    async fn ready_requires_an_opponent() {
        let state = AppState::new(AppConfig::default());
        let side_a = team_service::create_team(
            &state,
            1,
            "ada",
            "s1",
            CreateTeamRequest { name: "Alpha".into() },
        )
        .await
        .unwrap();

        let err = set_ready(&state, 1, side_a.id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn ready_is_captain_only() {
        let state = AppState::new(AppConfig::default());
        let (side_a, _) = paired(&state).await;

        let err = set_ready(&state, 42, side_a.id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
