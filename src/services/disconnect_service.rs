//! Disconnect detection effects and reconnect recovery.
//!
//! Nothing here fires on a mere socket close: the WebSocket lifecycle only
//! calls [`handle_leaving`] on an explicit leaving signal or a heartbeat
//! timeout, so a page refresh keeps the roster intact and is repaired by
//! [`handle_reconnect`] when the client identifies again.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{
            BattleCancelledEvent, OpponentDisconnectedEvent,
            OpponentTeamMemberDisconnectedEvent, StateRestoredEvent, TeamUpdatedEvent,
            TeammateDisconnectedEvent,
        },
        team::{BattleSummary, TeamSummary},
    },
    error::ServiceError,
    services::{expiry_sweeper, hub_events, readiness_service},
    state::{
        SharedState,
        battle::{BattleEvent, BattlePhase},
        roster::{SessionRoster, TeamStatus, UserId},
    },
};

/// Tear down every roster slot the departing user holds.
///
/// Invoked on the explicit `leaving` signal or a heartbeat timeout.
pub async fn handle_leaving(state: &SharedState, user_id: UserId) {
    for (session_id, team_id) in state.roster().memberships_of(user_id) {
        if let Err(err) = depart(state, &session_id, team_id, user_id).await {
            warn!(
                user_id,
                session_id = %session_id,
                error = %err,
                "failed to repair roster after departure"
            );
        }
    }
}

/// Remove one user from one team, cascading according to their role.
pub async fn depart(
    state: &SharedState,
    session_id: &str,
    team_id: Uuid,
    user_id: UserId,
) -> Result<(), ServiceError> {
    let handle = state
        .roster()
        .session(session_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let session = handle.lock().await;

    let team = session
        .team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    if !team.is_member(user_id) {
        return Err(ServiceError::Forbidden("you are not on this team".into()));
    }

    if team.captain_id == user_id {
        disband(state, session, session_id, team_id, user_id).await
    } else {
        remove_member(state, session, session_id, team_id, user_id).await
    }
}

/// Captain departure: the team cannot continue without its captain, so it
/// is disbanded, its members evicted, and a paired battle cancelled.
async fn disband(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    team_id: Uuid,
    user_id: UserId,
) -> Result<(), ServiceError> {
    let team = session
        .teams
        .shift_remove(&team_id)
        .expect("team presence checked above");
    let member_ids: Vec<UserId> = team.members.iter().map(|m| m.user_id).collect();

    // Cascade-cancel everything still pointing at the dissolved team.
    let (invitations, requests) = session.expire_team_entries(team_id);
    let batch = expiry_sweeper::batch_from(&session, invitations, requests);

    let battle_id = session.pairing.map(|pairing| pairing.battle_id);
    let opposing_id = session
        .pairing
        .and_then(|pairing| pairing.opposing(team_id));

    let mut opposing_members = Vec::new();
    if let Some(opposing_id) = opposing_id {
        state.abort_countdown(session_id);
        session.apply_phase(BattleEvent::BattleDissolved)?;
        session.pairing = None;

        if let Some(opposing) = session.team_mut(opposing_id) {
            opposing.status = TeamStatus::Forming;
        }
        opposing_members = session
            .team(opposing_id)
            .map(|team| team.members.iter().map(|m| m.user_id).collect())
            .unwrap_or_default();
    }

    for member_id in &member_ids {
        state.roster().clear_membership(*member_id, session_id);
    }
    state.roster().forget_team(team_id);
    state.persist_session(&session).await?;
    drop(session);

    expiry_sweeper::publish(state, batch);
    if opposing_id.is_some() {
        hub_events::send_opponent_disconnected(
            state,
            opposing_members,
            OpponentDisconnectedEvent {
                session_id: session_id.to_string(),
                team_id,
                user_id,
            },
        );
    }
    hub_events::broadcast_battle_cancelled(
        state,
        BattleCancelledEvent {
            session_id: session_id.to_string(),
            battle_id,
            team_id,
            reason: "the captain left and the team was disbanded".into(),
        },
    );

    info!(
        session_id = %session_id,
        team_id = %team_id,
        captain_id = user_id,
        evicted = member_ids.len() - 1,
        "captain left; team disbanded"
    );
    Ok(())
}

/// Regular member departure: the slot frees up and the battle can proceed
/// once it refills, but a running countdown is aborted.
async fn remove_member(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    team_id: Uuid,
    user_id: UserId,
) -> Result<(), ServiceError> {
    session
        .team_mut(team_id)
        .expect("team presence checked above")
        .remove_member(user_id);

    let countdown_interrupted = matches!(
        session.phase,
        BattlePhase::BothReady | BattlePhase::Countdown
    );
    if countdown_interrupted {
        state.abort_countdown(session_id);
        session.apply_phase(BattleEvent::CountdownAborted)?;
        session
            .team_mut(team_id)
            .expect("team presence checked above")
            .status = TeamStatus::Forming;
    }

    let team = session.team(team_id).expect("team presence checked above");
    let team_summary = TeamSummary::from(team);
    let remaining: Vec<UserId> = team.members.iter().map(|m| m.user_id).collect();
    let opposing: Vec<UserId> = session
        .opposing_team(team_id)
        .map(|opposing| opposing.members.iter().map(|m| m.user_id).collect())
        .unwrap_or_default();
    let ready_snapshot = countdown_interrupted.then(|| readiness_service::ready_snapshot(&session));

    state.roster().clear_membership(user_id, session_id);
    state.persist_session(&session).await?;
    drop(session);

    hub_events::broadcast_team_updated(
        state,
        TeamUpdatedEvent {
            team: team_summary.clone(),
        },
    );
    hub_events::send_teammate_disconnected(
        state,
        remaining,
        TeammateDisconnectedEvent {
            session_id: session_id.to_string(),
            team: team_summary,
            user_id,
        },
    );
    if !opposing.is_empty() {
        hub_events::send_opponent_member_disconnected(
            state,
            opposing,
            OpponentTeamMemberDisconnectedEvent {
                session_id: session_id.to_string(),
                team_id,
                user_id,
            },
        );
    }
    if let Some(snapshot) = ready_snapshot {
        hub_events::broadcast_team_ready_status(state, snapshot);
    }

    info!(session_id = %session_id, team_id = %team_id, user_id, "member left team");
    Ok(())
}

/// Restore a reconnecting client's view: one `team_state_restored` event per
/// team the user still belongs to, delivered to that connection only.
pub async fn handle_reconnect(state: &SharedState, user_id: UserId) {
    for (session_id, team_id) in state.roster().memberships_of(user_id) {
        let Some(handle) = state.roster().session(&session_id) else {
            continue;
        };
        let session = handle.lock().await;
        let Some(team) = session.team(team_id) else {
            continue;
        };

        let payload = StateRestoredEvent {
            session_id: session_id.clone(),
            team: TeamSummary::from(team),
            battle: BattleSummary::from_roster(&session),
            phase: session.phase.into(),
        };
        drop(session);

        state.hub().subscribe(&session_id, user_id);
        hub_events::send_state_restored(state, user_id, payload);
        info!(user_id, session_id = %session_id, "restored team state after reconnect");
    }
}
