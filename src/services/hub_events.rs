//! Typed broadcast helpers implementing the engine's event taxonomy.
//!
//! Every payload carries the full current value of the affected entity, so
//! duplicate or reordered delivery within a session cannot corrupt client
//! state.

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::events::{
        BattleCancelledEvent, CountdownTickEvent, InvitationCreatedEvent, InvitationExpiredEvent,
        InvitationUpdatedEvent, JoinRequestCreatedEvent, JoinRequestUpdatedEvent,
        OpponentAcceptedInvitationEvent, OpponentDisconnectedEvent,
        OpponentTeamMemberDisconnectedEvent, ServerEvent, StateRestoredEvent,
        TeamCreatedEvent, TeamReadyStatusEvent, TeamUpdatedEvent, TeammateDisconnectedEvent,
    },
    state::{SharedState, roster::UserId},
};

const EVENT_TEAM_CREATED: &str = "team_created";
const EVENT_TEAM_UPDATED: &str = "team_updated";
const EVENT_JOIN_REQUEST_CREATED: &str = "join_request_created";
const EVENT_JOIN_REQUEST_UPDATED: &str = "join_request_updated";
const EVENT_INVITATION_CREATED: &str = "invitation_created";
const EVENT_INVITATION_UPDATED: &str = "invitation_updated";
const EVENT_INVITATION_EXPIRED: &str = "invitation_expired";
const EVENT_OPPONENT_ACCEPTED_INVITATION: &str = "opponent_accepted_invitation";
const EVENT_TEAM_READY_STATUS: &str = "team_ready_status";
const EVENT_TEAM_BATTLE_COUNTDOWN: &str = "team_battle_countdown";
const EVENT_TEAM_BATTLE_CANCELLED: &str = "team_battle_cancelled";
const EVENT_TEAM_STATE_RESTORED: &str = "team_state_restored";
const EVENT_OPPONENT_DISCONNECTED: &str = "opponent_disconnected";
const EVENT_TEAMMATE_DISCONNECTED: &str = "teammate_disconnected";
const EVENT_OPPONENT_TEAM_MEMBER_DISCONNECTED: &str = "opponent_team_member_disconnected";

/// Broadcast a freshly created team to the whole session.
pub fn broadcast_team_created(state: &SharedState, payload: TeamCreatedEvent) {
    let session_id = payload.team.session_id.clone();
    send_session_event(state, &session_id, EVENT_TEAM_CREATED, &payload);
}

/// Broadcast a team's new full value to the whole session.
pub fn broadcast_team_updated(state: &SharedState, payload: TeamUpdatedEvent) {
    let session_id = payload.team.session_id.clone();
    send_session_event(state, &session_id, EVENT_TEAM_UPDATED, &payload);
}

/// Tell the target team's captain about a new join request.
pub fn send_join_request_created(
    state: &SharedState,
    captain_id: UserId,
    payload: JoinRequestCreatedEvent,
) {
    send_user_event(state, captain_id, EVENT_JOIN_REQUEST_CREATED, &payload);
}

/// Tell the requester and the target team's captain that a request resolved.
pub fn send_join_request_updated(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    payload: JoinRequestUpdatedEvent,
) {
    send_users_event(state, recipients, EVENT_JOIN_REQUEST_UPDATED, &payload);
}

/// Tell the invitee a new invitation awaits them.
pub fn send_invitation_created(
    state: &SharedState,
    invitee_id: UserId,
    payload: InvitationCreatedEvent,
) {
    send_user_event(state, invitee_id, EVENT_INVITATION_CREATED, &payload);
}

/// Tell inviter and invitee that an invitation resolved.
pub fn send_invitation_updated(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    payload: InvitationUpdatedEvent,
) {
    send_users_event(state, recipients, EVENT_INVITATION_UPDATED, &payload);
}

/// Tell the invitee one of their pending invitations is gone.
pub fn send_invitation_expired(state: &SharedState, payload: InvitationExpiredEvent) {
    let invitee_id = payload.invitation.invitee_id;
    send_user_event(state, invitee_id, EVENT_INVITATION_EXPIRED, &payload);
}

/// Tell the inviting captain their opponent accepted and side B exists.
pub fn send_opponent_accepted(
    state: &SharedState,
    inviter_id: UserId,
    payload: OpponentAcceptedInvitationEvent,
) {
    send_user_event(state, inviter_id, EVENT_OPPONENT_ACCEPTED_INVITATION, &payload);
}

/// Broadcast the ready flags of every team in the session.
pub fn broadcast_team_ready_status(state: &SharedState, payload: TeamReadyStatusEvent) {
    let session_id = payload.session_id.clone();
    send_session_event(state, &session_id, EVENT_TEAM_READY_STATUS, &payload);
}

/// Broadcast one countdown tick carrying the remaining seconds.
pub fn broadcast_countdown_tick(state: &SharedState, session_id: &str, remaining_seconds: u32) {
    let payload = CountdownTickEvent {
        session_id: session_id.to_string(),
        remaining_seconds,
    };
    send_session_event(state, session_id, EVENT_TEAM_BATTLE_COUNTDOWN, &payload);
}

/// Broadcast that the battle was cancelled to the whole session.
pub fn broadcast_battle_cancelled(state: &SharedState, payload: BattleCancelledEvent) {
    let session_id = payload.session_id.clone();
    send_session_event(state, &session_id, EVENT_TEAM_BATTLE_CANCELLED, &payload);
}

/// Hand a reconnecting client its full team state.
pub fn send_state_restored(state: &SharedState, user_id: UserId, payload: StateRestoredEvent) {
    send_user_event(state, user_id, EVENT_TEAM_STATE_RESTORED, &payload);
}

/// Tell the opposing team their opponent dissolved.
pub fn send_opponent_disconnected(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    payload: OpponentDisconnectedEvent,
) {
    send_users_event(state, recipients, EVENT_OPPONENT_DISCONNECTED, &payload);
}

/// Tell a team one of its members left.
pub fn send_teammate_disconnected(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    payload: TeammateDisconnectedEvent,
) {
    send_users_event(state, recipients, EVENT_TEAMMATE_DISCONNECTED, &payload);
}

/// Tell the opposing team a member slot opened on the other side.
pub fn send_opponent_member_disconnected(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    payload: OpponentTeamMemberDisconnectedEvent,
) {
    send_users_event(
        state,
        recipients,
        EVENT_OPPONENT_TEAM_MEMBER_DISCONNECTED,
        &payload,
    );
}

fn send_session_event(
    state: &SharedState,
    session_id: &str,
    event: &str,
    payload: &impl Serialize,
) {
    match ServerEvent::json(event, payload) {
        Ok(event) => state.hub().broadcast_session(session_id, &event),
        Err(err) => warn!(event, error = %err, "failed to serialize session event payload"),
    }
}

fn send_user_event(state: &SharedState, user_id: UserId, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(event, payload) {
        Ok(event) => state.hub().send_to_user(user_id, &event),
        Err(err) => warn!(event, error = %err, "failed to serialize user event payload"),
    }
}

fn send_users_event(
    state: &SharedState,
    recipients: impl IntoIterator<Item = UserId>,
    event: &str,
    payload: &impl Serialize,
) {
    match ServerEvent::json(event, payload) {
        Ok(event) => state.hub().send_to_users(recipients, &event),
        Err(err) => warn!(event, error = %err, "failed to serialize user event payload"),
    }
}
