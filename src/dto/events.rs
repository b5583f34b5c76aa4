use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{
    invitation::InvitationSummary,
    join_request::JoinRequestSummary,
    team::{BattlePhaseDto, BattleSummary, TeamSummary},
};

/// Envelope carried to clients over their WebSocket connection.
///
/// `data` always holds the full current value of the affected entity, so
/// duplicate or reordered delivery cannot corrupt client state.
#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    /// Name of the event, one of the taxonomy constants in `hub_events`.
    pub event: String,
    /// Full-value payload of the affected entity.
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: impl Into<String>, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted when a team is created in a session.
pub struct TeamCreatedEvent {
    /// The newly created team.
    pub team: TeamSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted when a team's roster, name, or status changes.
pub struct TeamUpdatedEvent {
    /// Full current value of the team.
    pub team: TeamSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the target team's captain when a join request arrives.
pub struct JoinRequestCreatedEvent {
    /// The new join request.
    pub request: JoinRequestSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted when a join request is accepted, rejected, cancelled, or
/// expired.
pub struct JoinRequestUpdatedEvent {
    /// Full current value of the request.
    pub request: JoinRequestSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the invitee when an invitation is issued.
pub struct InvitationCreatedEvent {
    /// The new invitation.
    pub invitation: InvitationSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to inviter and invitee when an invitation is resolved.
pub struct InvitationUpdatedEvent {
    /// Full current value of the invitation.
    pub invitation: InvitationSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the invitee when an invitation expires.
pub struct InvitationExpiredEvent {
    /// The invitation that just expired.
    pub invitation: InvitationSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the inviting captain when side B was created.
pub struct OpponentAcceptedInvitationEvent {
    /// The accepted invitation.
    pub invitation: InvitationSummary,
    /// The freshly paired battle.
    pub battle: BattleSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Per-team entry of a ready-status broadcast.
pub struct TeamReadyEntry {
    /// Team the flag belongs to.
    pub team_id: Uuid,
    /// Team display name.
    pub name: String,
    /// Current value of the ready flag.
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Event emitted to the whole session whenever readiness changes.
pub struct TeamReadyStatusEvent {
    /// Session the readiness belongs to.
    pub session_id: String,
    /// Battle phase after the change.
    pub phase: BattlePhaseDto,
    /// Ready flags of every team in the session.
    pub teams: Vec<TeamReadyEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Periodic countdown tick carrying the remaining whole seconds.
pub struct CountdownTickEvent {
    /// Session counting down.
    pub session_id: String,
    /// Seconds until the battle starts; `0` means the session just started.
    pub remaining_seconds: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the session when the battle is cancelled.
pub struct BattleCancelledEvent {
    /// Session the battle belonged to.
    pub session_id: String,
    /// Identifier of the cancelled battle, when the session was paired.
    pub battle_id: Option<Uuid>,
    /// Team whose dissolution triggered the cancellation.
    pub team_id: Uuid,
    /// Human-readable cancellation reason.
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to a reconnecting client carrying its full team state.
pub struct StateRestoredEvent {
    /// Session the restored team belongs to.
    pub session_id: String,
    /// Full current value of the client's team.
    pub team: TeamSummary,
    /// Battle projection when the session is paired.
    pub battle: Option<BattleSummary>,
    /// Battle phase of the session.
    pub phase: BattlePhaseDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to the opposing team when a captain's team dissolves.
pub struct OpponentDisconnectedEvent {
    /// Session the battle ran in.
    pub session_id: String,
    /// Team that just dissolved.
    pub team_id: Uuid,
    /// Captain whose departure dissolved the team.
    pub user_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Event emitted to a team when one of its members leaves.
pub struct TeammateDisconnectedEvent {
    /// Session the team belongs to.
    pub session_id: String,
    /// Full current value of the shrunk team.
    pub team: TeamSummary,
    /// Member who left.
    pub user_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Lower-severity notice to the opposing team that a member slot opened up
/// across the battle; the battle can still proceed once the slot refills.
pub struct OpponentTeamMemberDisconnectedEvent {
    /// Session the battle runs in.
    pub session_id: String,
    /// Team that lost the member.
    pub team_id: Uuid,
    /// Member who left.
    pub user_id: i64,
}
