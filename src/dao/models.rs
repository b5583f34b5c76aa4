use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    battle::BattlePhase,
    roster::{
        BattlePairing, InvitationKind, InvitationStatus, JoinRequestStatus, MemberRole,
        SessionRoster, Team, TeamInvitation, TeamJoinRequest, TeamMember, TeamStatus,
    },
};

/// Persisted snapshot of everything a game session owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Opaque session identifier minted by the first client.
    pub session_id: String,
    /// Battle phase at snapshot time.
    pub phase: BattlePhaseEntity,
    /// Pairing relation, present while the session is paired.
    pub pairing: Option<PairingEntity>,
    /// Teams in creation order.
    pub teams: Vec<TeamEntity>,
    /// Invitations scoped to the session.
    pub invitations: Vec<InvitationEntity>,
    /// Join requests targeting teams of the session.
    pub join_requests: Vec<JoinRequestEntity>,
}

/// Persisted battle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhaseEntity {
    /// Opponent slot open.
    Unpaired,
    /// Both sides exist and are filling rosters.
    PairedForming,
    /// Both ready flags up.
    BothReady,
    /// Countdown running.
    Countdown,
    /// Handed off to the match runner.
    Started,
}

/// Persisted pairing relation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingEntity {
    /// Stable battle identifier.
    pub battle_id: Uuid,
    /// Team created first.
    pub side_a: Uuid,
    /// Team created on opponent acceptance.
    pub side_b: Uuid,
}

/// Persisted team definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Display name chosen by the captain.
    pub name: String,
    /// User id of the captain.
    pub captain_id: i64,
    /// Session the team belongs to.
    pub session_id: String,
    /// Lifecycle status at snapshot time.
    pub status: TeamStatusEntity,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Roster in join order.
    pub members: Vec<TeamMemberEntity>,
}

/// Persisted lifecycle status of a team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatusEntity {
    /// Still assembling its roster.
    Forming,
    /// Flagged ready by the captain.
    Ready,
    /// Battle in progress.
    Playing,
    /// Battle concluded.
    Finished,
}

/// Persisted roster slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMemberEntity {
    /// Identity of the player.
    pub user_id: i64,
    /// Display name snapshot.
    pub username: String,
    /// Captain or regular member.
    pub role: MemberRoleEntity,
    /// Join timestamp.
    pub joined_at: SystemTime,
}

/// Persisted member role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRoleEntity {
    /// Team captain.
    Captain,
    /// Regular member.
    Member,
}

/// Persisted invitation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvitationEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Originating team.
    pub team_id: Uuid,
    /// Session scope.
    pub session_id: String,
    /// Issuing captain.
    pub inviter_id: i64,
    /// Addressed player.
    pub invitee_id: i64,
    /// Opponent or teammate.
    pub kind: InvitationKindEntity,
    /// Resolution state at snapshot time.
    pub status: InvitationStatusEntity,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Expiry timestamp.
    pub expires_at: SystemTime,
}

/// Persisted invitation kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKindEntity {
    /// Captain-to-captain.
    Opponent,
    /// Captain-to-player.
    Teammate,
}

/// Persisted invitation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatusEntity {
    /// Awaiting a response.
    Pending,
    /// Committed to by the invitee.
    Accepted,
    /// Turned down.
    Declined,
    /// Timed out or invalidated.
    Expired,
}

/// Persisted join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequestEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Target team.
    pub team_id: Uuid,
    /// Session scope.
    pub session_id: String,
    /// Requesting player.
    pub requester_id: i64,
    /// Display name snapshot.
    pub requester_name: String,
    /// Resolution state at snapshot time.
    pub status: JoinRequestStatusEntity,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Expiry timestamp.
    pub expires_at: SystemTime,
}

/// Persisted join request status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatusEntity {
    /// Awaiting the captain's decision.
    Pending,
    /// Accepted and resolved.
    Accepted,
    /// Rejected by the captain.
    Rejected,
    /// Timed out or invalidated.
    Expired,
    /// Withdrawn by the requester.
    Cancelled,
}

impl From<BattlePhase> for BattlePhaseEntity {
    fn from(value: BattlePhase) -> Self {
        match value {
            BattlePhase::Unpaired => Self::Unpaired,
            BattlePhase::PairedForming => Self::PairedForming,
            BattlePhase::BothReady => Self::BothReady,
            BattlePhase::Countdown => Self::Countdown,
            BattlePhase::Started => Self::Started,
        }
    }
}

impl From<BattlePhaseEntity> for BattlePhase {
    fn from(value: BattlePhaseEntity) -> Self {
        match value {
            BattlePhaseEntity::Unpaired => Self::Unpaired,
            BattlePhaseEntity::PairedForming => Self::PairedForming,
            BattlePhaseEntity::BothReady => Self::BothReady,
            BattlePhaseEntity::Countdown => Self::Countdown,
            BattlePhaseEntity::Started => Self::Started,
        }
    }
}

impl From<BattlePairing> for PairingEntity {
    fn from(value: BattlePairing) -> Self {
        Self {
            battle_id: value.battle_id,
            side_a: value.side_a,
            side_b: value.side_b,
        }
    }
}

impl From<PairingEntity> for BattlePairing {
    fn from(value: PairingEntity) -> Self {
        Self {
            battle_id: value.battle_id,
            side_a: value.side_a,
            side_b: value.side_b,
        }
    }
}

impl From<TeamStatus> for TeamStatusEntity {
    fn from(value: TeamStatus) -> Self {
        match value {
            TeamStatus::Forming => Self::Forming,
            TeamStatus::Ready => Self::Ready,
            TeamStatus::Playing => Self::Playing,
            TeamStatus::Finished => Self::Finished,
        }
    }
}

impl From<TeamStatusEntity> for TeamStatus {
    fn from(value: TeamStatusEntity) -> Self {
        match value {
            TeamStatusEntity::Forming => Self::Forming,
            TeamStatusEntity::Ready => Self::Ready,
            TeamStatusEntity::Playing => Self::Playing,
            TeamStatusEntity::Finished => Self::Finished,
        }
    }
}

impl From<MemberRole> for MemberRoleEntity {
    fn from(value: MemberRole) -> Self {
        match value {
            MemberRole::Captain => Self::Captain,
            MemberRole::Member => Self::Member,
        }
    }
}

impl From<MemberRoleEntity> for MemberRole {
    fn from(value: MemberRoleEntity) -> Self {
        match value {
            MemberRoleEntity::Captain => Self::Captain,
            MemberRoleEntity::Member => Self::Member,
        }
    }
}

impl From<TeamMember> for TeamMemberEntity {
    fn from(value: TeamMember) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            role: value.role.into(),
            joined_at: value.joined_at,
        }
    }
}

impl From<TeamMemberEntity> for TeamMember {
    fn from(value: TeamMemberEntity) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            role: value.role.into(),
            joined_at: value.joined_at,
        }
    }
}

impl From<Team> for TeamEntity {
    fn from(value: Team) -> Self {
        Self {
            id: value.id,
            name: value.name,
            captain_id: value.captain_id,
            session_id: value.session_id,
            status: value.status.into(),
            created_at: value.created_at,
            members: value.members.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<TeamEntity> for Team {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            captain_id: value.captain_id,
            session_id: value.session_id,
            status: value.status.into(),
            created_at: value.created_at,
            members: value.members.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<InvitationKind> for InvitationKindEntity {
    fn from(value: InvitationKind) -> Self {
        match value {
            InvitationKind::Opponent => Self::Opponent,
            InvitationKind::Teammate => Self::Teammate,
        }
    }
}

impl From<InvitationKindEntity> for InvitationKind {
    fn from(value: InvitationKindEntity) -> Self {
        match value {
            InvitationKindEntity::Opponent => Self::Opponent,
            InvitationKindEntity::Teammate => Self::Teammate,
        }
    }
}

impl From<InvitationStatus> for InvitationStatusEntity {
    fn from(value: InvitationStatus) -> Self {
        match value {
            InvitationStatus::Pending => Self::Pending,
            InvitationStatus::Accepted => Self::Accepted,
            InvitationStatus::Declined => Self::Declined,
            InvitationStatus::Expired => Self::Expired,
        }
    }
}

impl From<InvitationStatusEntity> for InvitationStatus {
    fn from(value: InvitationStatusEntity) -> Self {
        match value {
            InvitationStatusEntity::Pending => Self::Pending,
            InvitationStatusEntity::Accepted => Self::Accepted,
            InvitationStatusEntity::Declined => Self::Declined,
            InvitationStatusEntity::Expired => Self::Expired,
        }
    }
}

impl From<TeamInvitation> for InvitationEntity {
    fn from(value: TeamInvitation) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            session_id: value.session_id,
            inviter_id: value.inviter_id,
            invitee_id: value.invitee_id,
            kind: value.kind.into(),
            status: value.status.into(),
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

impl From<InvitationEntity> for TeamInvitation {
    fn from(value: InvitationEntity) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            session_id: value.session_id,
            inviter_id: value.inviter_id,
            invitee_id: value.invitee_id,
            kind: value.kind.into(),
            status: value.status.into(),
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

impl From<JoinRequestStatus> for JoinRequestStatusEntity {
    fn from(value: JoinRequestStatus) -> Self {
        match value {
            JoinRequestStatus::Pending => Self::Pending,
            JoinRequestStatus::Accepted => Self::Accepted,
            JoinRequestStatus::Rejected => Self::Rejected,
            JoinRequestStatus::Expired => Self::Expired,
            JoinRequestStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<JoinRequestStatusEntity> for JoinRequestStatus {
    fn from(value: JoinRequestStatusEntity) -> Self {
        match value {
            JoinRequestStatusEntity::Pending => Self::Pending,
            JoinRequestStatusEntity::Accepted => Self::Accepted,
            JoinRequestStatusEntity::Rejected => Self::Rejected,
            JoinRequestStatusEntity::Expired => Self::Expired,
            JoinRequestStatusEntity::Cancelled => Self::Cancelled,
        }
    }
}

impl From<TeamJoinRequest> for JoinRequestEntity {
    fn from(value: TeamJoinRequest) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            session_id: value.session_id,
            requester_id: value.requester_id,
            requester_name: value.requester_name,
            status: value.status.into(),
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

impl From<JoinRequestEntity> for TeamJoinRequest {
    fn from(value: JoinRequestEntity) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            session_id: value.session_id,
            requester_id: value.requester_id,
            requester_name: value.requester_name,
            status: value.status.into(),
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

impl From<&SessionRoster> for SessionEntity {
    fn from(value: &SessionRoster) -> Self {
        Self {
            session_id: value.session_id.clone(),
            phase: value.phase.into(),
            pairing: value.pairing.map(Into::into),
            teams: value.teams.values().cloned().map(Into::into).collect(),
            invitations: value
                .invitations
                .values()
                .cloned()
                .map(Into::into)
                .collect(),
            join_requests: value
                .join_requests
                .values()
                .cloned()
                .map(Into::into)
                .collect(),
        }
    }
}

impl From<SessionEntity> for SessionRoster {
    fn from(value: SessionEntity) -> Self {
        let mut roster = SessionRoster::new(value.session_id);
        roster.phase = value.phase.into();
        roster.pairing = value.pairing.map(Into::into);
        for team in value.teams {
            let team: Team = team.into();
            roster.teams.insert(team.id, team);
        }
        for invitation in value.invitations {
            let invitation: TeamInvitation = invitation.into();
            roster.invitations.insert(invitation.id, invitation);
        }
        for request in value.join_requests {
            let request: TeamJoinRequest = request.into();
            roster.join_requests.insert(request.id, request);
        }
        roster
    }
}
