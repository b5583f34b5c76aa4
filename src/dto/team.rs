use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{format_system_time, validation::validate_team_name},
    state::{
        battle::BattlePhase,
        roster::{BattlePairing, MemberRole, SessionRoster, Team, TeamStatus},
    },
};

/// Payload used to create the first team of a session (side A).
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTeamRequest {
    /// Display name for the new team.
    pub name: String,
}

impl Validate for CreateTeamRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_name_field(&self.name)
    }
}

/// Payload used by a captain to rename their team.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameTeamRequest {
    /// New display name.
    pub name: String,
}

impl Validate for RenameTeamRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_name_field(&self.name)
    }
}

fn validate_name_field(name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Err(err) = validate_team_name(name) {
        errors.add("name", err);
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Payload used by a captain to flag or unflag readiness.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetReadyRequest {
    /// Desired value of the team's ready flag.
    pub ready: bool,
}

/// Public projection of a member role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRoleDto {
    /// Team captain.
    Captain,
    /// Regular member.
    Member,
}

/// Public projection of a team lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatusDto {
    /// Still assembling its roster.
    Forming,
    /// Flagged ready by the captain.
    Ready,
    /// Battle in progress.
    Playing,
    /// Battle concluded.
    Finished,
}

/// Public projection of the battle phase of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhaseDto {
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

/// Public projection of a roster slot.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TeamMemberSummary {
    /// Identity of the player.
    pub user_id: i64,
    /// Display name snapshot.
    pub username: String,
    /// Captain or regular member.
    pub role: MemberRoleDto,
    /// RFC 3339 join timestamp.
    pub joined_at: String,
}

/// Public projection of a team exposed to REST and event clients.
///
/// Events carry this full value, never a diff, so clients treat every
/// delivery as "refresh this team to this value".
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TeamSummary {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Session the team belongs to.
    pub session_id: String,
    /// Display name.
    pub name: String,
    /// User id of the captain.
    pub captain_id: i64,
    /// Lifecycle status.
    pub status: TeamStatusDto,
    /// Whether the captain flagged the team ready.
    pub ready: bool,
    /// Free roster slots remaining.
    pub open_slots: usize,
    /// Roster in join order, captain first.
    pub members: Vec<TeamMemberSummary>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Public projection of a paired battle: both sides plus the session phase.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct BattleSummary {
    /// Stable battle identifier.
    pub battle_id: Uuid,
    /// Session the battle runs in.
    pub session_id: String,
    /// Battle phase of the session.
    pub phase: BattlePhaseDto,
    /// Team created first.
    pub side_a: TeamSummary,
    /// Team created on opponent acceptance.
    pub side_b: TeamSummary,
}

impl From<MemberRole> for MemberRoleDto {
    fn from(value: MemberRole) -> Self {
        match value {
            MemberRole::Captain => Self::Captain,
            MemberRole::Member => Self::Member,
        }
    }
}

impl From<TeamStatus> for TeamStatusDto {
    fn from(value: TeamStatus) -> Self {
        match value {
            TeamStatus::Forming => Self::Forming,
            TeamStatus::Ready => Self::Ready,
            TeamStatus::Playing => Self::Playing,
            TeamStatus::Finished => Self::Finished,
        }
    }
}

impl From<BattlePhase> for BattlePhaseDto {
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

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            session_id: team.session_id.clone(),
            name: team.name.clone(),
            captain_id: team.captain_id,
            status: team.status.into(),
            ready: team.is_ready(),
            open_slots: team.open_slots(),
            members: team
                .members
                .iter()
                .map(|member| TeamMemberSummary {
                    user_id: member.user_id,
                    username: member.username.clone(),
                    role: member.role.into(),
                    joined_at: format_system_time(member.joined_at),
                })
                .collect(),
            created_at: format_system_time(team.created_at),
        }
    }
}

impl BattleSummary {
    /// Build the battle projection from a paired session roster.
    ///
    /// Returns `None` while the session is unpaired or one side is missing.
    pub fn from_roster(roster: &SessionRoster) -> Option<Self> {
        let BattlePairing {
            battle_id,
            side_a,
            side_b,
        } = roster.pairing?;
        let side_a = roster.team(side_a)?;
        let side_b = roster.team(side_b)?;

        Some(Self {
            battle_id,
            session_id: roster.session_id.clone(),
            phase: roster.phase.into(),
            side_a: side_a.into(),
            side_b: side_b.into(),
        })
    }
}
