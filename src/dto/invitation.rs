use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{format_system_time, validation::validate_team_name},
    state::roster::{InvitationKind, InvitationStatus, TeamInvitation},
};

/// Payload used by a captain to invite an opponent captain or a teammate.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteRequest {
    /// Identity of the invited player.
    pub invitee_id: i64,
    /// Opponent or teammate invitation.
    pub kind: InvitationKindDto,
}

/// Payload used by an invitee to accept or decline an invitation.
///
/// `team_name` is required when accepting an opponent invitation: the
/// invitee names their own team at accept time.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondInvitationRequest {
    /// `true` to accept, `false` to decline.
    pub accept: bool,
    /// Name for the side-B team on opponent acceptance.
    #[serde(default)]
    pub team_name: Option<String>,
}

impl Validate for RespondInvitationRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(name) = &self.team_name {
            if let Err(err) = validate_team_name(name) {
                errors.add("team_name", err);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Public projection of an invitation kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKindDto {
    /// Captain-to-captain; acceptance creates side B.
    Opponent,
    /// Captain-to-player; acceptance fills a roster slot.
    Teammate,
}

/// Public projection of an invitation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatusDto {
    /// Awaiting a response.
    Pending,
    /// Committed to by the invitee.
    Accepted,
    /// Turned down by the invitee.
    Declined,
    /// Timed out or invalidated.
    Expired,
}

/// Public projection of an invitation exposed to REST and event clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct InvitationSummary {
    /// Stable identifier.
    pub id: Uuid,
    /// Session the invitation is scoped to.
    pub session_id: String,
    /// Originating team.
    pub team_id: Uuid,
    /// Name of the originating team, when it still exists.
    pub team_name: Option<String>,
    /// Issuing captain.
    pub inviter_id: i64,
    /// Addressed player.
    pub invitee_id: i64,
    /// Opponent or teammate.
    pub kind: InvitationKindDto,
    /// Resolution state.
    pub status: InvitationStatusDto,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 expiry timestamp.
    pub expires_at: String,
}

impl From<InvitationKind> for InvitationKindDto {
    fn from(value: InvitationKind) -> Self {
        match value {
            InvitationKind::Opponent => Self::Opponent,
            InvitationKind::Teammate => Self::Teammate,
        }
    }
}

impl From<InvitationKindDto> for InvitationKind {
    fn from(value: InvitationKindDto) -> Self {
        match value {
            InvitationKindDto::Opponent => Self::Opponent,
            InvitationKindDto::Teammate => Self::Teammate,
        }
    }
}

impl From<InvitationStatus> for InvitationStatusDto {
    fn from(value: InvitationStatus) -> Self {
        match value {
            InvitationStatus::Pending => Self::Pending,
            InvitationStatus::Accepted => Self::Accepted,
            InvitationStatus::Declined => Self::Declined,
            InvitationStatus::Expired => Self::Expired,
        }
    }
}

impl InvitationSummary {
    /// Build the projection, attaching the originating team's name when the
    /// team still exists.
    pub fn new(invitation: &TeamInvitation, team_name: Option<String>) -> Self {
        Self {
            id: invitation.id,
            session_id: invitation.session_id.clone(),
            team_id: invitation.team_id,
            team_name,
            inviter_id: invitation.inviter_id,
            invitee_id: invitation.invitee_id,
            kind: invitation.kind.into(),
            status: invitation.status.into(),
            created_at: format_system_time(invitation.created_at),
            expires_at: format_system_time(invitation.expires_at),
        }
    }
}
