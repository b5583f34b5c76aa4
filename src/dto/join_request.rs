use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::roster::{JoinRequestStatus, TeamJoinRequest},
};

/// Payload used by a captain to accept or reject a join request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondJoinRequestRequest {
    /// `true` to accept, `false` to reject.
    pub accept: bool,
}

/// Public projection of a join request status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatusDto {
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

/// Public projection of a join request exposed to REST and event clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct JoinRequestSummary {
    /// Stable identifier.
    pub id: Uuid,
    /// Session the target team belongs to.
    pub session_id: String,
    /// Target team.
    pub team_id: Uuid,
    /// Name of the target team, when it still exists.
    pub team_name: Option<String>,
    /// Requesting player.
    pub requester_id: i64,
    /// Display name snapshot taken at request time.
    pub requester_name: String,
    /// Resolution state.
    pub status: JoinRequestStatusDto,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 expiry timestamp.
    pub expires_at: String,
}

impl From<JoinRequestStatus> for JoinRequestStatusDto {
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

impl JoinRequestSummary {
    /// Build the projection, attaching the target team's name when the team
    /// still exists.
    pub fn new(request: &TeamJoinRequest, team_name: Option<String>) -> Self {
        Self {
            id: request.id,
            session_id: request.session_id.clone(),
            team_id: request.team_id,
            team_name,
            requester_id: request.requester_id,
            requester_name: request.requester_name.clone(),
            status: request.status.into(),
            created_at: format_system_time(request.created_at),
            expires_at: format_system_time(request.expires_at),
        }
    }
}
