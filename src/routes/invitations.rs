use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::invitation::{InvitationSummary, InviteRequest, RespondInvitationRequest},
    error::AppError,
    routes::identity::CurrentUser,
    services::invitation_service,
    state::SharedState,
};

/// Routes handling opponent and teammate invitations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/teams/{team_id}/invitations", post(create_invitation))
        .route("/invitations/{invitation_id}/respond", post(respond_invitation))
        .route("/invitations", get(list_invitations))
}

/// Invite a player as opponent captain or teammate; captain only.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/invitations",
    tag = "invitations",
    params(("team_id" = Uuid, Path, description = "Inviting team")),
    request_body = InviteRequest,
    responses(
        (status = 200, description = "Invitation issued", body = InvitationSummary),
        (status = 409, description = "Duplicate offer, full team, or paired session")
    )
)]
pub async fn create_invitation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<InviteRequest>,
) -> Result<Json<InvitationSummary>, AppError> {
    let summary = invitation_service::create_invitation(&state, user.id, team_id, payload).await?;
    Ok(Json(summary))
}

/// Accept or decline an invitation addressed to the caller.
#[utoipa::path(
    post,
    path = "/invitations/{invitation_id}/respond",
    tag = "invitations",
    params(("invitation_id" = Uuid, Path, description = "Invitation to resolve")),
    request_body = RespondInvitationRequest,
    responses(
        (status = 200, description = "Invitation resolved", body = InvitationSummary),
        (status = 409, description = "Race lost: slot filled or team full"),
        (status = 410, description = "Invitation already expired")
    )
)]
pub async fn respond_invitation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(invitation_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<RespondInvitationRequest>>,
) -> Result<Json<InvitationSummary>, AppError> {
    let summary =
        invitation_service::respond_invitation(&state, user.id, &user.name, invitation_id, payload)
            .await?;
    Ok(Json(summary))
}

/// List pending invitations addressed to the caller.
#[utoipa::path(
    get,
    path = "/invitations",
    tag = "invitations",
    responses((status = 200, description = "Pending invitations", body = [InvitationSummary]))
)]
pub async fn list_invitations(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<Vec<InvitationSummary>>, AppError> {
    let invitations = invitation_service::list_invitations(&state, user.id).await?;
    Ok(Json(invitations))
}
