use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::join_request::{JoinRequestSummary, RespondJoinRequestRequest},
    error::AppError,
    routes::identity::CurrentUser,
    services::join_request_service,
    state::SharedState,
};

/// Routes handling player-initiated join requests.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/teams/{team_id}/join-requests", post(create_join_request))
        .route(
            "/join-requests/{request_id}/respond",
            post(respond_join_request),
        )
        .route("/join-requests/{request_id}", delete(cancel_join_request))
        .route("/join-requests", get(list_join_requests))
}

/// Ask to join a forming team.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/join-requests",
    tag = "join-requests",
    params(("team_id" = Uuid, Path, description = "Team to join")),
    responses(
        (status = 200, description = "Request filed", body = JoinRequestSummary),
        (status = 409, description = "Another request is already pending, or the team is full")
    )
)]
pub async fn create_join_request(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> Result<Json<JoinRequestSummary>, AppError> {
    let summary =
        join_request_service::create_request(&state, user.id, &user.name, team_id).await?;
    Ok(Json(summary))
}

/// Accept or reject a join request; target team's captain only.
#[utoipa::path(
    post,
    path = "/join-requests/{request_id}/respond",
    tag = "join-requests",
    params(("request_id" = Uuid, Path, description = "Request to resolve")),
    request_body = RespondJoinRequestRequest,
    responses(
        (status = 200, description = "Request resolved", body = JoinRequestSummary),
        (status = 410, description = "Request already expired")
    )
)]
pub async fn respond_join_request(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<RespondJoinRequestRequest>,
) -> Result<Json<JoinRequestSummary>, AppError> {
    let summary =
        join_request_service::respond_request(&state, user.id, request_id, payload.accept).await?;
    Ok(Json(summary))
}

/// Withdraw a pending join request; requester only.
#[utoipa::path(
    delete,
    path = "/join-requests/{request_id}",
    tag = "join-requests",
    params(("request_id" = Uuid, Path, description = "Request to withdraw")),
    responses((status = 200, description = "Request withdrawn", body = JoinRequestSummary))
)]
pub async fn cancel_join_request(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<JoinRequestSummary>, AppError> {
    let summary = join_request_service::cancel_request(&state, user.id, request_id).await?;
    Ok(Json(summary))
}

/// List pending requests targeting teams the caller captains.
#[utoipa::path(
    get,
    path = "/join-requests",
    tag = "join-requests",
    responses((status = 200, description = "Pending requests", body = [JoinRequestSummary]))
)]
pub async fn list_join_requests(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<Vec<JoinRequestSummary>>, AppError> {
    let requests = join_request_service::list_requests_for_captain(&state, user.id).await?;
    Ok(Json(requests))
}
