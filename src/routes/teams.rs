use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        events::TeamReadyStatusEvent,
        team::{CreateTeamRequest, RenameTeamRequest, SetReadyRequest, TeamSummary},
    },
    error::AppError,
    routes::identity::CurrentUser,
    services::{readiness_service, team_service},
    state::SharedState,
};

/// Routes handling team formation commands and queries.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/sessions/{session_id}/teams",
            post(create_team).get(list_teams),
        )
        .route("/teams/available", get(list_available_teams))
        .route("/teams/{team_id}", patch(rename_team))
        .route("/teams/{team_id}/leave", post(leave_team))
        .route("/teams/{team_id}/ready", post(set_ready))
}

/// Create the first team of a game session, captained by the caller.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/teams",
    tag = "teams",
    params(("session_id" = String, Path, description = "Client-minted game session identifier")),
    request_body = CreateTeamRequest,
    responses(
        (status = 200, description = "Team created", body = TeamSummary),
        (status = 409, description = "Session already has a team")
    )
)]
pub async fn create_team(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(session_id): Path<String>,
    Valid(Json(payload)): Valid<Json<CreateTeamRequest>>,
) -> Result<Json<TeamSummary>, AppError> {
    let summary =
        team_service::create_team(&state, user.id, &user.name, &session_id, payload).await?;
    Ok(Json(summary))
}

/// List the teams of a game session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/teams",
    tag = "teams",
    params(("session_id" = String, Path, description = "Game session identifier")),
    responses((status = 200, description = "Teams of the session", body = [TeamSummary]))
)]
pub async fn list_teams(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<TeamSummary>>, AppError> {
    let teams = team_service::list_teams(&state, &session_id).await?;
    Ok(Json(teams))
}

/// List forming teams with free capacity across every session.
#[utoipa::path(
    get,
    path = "/teams/available",
    tag = "teams",
    responses((status = 200, description = "Joinable teams", body = [TeamSummary]))
)]
pub async fn list_available_teams(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<Json<Vec<TeamSummary>>, AppError> {
    let teams = team_service::list_available_teams(&state).await?;
    Ok(Json(teams))
}

/// Rename a team; captain only.
#[utoipa::path(
    patch,
    path = "/teams/{team_id}",
    tag = "teams",
    params(("team_id" = Uuid, Path, description = "Team to rename")),
    request_body = RenameTeamRequest,
    responses((status = 200, description = "Team renamed", body = TeamSummary))
)]
pub async fn rename_team(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<RenameTeamRequest>>,
) -> Result<Json<TeamSummary>, AppError> {
    let summary = team_service::rename_team(&state, user.id, team_id, payload).await?;
    Ok(Json(summary))
}

/// Leave a team; captains disband their team by leaving.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/leave",
    tag = "teams",
    params(("team_id" = Uuid, Path, description = "Team to leave")),
    responses((status = 204, description = "Left the team"))
)]
pub async fn leave_team(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    team_service::leave_team(&state, user.id, team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set or clear the team's ready flag; captain only.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/ready",
    tag = "teams",
    params(("team_id" = Uuid, Path, description = "Team whose flag changes")),
    request_body = SetReadyRequest,
    responses((status = 200, description = "Readiness snapshot", body = TeamReadyStatusEvent))
)]
pub async fn set_ready(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<SetReadyRequest>,
) -> Result<Json<TeamReadyStatusEvent>, AppError> {
    let snapshot = readiness_service::set_ready(&state, user.id, team_id, payload.ready).await?;
    Ok(Json(snapshot))
}
