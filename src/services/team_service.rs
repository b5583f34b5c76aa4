//! Commands and queries over teams: creation, renaming, listings, leaving.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dto::{
        events::{TeamCreatedEvent, TeamUpdatedEvent},
        team::{CreateTeamRequest, RenameTeamRequest, TeamSummary},
        validation::validate_session_id,
    },
    error::ServiceError,
    services::disconnect_service,
    state::{
        SharedState,
        roster::{Team, TeamStatus, UserId},
    },
};

/// Create the first team of a session (side A), captained by the caller.
///
/// Side B is never created through this path; it only comes into existence
/// when an opponent invitation is accepted.
pub async fn create_team(
    state: &SharedState,
    user_id: UserId,
    username: &str,
    session_id: &str,
    request: CreateTeamRequest,
) -> Result<TeamSummary, ServiceError> {
    validate_session_id(session_id).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let handle = state.roster().session_or_create(session_id);
    let mut session = handle.lock().await;

    if session.team_of_user(user_id).is_some() {
        return Err(ServiceError::Conflict(
            "you are already on a team in this session".into(),
        ));
    }
    if !session.teams.is_empty() {
        return Err(ServiceError::Conflict(
            "this session already has a team forming; request to join it or wait for an opponent invitation".into(),
        ));
    }

    let team = Team::new(
        session_id,
        request.name.trim(),
        user_id,
        username,
        SystemTime::now(),
    );
    let team_id = team.id;
    let summary = TeamSummary::from(&team);
    session.teams.insert(team_id, team);

    state.roster().register_team(team_id, session_id);
    state.roster().record_membership(user_id, session_id, team_id);
    state.persist_session(&session).await?;
    drop(session);

    state.hub().subscribe(session_id, user_id);
    crate::services::hub_events::broadcast_team_created(
        state,
        TeamCreatedEvent {
            team: summary.clone(),
        },
    );

    Ok(summary)
}

/// Rename a team; captain only, and only before the battle starts.
pub async fn rename_team(
    state: &SharedState,
    user_id: UserId,
    team_id: Uuid,
    request: RenameTeamRequest,
) -> Result<TeamSummary, ServiceError> {
    let session_id = state
        .roster()
        .session_of_team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    let handle = state
        .roster()
        .session(&session_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let mut session = handle.lock().await;

    let team = session
        .team_mut(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    if team.captain_id != user_id {
        return Err(ServiceError::Forbidden(
            "only the captain can rename the team".into(),
        ));
    }
    if matches!(team.status, TeamStatus::Playing | TeamStatus::Finished) {
        return Err(ServiceError::Conflict(
            "the battle already started; the team can no longer be renamed".into(),
        ));
    }

    team.name = request.name.trim().to_string();
    let summary = TeamSummary::from(&*team);

    state.persist_session(&session).await?;
    drop(session);

    crate::services::hub_events::broadcast_team_updated(
        state,
        TeamUpdatedEvent {
            team: summary.clone(),
        },
    );

    Ok(summary)
}

/// Leave a team voluntarily; same cascade as a confirmed disconnect.
pub async fn leave_team(
    state: &SharedState,
    user_id: UserId,
    team_id: Uuid,
) -> Result<(), ServiceError> {
    let session_id = state
        .roster()
        .session_of_team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    disconnect_service::depart(state, &session_id, team_id, user_id).await
}

/// List the teams of one session.
pub async fn list_teams(
    state: &SharedState,
    session_id: &str,
) -> Result<Vec<TeamSummary>, ServiceError> {
    validate_session_id(session_id).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let Some(handle) = state.roster().session(session_id) else {
        return Ok(Vec::new());
    };
    let session = handle.lock().await;
    Ok(session.teams.values().map(TeamSummary::from).collect())
}

/// List forming teams with free capacity across every session.
pub async fn list_available_teams(state: &SharedState) -> Result<Vec<TeamSummary>, ServiceError> {
    let mut available = Vec::new();

    for (_, handle) in state.roster().sessions_snapshot() {
        let session = handle.lock().await;
        if session.phase.is_locked() {
            continue;
        }
        for team in session.teams.values() {
            if matches!(team.status, TeamStatus::Forming) && team.has_capacity() {
                available.push(TeamSummary::from(team));
            }
        }
    }

    Ok(available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn create_request(name: &str) -> CreateTeamRequest {
        CreateTeamRequest { name: name.into() }
    }

    #[tokio::test]
    async fn create_team_seeds_side_a() {
        let state = AppState::new(AppConfig::default());
        let summary = create_team(&state, 1, "ada", "s1", create_request("Alpha"))
            .await
            .unwrap();

        assert_eq!(summary.session_id, "s1");
        assert_eq!(summary.captain_id, 1);
        assert_eq!(summary.members.len(), 1);
        assert_eq!(summary.open_slots, 2);
        assert_eq!(state.roster().session_of_team(summary.id), Some("s1".into()));
    }

    #[tokio::test]
    async fn second_create_in_same_session_is_a_conflict() {
        let state = AppState::new(AppConfig::default());
        create_team(&state, 1, "ada", "s1", create_request("Alpha"))
            .await
            .unwrap();

        let err = create_team(&state, 2, "bob", "s1", create_request("Beta"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn captain_cannot_create_twice() {
        let state = AppState::new(AppConfig::default());
        create_team(&state, 1, "ada", "s1", create_request("Alpha"))
            .await
            .unwrap();

        let err = create_team(&state, 1, "ada", "s1", create_request("Alpha Prime"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn malformed_session_id_is_rejected() {
        let state = AppState::new(AppConfig::default());
        let err = create_team(&state, 1, "ada", "has space", create_request("Alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rename_is_captain_only() {
        let state = AppState::new(AppConfig::default());
        let team = create_team(&state, 1, "ada", "s1", create_request("Alpha"))
            .await
            .unwrap();

        let err = rename_team(
            &state,
            2,
            team.id,
            RenameTeamRequest {
                name: "Hijacked".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let renamed = rename_team(
            &state,
            1,
            team.id,
            RenameTeamRequest {
                name: "Alpha Prime".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Alpha Prime");
    }

    #[tokio::test]
    async fn available_teams_only_lists_forming_with_capacity() {
        let state = AppState::new(AppConfig::default());
        let team = create_team(&state, 1, "ada", "s1", create_request("Alpha"))
            .await
            .unwrap();
        create_team(&state, 5, "eve", "s2", create_request("Gamma"))
            .await
            .unwrap();

        // Fill Alpha to capacity; it must drop out of the listing.
        {
            let handle = state.roster().session("s1").unwrap();
            let mut session = handle.lock().await;
            let alpha = session.team_mut(team.id).unwrap();
            alpha.add_member(2, "bob", SystemTime::now()).unwrap();
            alpha.add_member(3, "carol", SystemTime::now()).unwrap();
        }

        let available = list_available_teams(&state).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "Gamma");
    }
}
