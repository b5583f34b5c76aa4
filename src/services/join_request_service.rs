//! The join-request state machine: self-service requests to join a forming
//! team, resolved by the target team's captain.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dto::{
        events::{JoinRequestCreatedEvent, JoinRequestUpdatedEvent, TeamUpdatedEvent},
        join_request::JoinRequestSummary,
        team::TeamSummary,
    },
    error::ServiceError,
    services::{expiry_sweeper, hub_events},
    state::{
        SharedState,
        roster::{
            JoinRequestStatus, MembershipError, SessionRoster, TeamJoinRequest, TeamStatus, UserId,
        },
    },
};

/// File a request to join a forming team.
///
/// The global pending-request index is the linearization point of the
/// one-pending-request-per-user invariant: the claim is atomic, so two
/// concurrent creations by the same user cannot both succeed.
pub async fn create_request(
    state: &SharedState,
    requester_id: UserId,
    requester_name: &str,
    team_id: Uuid,
) -> Result<JoinRequestSummary, ServiceError> {
    let session_id = state
        .roster()
        .session_of_team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
    let handle = state
        .roster()
        .session(&session_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let mut session = handle.lock().await;

    let now = SystemTime::now();
    expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

    let team = session
        .team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;

    if team.is_member(requester_id) {
        return Err(ServiceError::Conflict("you are already on this team".into()));
    }
    if session.team_of_user(requester_id).is_some() {
        return Err(ServiceError::Conflict(
            "you are already on a team in this session".into(),
        ));
    }
    if session.phase.is_locked() {
        return Err(ServiceError::Conflict(
            "the battle is about to start; the roster is locked".into(),
        ));
    }
    if !matches!(team.status, TeamStatus::Forming) {
        return Err(ServiceError::Conflict("the team is not forming".into()));
    }
    if !team.has_capacity() {
        return Err(ServiceError::CapacityExceeded("the team is full".into()));
    }

    let captain_id = team.captain_id;
    let team_name = team.name.clone();
    let request = TeamJoinRequest::new(
        team_id,
        &session_id,
        requester_id,
        requester_name,
        now,
        state.config().join_request_ttl(),
    );

    if !state.roster().claim_pending_request(requester_id, request.id) {
        return Err(ServiceError::AlreadyPending(
            "you already have a pending join request".into(),
        ));
    }

    session.join_requests.insert(request.id, request.clone());
    if let Err(err) = state.persist_session(&session).await {
        // Roll the claim back so a storage hiccup cannot wedge the user.
        session.join_requests.shift_remove(&request.id);
        state
            .roster()
            .release_pending_request(requester_id, request.id);
        return Err(err);
    }
    drop(session);

    let summary = JoinRequestSummary::new(&request, Some(team_name));
    hub_events::send_join_request_created(
        state,
        captain_id,
        JoinRequestCreatedEvent {
            request: summary.clone(),
        },
    );

    Ok(summary)
}

/// Accept or reject a pending join request; captain of the target team only.
pub async fn respond_request(
    state: &SharedState,
    captain_id: UserId,
    request_id: Uuid,
    accept: bool,
) -> Result<JoinRequestSummary, ServiceError> {
    for (session_id, handle) in state.roster().sessions_snapshot() {
        let session = handle.lock().await;
        if !session.join_requests.contains_key(&request_id) {
            continue;
        }
        return respond_in_session(state, session, &session_id, captain_id, request_id, accept)
            .await;
    }

    Err(ServiceError::NotFound(format!(
        "join request `{request_id}` not found"
    )))
}

async fn respond_in_session(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    captain_id: UserId,
    request_id: Uuid,
    accept: bool,
) -> Result<JoinRequestSummary, ServiceError> {
    let now = SystemTime::now();
    expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

    let request = session
        .join_requests
        .get(&request_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("join request `{request_id}` not found")))?;

    let team = session
        .team(request.team_id)
        .ok_or_else(|| ServiceError::NotFound("the target team no longer exists".into()))?;
    if team.captain_id != captain_id {
        return Err(ServiceError::Forbidden(
            "only the target team's captain may respond to this request".into(),
        ));
    }
    if !request.is_pending() {
        return Err(match request.status {
            JoinRequestStatus::Expired => {
                ServiceError::Expired("this join request already expired".into())
            }
            _ => ServiceError::Conflict("this join request was already resolved".into()),
        });
    }

    if !accept {
        return resolve(
            state,
            session,
            request_id,
            JoinRequestStatus::Rejected,
            captain_id,
        )
        .await;
    }

    if session.phase.is_locked() {
        return Err(ServiceError::Conflict(
            "the battle is about to start; the roster is locked".into(),
        ));
    }

    let requester_id = request.requester_id;
    let requester_name = request.requester_name.clone();
    let team_id = request.team_id;

    let added = session
        .team_mut(team_id)
        .expect("team presence checked above")
        .add_member(requester_id, requester_name, now)
        .map(|_| ());
    if let Err(err) = added {
        return match err {
            MembershipError::TeamFull => {
                // The slot race was lost; the request auto-invalidates.
                expire_request(state, session, request_id).await?;
                Err(ServiceError::CapacityExceeded(
                    "the team filled up before the request was accepted".into(),
                ))
            }
            MembershipError::AlreadyMember(_) => Err(ServiceError::Conflict(
                "the requester is already on the team".into(),
            )),
        };
    }

    let team = session.team(team_id).expect("team presence checked above");
    let team_name = team.name.clone();
    let team_full = !team.has_capacity();
    let team_summary = TeamSummary::from(team);

    session
        .join_requests
        .get_mut(&request_id)
        .expect("request presence checked above")
        .status = JoinRequestStatus::Accepted;

    // Defensive sweep: the single-active-request index means there should be
    // no other pending requests by this user, but the engine enforces it.
    let mut stale_requests = session.expire_other_requests_by(requester_id, Some(request_id));
    if team_full {
        stale_requests.extend(session.expire_requests_for_team(team_id));
    }
    // Joining a team makes pending invitations to this user in the session moot.
    let stale_invitations = session.expire_other_invitations_for(requester_id, None);
    let batch = expiry_sweeper::batch_from(&session, stale_invitations, stale_requests);

    state
        .roster()
        .record_membership(requester_id, session_id, team_id);
    state.persist_session(&session).await?;
    drop(session);

    state
        .roster()
        .release_pending_request(requester_id, request_id);

    let accepted = TeamJoinRequest {
        status: JoinRequestStatus::Accepted,
        ..request
    };
    let summary = JoinRequestSummary::new(&accepted, Some(team_name));

    expiry_sweeper::publish(state, batch);
    hub_events::broadcast_team_updated(state, TeamUpdatedEvent { team: team_summary });
    hub_events::send_join_request_updated(
        state,
        [requester_id, captain_id],
        JoinRequestUpdatedEvent {
            request: summary.clone(),
        },
    );
    state.hub().subscribe(session_id, requester_id);

    Ok(summary)
}

/// Withdraw a pending join request; requester only, always legal while
/// pending.
pub async fn cancel_request(
    state: &SharedState,
    requester_id: UserId,
    request_id: Uuid,
) -> Result<JoinRequestSummary, ServiceError> {
    for (_, handle) in state.roster().sessions_snapshot() {
        let mut session = handle.lock().await;
        if !session.join_requests.contains_key(&request_id) {
            continue;
        }

        let now = SystemTime::now();
        expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

        let request = session
            .join_requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("join request `{request_id}` not found"))
            })?;
        if request.requester_id != requester_id {
            return Err(ServiceError::Forbidden(
                "only the requester may cancel this request".into(),
            ));
        }
        if !request.is_pending() {
            return Err(match request.status {
                JoinRequestStatus::Expired => {
                    ServiceError::Expired("this join request already expired".into())
                }
                _ => ServiceError::Conflict("this join request was already resolved".into()),
            });
        }

        let captain_id = session.team(request.team_id).map(|team| team.captain_id);
        let summary = flip_and_persist(state, &mut session, request_id, JoinRequestStatus::Cancelled)
            .await?;
        drop(session);

        state
            .roster()
            .release_pending_request(requester_id, request_id);
        let recipients = [Some(requester_id), captain_id].into_iter().flatten();
        hub_events::send_join_request_updated(
            state,
            recipients,
            JoinRequestUpdatedEvent {
                request: summary.clone(),
            },
        );
        return Ok(summary);
    }

    Err(ServiceError::NotFound(format!(
        "join request `{request_id}` not found"
    )))
}

/// Pending requests targeting teams the caller captains, across sessions.
pub async fn list_requests_for_captain(
    state: &SharedState,
    captain_id: UserId,
) -> Result<Vec<JoinRequestSummary>, ServiceError> {
    let now = SystemTime::now();
    let mut pending = Vec::new();

    for (_, handle) in state.roster().sessions_snapshot() {
        let mut session = handle.lock().await;
        expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

        for request in session.join_requests.values() {
            if !request.is_pending() {
                continue;
            }
            let Some(team) = session.team(request.team_id) else {
                continue;
            };
            if team.captain_id == captain_id {
                pending.push(JoinRequestSummary::new(request, Some(team.name.clone())));
            }
        }
    }

    Ok(pending)
}

/// Reject path shared with cancel: flip, persist, notify both parties.
async fn resolve(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    request_id: Uuid,
    status: JoinRequestStatus,
    captain_id: UserId,
) -> Result<JoinRequestSummary, ServiceError> {
    let requester_id = session
        .join_requests
        .get(&request_id)
        .expect("request presence checked above")
        .requester_id;
    let summary = flip_and_persist(state, &mut session, request_id, status).await?;
    drop(session);

    state
        .roster()
        .release_pending_request(requester_id, request_id);
    hub_events::send_join_request_updated(
        state,
        [requester_id, captain_id],
        JoinRequestUpdatedEvent {
            request: summary.clone(),
        },
    );

    Ok(summary)
}

/// Defensive expiry of a request whose slot race was lost.
async fn expire_request(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    request_id: Uuid,
) -> Result<(), ServiceError> {
    let (requester_id, captain_id) = {
        let request = session
            .join_requests
            .get(&request_id)
            .expect("request presence checked above");
        let captain_id = session.team(request.team_id).map(|team| team.captain_id);
        (request.requester_id, captain_id)
    };

    let summary =
        flip_and_persist(state, &mut session, request_id, JoinRequestStatus::Expired).await?;
    drop(session);

    state
        .roster()
        .release_pending_request(requester_id, request_id);
    let recipients = [Some(requester_id), captain_id].into_iter().flatten();
    hub_events::send_join_request_updated(
        state,
        recipients,
        JoinRequestUpdatedEvent { request: summary },
    );

    Ok(())
}

async fn flip_and_persist(
    state: &SharedState,
    session: &mut SessionRoster,
    request_id: Uuid,
    status: JoinRequestStatus,
) -> Result<JoinRequestSummary, ServiceError> {
    let request = session
        .join_requests
        .get_mut(&request_id)
        .expect("request presence checked above");
    request.status = status;
    let request = request.clone();

    let team_name = session.team(request.team_id).map(|team| team.name.clone());
    state.persist_session(session).await?;

    Ok(JoinRequestSummary::new(&request, team_name))
}
