//! The invitation state machine: opponent and teammate invitations, their
//! acceptance effects, and the invalidation of competing offers.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dto::{
        events::{
            InvitationCreatedEvent, InvitationExpiredEvent, InvitationUpdatedEvent,
            OpponentAcceptedInvitationEvent, TeamCreatedEvent, TeamUpdatedEvent,
        },
        invitation::{InvitationSummary, InviteRequest, RespondInvitationRequest},
        team::{BattleSummary, TeamSummary},
    },
    error::ServiceError,
    services::{expiry_sweeper, hub_events},
    state::{
        SharedState,
        battle::BattleEvent,
        roster::{
            BattlePairing, InvitationKind, InvitationStatus, MembershipError, SessionRoster, Team,
            TeamInvitation, UserId,
        },
    },
};

/// Issue an invitation from a team's captain to another player.
pub async fn create_invitation(
    state: &SharedState,
    inviter_id: UserId,
    team_id: Uuid,
    request: InviteRequest,
) -> Result<InvitationSummary, ServiceError> {
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

    let kind: InvitationKind = request.kind.into();
    let team = session
        .team(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;

    if team.captain_id != inviter_id {
        return Err(ServiceError::Forbidden(
            "only the captain can send invitations".into(),
        ));
    }
    if request.invitee_id == inviter_id {
        return Err(ServiceError::InvalidInput("you cannot invite yourself".into()));
    }

    match kind {
        InvitationKind::Opponent => {
            if session.phase.is_paired() {
                return Err(ServiceError::SlotAlreadyFilled(
                    "this session already has an opponent team".into(),
                ));
            }
        }
        InvitationKind::Teammate => {
            if session.phase.is_locked() {
                return Err(ServiceError::Conflict(
                    "the battle is about to start; the roster is locked".into(),
                ));
            }
            if !team.has_capacity() {
                return Err(ServiceError::CapacityExceeded(
                    "the team already has 3 members".into(),
                ));
            }
        }
    }

    if session.team_of_user(request.invitee_id).is_some() {
        return Err(ServiceError::Conflict(
            "this player is already on a team in the session".into(),
        ));
    }
    let duplicate = session.invitations.values().any(|invitation| {
        invitation.is_pending()
            && invitation.invitee_id == request.invitee_id
            && invitation.team_id == team_id
            && invitation.kind == kind
    });
    if duplicate {
        return Err(ServiceError::Conflict(
            "an invitation to this player is already pending".into(),
        ));
    }

    let team_name = team.name.clone();
    let invitation = TeamInvitation::new(
        team_id,
        &session_id,
        inviter_id,
        request.invitee_id,
        kind,
        now,
        state.config().invitation_ttl(),
    );
    session.invitations.insert(invitation.id, invitation.clone());
    state.persist_session(&session).await?;
    drop(session);

    let summary = InvitationSummary::new(&invitation, Some(team_name.clone()));
    hub_events::send_invitation_created(
        state,
        invitation.invitee_id,
        InvitationCreatedEvent {
            invitation: summary.clone(),
        },
    );
    if !state.hub().is_connected(invitation.invitee_id) {
        state.notifier().invitation_issued(&invitation, &team_name);
    }

    Ok(summary)
}

/// Accept or decline an invitation addressed to the caller.
pub async fn respond_invitation(
    state: &SharedState,
    user_id: UserId,
    username: &str,
    invitation_id: Uuid,
    request: RespondInvitationRequest,
) -> Result<InvitationSummary, ServiceError> {
    for (session_id, handle) in state.roster().sessions_snapshot() {
        let session = handle.lock().await;
        if !session.invitations.contains_key(&invitation_id) {
            continue;
        }
        return respond_in_session(state, session, &session_id, user_id, username, invitation_id, request)
            .await;
    }

    Err(ServiceError::NotFound(format!(
        "invitation `{invitation_id}` not found"
    )))
}

async fn respond_in_session(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    user_id: UserId,
    username: &str,
    invitation_id: Uuid,
    request: RespondInvitationRequest,
) -> Result<InvitationSummary, ServiceError> {
    let now = SystemTime::now();
    expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

    let invitation = session
        .invitations
        .get(&invitation_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("invitation `{invitation_id}` not found")))?;

    if invitation.invitee_id != user_id {
        return Err(ServiceError::Forbidden(
            "only the invited player can respond to this invitation".into(),
        ));
    }
    if !invitation.is_pending() {
        return Err(match invitation.status {
            InvitationStatus::Expired => {
                ServiceError::Expired("this invitation already expired".into())
            }
            _ => ServiceError::Conflict("this invitation was already resolved".into()),
        });
    }

    if !request.accept {
        return decline(state, session, invitation_id, &invitation).await;
    }

    match invitation.kind {
        InvitationKind::Teammate => {
            accept_teammate(state, session, session_id, user_id, username, &invitation, now).await
        }
        InvitationKind::Opponent => {
            accept_opponent(
                state,
                session,
                session_id,
                user_id,
                username,
                &invitation,
                request.team_name.as_deref(),
                now,
            )
            .await
        }
    }
}

/// Declines are terminal and do not affect other pending invitations.
async fn decline(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    invitation_id: Uuid,
    invitation: &TeamInvitation,
) -> Result<InvitationSummary, ServiceError> {
    session
        .invitations
        .get_mut(&invitation_id)
        .expect("invitation checked above")
        .status = InvitationStatus::Declined;

    let team_name = session
        .team(invitation.team_id)
        .map(|team| team.name.clone());
    let declined = session
        .invitations
        .get(&invitation_id)
        .expect("invitation checked above")
        .clone();
    let summary = InvitationSummary::new(&declined, team_name);

    state.persist_session(&session).await?;
    drop(session);

    hub_events::send_invitation_updated(
        state,
        [invitation.inviter_id, invitation.invitee_id],
        InvitationUpdatedEvent {
            invitation: summary.clone(),
        },
    );

    Ok(summary)
}

async fn accept_teammate(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    user_id: UserId,
    username: &str,
    invitation: &TeamInvitation,
    now: SystemTime,
) -> Result<InvitationSummary, ServiceError> {
    if session.phase.is_locked() {
        return Err(ServiceError::Conflict(
            "the battle is about to start; the roster is locked".into(),
        ));
    }
    if session.team_of_user(user_id).is_some() {
        return Err(ServiceError::Conflict(
            "you are already on a team in this session".into(),
        ));
    }

    let team = session
        .team_mut(invitation.team_id)
        .ok_or_else(|| ServiceError::NotFound("the inviting team no longer exists".into()))?;
    team.add_member(user_id, username, now)
        .map_err(|err| match err {
            MembershipError::TeamFull => ServiceError::CapacityExceeded(
                "the team filled up before you accepted".into(),
            ),
            MembershipError::AlreadyMember(_) => {
                ServiceError::Conflict("you are already on this team".into())
            }
        })?;

    let team_id = team.id;
    let team_name = team.name.clone();
    let team_full = !team.has_capacity();
    let team_summary = TeamSummary::from(&*team);

    session
        .invitations
        .get_mut(&invitation.id)
        .expect("invitation checked above")
        .status = InvitationStatus::Accepted;

    // The invitee commits to exactly one offer.
    let invalidated = session.expire_other_invitations_for(user_id, Some(invitation.id));
    let mut stale_requests = session.expire_other_requests_by(user_id, None);
    if team_full {
        stale_requests.extend(session.expire_requests_for_team(team_id));
    }
    let batch = expiry_sweeper::batch_from(&session, invalidated, stale_requests);

    state.roster().record_membership(user_id, session_id, team_id);
    state.persist_session(&session).await?;
    drop(session);

    let accepted = TeamInvitation {
        status: InvitationStatus::Accepted,
        ..invitation.clone()
    };
    let summary = InvitationSummary::new(&accepted, Some(team_name));

    expiry_sweeper::publish(state, batch);
    hub_events::broadcast_team_updated(state, TeamUpdatedEvent { team: team_summary });
    hub_events::send_invitation_updated(
        state,
        [invitation.inviter_id, user_id],
        InvitationUpdatedEvent {
            invitation: summary.clone(),
        },
    );
    state.hub().subscribe(session_id, user_id);

    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
async fn accept_opponent(
    state: &SharedState,
    mut session: tokio::sync::MutexGuard<'_, SessionRoster>,
    session_id: &str,
    user_id: UserId,
    username: &str,
    invitation: &TeamInvitation,
    team_name: Option<&str>,
    now: SystemTime,
) -> Result<InvitationSummary, ServiceError> {
    if session.phase.is_paired() {
        // Raced shut: the invitation ends expired, never accepted.
        session
            .invitations
            .get_mut(&invitation.id)
            .expect("invitation checked above")
            .status = InvitationStatus::Expired;
        let inviter_team_name = session
            .team(invitation.team_id)
            .map(|team| team.name.clone());
        let expired = session
            .invitations
            .get(&invitation.id)
            .expect("invitation checked above")
            .clone();
        state.persist_session(&session).await?;
        drop(session);

        hub_events::send_invitation_expired(
            state,
            InvitationExpiredEvent {
                invitation: InvitationSummary::new(&expired, inviter_team_name),
            },
        );
        return Err(ServiceError::SlotAlreadyFilled(
            "another opponent paired with this session first".into(),
        ));
    }

    let name = team_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ServiceError::InvalidInput(
                "a team name is required to accept an opponent invitation".into(),
            )
        })?;
    if session.team_of_user(user_id).is_some() {
        return Err(ServiceError::Conflict(
            "you are already on a team in this session".into(),
        ));
    }
    let side_a_id = invitation.team_id;
    let side_a_name = session
        .team(side_a_id)
        .map(|team| team.name.clone())
        .ok_or_else(|| ServiceError::NotFound("the inviting team no longer exists".into()))?;

    let side_b = Team::new(session_id, name, user_id, username, now);
    let side_b_id = side_b.id;
    let side_b_summary = TeamSummary::from(&side_b);
    session.teams.insert(side_b_id, side_b);
    session.pairing = Some(BattlePairing {
        battle_id: Uuid::new_v4(),
        side_a: side_a_id,
        side_b: side_b_id,
    });
    session.apply_phase(BattleEvent::OpponentJoined)?;

    session
        .invitations
        .get_mut(&invitation.id)
        .expect("invitation checked above")
        .status = InvitationStatus::Accepted;

    let invalidated = session.expire_other_invitations_for(user_id, Some(invitation.id));
    let stale_requests = session.expire_other_requests_by(user_id, None);
    let batch = expiry_sweeper::batch_from(&session, invalidated, stale_requests);

    let battle = BattleSummary::from_roster(&session).expect("session just paired");

    state.roster().register_team(side_b_id, session_id);
    state.roster().record_membership(user_id, session_id, side_b_id);
    state.persist_session(&session).await?;
    drop(session);

    let accepted = TeamInvitation {
        status: InvitationStatus::Accepted,
        ..invitation.clone()
    };
    let summary = InvitationSummary::new(&accepted, Some(side_a_name));

    expiry_sweeper::publish(state, batch);
    hub_events::broadcast_team_created(
        state,
        TeamCreatedEvent {
            team: side_b_summary,
        },
    );
    hub_events::send_opponent_accepted(
        state,
        invitation.inviter_id,
        OpponentAcceptedInvitationEvent {
            invitation: summary.clone(),
            battle,
        },
    );
    state.hub().subscribe(session_id, user_id);

    Ok(summary)
}

/// Pending invitations addressed to the caller, across every session.
pub async fn list_invitations(
    state: &SharedState,
    user_id: UserId,
) -> Result<Vec<InvitationSummary>, ServiceError> {
    let now = SystemTime::now();
    let mut pending = Vec::new();

    for (_, handle) in state.roster().sessions_snapshot() {
        let mut session = handle.lock().await;
        expiry_sweeper::apply_lazy_expiry(state, &mut session, now).await?;

        for invitation in session.invitations.values() {
            if invitation.is_pending() && invitation.invitee_id == user_id {
                let team_name = session
                    .team(invitation.team_id)
                    .map(|team| team.name.clone());
                pending.push(InvitationSummary::new(invitation, team_name));
            }
        }
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::{invitation::InvitationKindDto, invitation::InvitationStatusDto, team::CreateTeamRequest},
        services::team_service,
        state::{AppState, battle::BattlePhase},
    };

    async fn paired_session(state: &SharedState) -> (TeamSummary, TeamSummary) {
        let side_a = team_service::create_team(
            state,
            1,
            "ada",
            "s1",
            CreateTeamRequest { name: "Alpha".into() },
        )
        .await
        .unwrap();

        let invitation = create_invitation(
            state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 2,
                kind: InvitationKindDto::Opponent,
            },
        )
        .await
        .unwrap();

        respond_invitation(
            state,
            2,
            "bob",
            invitation.id,
            RespondInvitationRequest {
                accept: true,
                team_name: Some("Beta".into()),
            },
        )
        .await
        .unwrap();

        let teams = team_service::list_teams(state, "s1").await.unwrap();
        let side_b = teams
            .iter()
            .find(|team| team.name == "Beta")
            .cloned()
            .unwrap();
        (side_a, side_b)
    }

    #[tokio::test]
    async fn opponent_acceptance_creates_side_b_and_pairs_the_session() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired_session(&state).await;

        assert_eq!(side_b.captain_id, 2);
        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.phase, BattlePhase::PairedForming);
        let pairing = session.pairing.unwrap();
        assert_eq!(pairing.side_a, side_a.id);
        assert_eq!(pairing.side_b, side_b.id);
    }

    #[tokio::test]
    async fn opponent_acceptance_requires_a_team_name() {
        let state = AppState::new(AppConfig::default());
        let side_a = team_service::create_team(
            &state,
            1,
            "ada",
            "s1",
            CreateTeamRequest { name: "Alpha".into() },
        )
        .await
        .unwrap();

        let invitation = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 2,
                kind: InvitationKindDto::Opponent,
            },
        )
        .await
        .unwrap();

        let err = respond_invitation(
            &state,
            2,
            "bob",
            invitation.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn losing_opponent_race_expires_the_invitation() {
        let state = AppState::new(AppConfig::default());
        let side_a = team_service::create_team(
            &state,
            1,
            "ada",
            "s1",
            CreateTeamRequest { name: "Alpha".into() },
        )
        .await
        .unwrap();

        let first = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 2,
                kind: InvitationKindDto::Opponent,
            },
        )
        .await
        .unwrap();
        let second = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 3,
                kind: InvitationKindDto::Opponent,
            },
        )
        .await
        .unwrap();

        respond_invitation(
            &state,
            2,
            "bob",
            first.id,
            RespondInvitationRequest {
                accept: true,
                team_name: Some("Beta".into()),
            },
        )
        .await
        .unwrap();

        let err = respond_invitation(
            &state,
            3,
            "carol",
            second.id,
            RespondInvitationRequest {
                accept: true,
                team_name: Some("Gamma".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::SlotAlreadyFilled(_)));

        // The race loser's invitation ends expired, never accepted.
        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.invitations[&second.id].status,
            InvitationStatus::Expired
        );
        assert_eq!(session.teams.len(), 2);
    }

    #[tokio::test]
    async fn acceptance_invalidates_every_competing_pending_offer() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired_session(&state).await;

        let from_a = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();
        let from_b = create_invitation(
            &state,
            2,
            side_b.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();

        let accepted = respond_invitation(
            &state,
            9,
            "grace",
            from_a.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(accepted.status, InvitationStatusDto::Accepted);

        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.invitations[&from_b.id].status,
            InvitationStatus::Expired
        );
        assert!(session.team(side_a.id).unwrap().is_member(9));
    }

    #[tokio::test]
    async fn decline_is_terminal_and_leaves_other_offers_pending() {
        let state = AppState::new(AppConfig::default());
        let (side_a, side_b) = paired_session(&state).await;

        let from_a = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();
        let from_b = create_invitation(
            &state,
            2,
            side_b.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();

        respond_invitation(
            &state,
            9,
            "grace",
            from_a.id,
            RespondInvitationRequest {
                accept: false,
                team_name: None,
            },
        )
        .await
        .unwrap();

        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.invitations[&from_a.id].status,
            InvitationStatus::Declined
        );
        assert!(session.invitations[&from_b.id].is_pending());
    }

    #[tokio::test]
    async fn concurrent_acceptances_cannot_exceed_capacity() {
        let state = AppState::new(AppConfig::default());
        let (side_a, _) = paired_session(&state).await;

        // Bring Alpha to two members, one slot left.
        let filler = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 8,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();
        respond_invitation(
            &state,
            8,
            "hal",
            filler.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        )
        .await
        .unwrap();

        let inv_nine = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();
        let inv_ten = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 10,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();

        let accept_nine = respond_invitation(
            &state,
            9,
            "grace",
            inv_nine.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        );
        let accept_ten = respond_invitation(
            &state,
            10,
            "ivan",
            inv_ten.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        );

        let (nine, ten) = tokio::join!(accept_nine, accept_ten);
        let successes = [&nine, &ten].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if nine.is_ok() { ten } else { nine };
        assert!(matches!(
            loser.unwrap_err(),
            ServiceError::CapacityExceeded(_)
        ));

        let handle = state.roster().session("s1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.team(side_a.id).unwrap().members.len(), 3);
    }

    #[tokio::test]
    async fn expired_invitation_cannot_be_accepted() {
        let state = AppState::new(AppConfig::default());
        let (side_a, _) = paired_session(&state).await;

        let invitation = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();

        {
            let handle = state.roster().session("s1").unwrap();
            let mut session = handle.lock().await;
            session
                .invitations
                .get_mut(&invitation.id)
                .unwrap()
                .expires_at = SystemTime::now() - std::time::Duration::from_secs(1);
        }

        let err = respond_invitation(
            &state,
            9,
            "grace",
            invitation.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Expired(_)));
    }

    #[tokio::test]
    async fn only_the_invitee_may_respond() {
        let state = AppState::new(AppConfig::default());
        let (side_a, _) = paired_session(&state).await;

        let invitation = create_invitation(
            &state,
            1,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap();

        let err = respond_invitation(
            &state,
            10,
            "ivan",
            invitation.id,
            RespondInvitationRequest {
                accept: true,
                team_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn non_captains_cannot_invite() {
        let state = AppState::new(AppConfig::default());
        let (side_a, _) = paired_session(&state).await;

        let err = create_invitation(
            &state,
            2,
            side_a.id,
            InviteRequest {
                invitee_id: 9,
                kind: InvitationKindDto::Teammate,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
