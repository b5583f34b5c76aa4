//! Background TTL sweep for invitations and join requests.
//!
//! Expiry is evaluated lazily on read by the command paths (they call
//! [`collect_due`] under the session lock) and proactively here, so clients
//! drop stale offers without polling. Entries are flipped in the
//! authoritative in-memory roster first; a persistence failure therefore
//! never un-expires anything, it only delays the snapshot write, which the
//! run loop retries with backoff.

use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{InvitationExpiredEvent, JoinRequestUpdatedEvent},
        invitation::InvitationSummary,
        join_request::JoinRequestSummary,
    },
    error::ServiceError,
    services::hub_events,
    state::{
        SharedState,
        roster::{SessionRoster, TeamInvitation, TeamJoinRequest, UserId},
    },
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Everything needed to notify the parties of one expired join request.
pub(crate) struct ExpiredRequestNotice {
    /// Full-value projection of the expired request.
    pub summary: JoinRequestSummary,
    /// Player who issued the request.
    pub requester_id: UserId,
    /// Request identifier, used to release the single-pending-request slot.
    pub request_id: Uuid,
    /// Captain of the target team, when the team still exists.
    pub captain_id: Option<UserId>,
}

/// Expired entries collected under one session lock, published after it.
pub(crate) struct ExpiryBatch {
    pub invitations: Vec<InvitationSummary>,
    pub requests: Vec<ExpiredRequestNotice>,
}

impl ExpiryBatch {
    pub fn is_empty(&self) -> bool {
        self.invitations.is_empty() && self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.invitations.len() + self.requests.len()
    }
}

/// Flip every due pending entry of the session and collect the notices.
pub(crate) fn collect_due(session: &mut SessionRoster, now: SystemTime) -> ExpiryBatch {
    let (invitations, requests) = session.expire_due(now);
    batch_from(session, invitations, requests)
}

/// Build the notification batch for entries that just turned terminal.
pub(crate) fn batch_from(
    session: &SessionRoster,
    invitations: Vec<TeamInvitation>,
    requests: Vec<TeamJoinRequest>,
) -> ExpiryBatch {
    let invitations = invitations
        .iter()
        .map(|invitation| {
            let team_name = session
                .team(invitation.team_id)
                .map(|team| team.name.clone());
            InvitationSummary::new(invitation, team_name)
        })
        .collect();

    let requests = requests
        .iter()
        .map(|request| {
            let team = session.team(request.team_id);
            ExpiredRequestNotice {
                summary: JoinRequestSummary::new(request, team.map(|t| t.name.clone())),
                requester_id: request.requester_id,
                request_id: request.id,
                captain_id: team.map(|t| t.captain_id),
            }
        })
        .collect();

    ExpiryBatch {
        invitations,
        requests,
    }
}

/// Release indexes and emit the events for a collected batch.
///
/// Must be called after the owning session lock is dropped.
pub(crate) fn publish(state: &SharedState, batch: ExpiryBatch) {
    for invitation in batch.invitations {
        hub_events::send_invitation_expired(state, InvitationExpiredEvent { invitation });
    }

    for notice in batch.requests {
        state
            .roster()
            .release_pending_request(notice.requester_id, notice.request_id);
        let recipients = [Some(notice.requester_id), notice.captain_id]
            .into_iter()
            .flatten();
        hub_events::send_join_request_updated(
            state,
            recipients,
            JoinRequestUpdatedEvent {
                request: notice.summary,
            },
        );
    }
}

/// Lazy-expiry entry point for the command paths.
///
/// Called under the session lock before a command inspects invitation or
/// request statuses, so a command arriving after a TTL elapsed finds the
/// entity already terminal and receives a domain error, never a stale hit.
pub(crate) async fn apply_lazy_expiry(
    state: &SharedState,
    session: &mut SessionRoster,
    now: SystemTime,
) -> Result<(), ServiceError> {
    let batch = collect_due(session, now);
    if batch.is_empty() {
        return Ok(());
    }

    state.persist_session(session).await?;
    publish(state, batch);
    Ok(())
}

/// Run the sweep forever, backing off when the snapshot write fails.
pub async fn run(state: SharedState) {
    let mut delay = INITIAL_BACKOFF;

    loop {
        match sweep_once(&state, SystemTime::now()).await {
            Ok(expired) => {
                if expired > 0 {
                    debug!(expired, "expiry sweep flipped stale entries");
                }
                delay = INITIAL_BACKOFF;
                sleep(state.config().sweep_interval()).await;
            }
            Err(err) => {
                warn!(error = %err, "expiry sweep failed; retrying with backoff");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Sweep every session once, returning how many entries expired.
///
/// Events are published even when the snapshot write fails: the in-memory
/// flip already happened, and suppressing the notifications would leave
/// clients holding offers the engine will never honour again.
pub async fn sweep_once(state: &SharedState, now: SystemTime) -> Result<usize, ServiceError> {
    let mut expired = 0;
    let mut first_error = None;

    for (session_id, handle) in state.roster().sessions_snapshot() {
        let mut session = handle.lock().await;
        let batch = collect_due(&mut session, now);
        if batch.is_empty() {
            continue;
        }

        expired += batch.len();
        let persisted = state.persist_session(&session).await;
        drop(session);

        publish(state, batch);

        if let Err(err) = persisted {
            warn!(session_id = %session_id, error = %err, "failed to persist swept session");
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(expired),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            hub::ClientConnection,
            roster::{InvitationKind, Team},
        },
    };
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[tokio::test]
    async fn sweep_expires_overdue_entries_and_notifies() {
        let state = AppState::new(AppConfig::default());

        let (tx, mut invitee_rx) = mpsc::unbounded_channel::<Message>();
        state.hub().register(ClientConnection { user_id: 9, tx });

        let team_id = {
            let handle = state.roster().session_or_create("s1");
            let mut session = handle.lock().await;
            let team = Team::new("s1", "Alpha", 1, "ada", now());
            let team_id = team.id;
            session.teams.insert(team_id, team);

            let mut invitation = TeamInvitation::new(
                team_id,
                "s1",
                1,
                9,
                InvitationKind::Teammate,
                now(),
                Duration::from_secs(300),
            );
            invitation.expires_at = now();
            session.invitations.insert(invitation.id, invitation);
            team_id
        };
        state.roster().register_team(team_id, "s1");

        let expired = sweep_once(&state, now() + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let frame = invitee_rx.try_recv().expect("invitee should be notified");
        match frame {
            Message::Text(text) => assert!(text.contains("invitation_expired")),
            other => panic!("unexpected frame {other:?}"),
        }

        // A second sweep finds nothing left to expire.
        let expired = sweep_once(&state, now() + Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(expired, 0);
    }

    #[tokio::test]
    async fn sweep_releases_the_pending_request_slot() {
        let state = AppState::new(AppConfig::default());

        let request_id = {
            let handle = state.roster().session_or_create("s1");
            let mut session = handle.lock().await;
            let team = Team::new("s1", "Alpha", 1, "ada", now());
            let team_id = team.id;
            session.teams.insert(team_id, team);

            let mut request = crate::state::roster::TeamJoinRequest::new(
                team_id,
                "s1",
                7,
                "grace",
                now(),
                Duration::from_secs(300),
            );
            request.expires_at = now();
            let request_id = request.id;
            session.join_requests.insert(request_id, request);
            request_id
        };
        assert!(state.roster().claim_pending_request(7, request_id));

        sweep_once(&state, now() + Duration::from_secs(1))
            .await
            .unwrap();

        // The slot is free again, so a new request can be claimed.
        assert!(state.roster().claim_pending_request(7, Uuid::new_v4()));
    }
}
