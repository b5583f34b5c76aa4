use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::state::battle::{BattleEvent, BattlePhase, InvalidTransition};

/// Hard cap on roster size, captain included.
pub const TEAM_CAPACITY: usize = 3;

/// Stable numeric identifier handed out by the upstream identity provider.
pub type UserId = i64;

/// Role a member holds inside a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    /// May invite, respond to join requests, rename, and ready-up the team.
    Captain,
    /// Regular roster member.
    Member,
}

/// A single roster slot, owned exclusively by its team.
#[derive(Debug, Clone)]
pub struct TeamMember {
    /// Identity of the player occupying the slot.
    pub user_id: UserId,
    /// Display name snapshot taken when the member joined.
    pub username: String,
    /// Captain or regular member.
    pub role: MemberRole,
    /// When the member joined the team.
    pub joined_at: SystemTime,
}

/// Lifecycle status of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamStatus {
    /// Still assembling its roster.
    Forming,
    /// Captain flagged the team ready for the countdown.
    Ready,
    /// Countdown completed; the match runner owns the team now.
    Playing,
    /// The battle concluded.
    Finished,
}

/// Violations of the team membership invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    /// The roster already holds [`TEAM_CAPACITY`] members.
    #[error("team is already at {TEAM_CAPACITY} members")]
    TeamFull,
    /// The user already occupies a slot on this team.
    #[error("user {0} is already on the team")]
    AlreadyMember(UserId),
}

/// A team forming for a battle inside one game session.
#[derive(Debug, Clone)]
pub struct Team {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Display name chosen by the captain.
    pub name: String,
    /// User id of the captain; always matches the single captain-role member.
    pub captain_id: UserId,
    /// Opaque game-session identifier binding this team to its battle.
    pub session_id: String,
    /// Roster in join order, captain first.
    pub members: Vec<TeamMember>,
    /// Current lifecycle status.
    pub status: TeamStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl Team {
    /// Build a fresh team captained by `captain_id`, occupying the first slot.
    pub fn new(
        session_id: impl Into<String>,
        name: impl Into<String>,
        captain_id: UserId,
        captain_name: impl Into<String>,
        now: SystemTime,
    ) -> Self {
        let captain = TeamMember {
            user_id: captain_id,
            username: captain_name.into(),
            role: MemberRole::Captain,
            joined_at: now,
        };

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            captain_id,
            session_id: session_id.into(),
            members: vec![captain],
            status: TeamStatus::Forming,
            created_at: now,
        }
    }

    /// Whether the roster still has a free slot.
    pub fn has_capacity(&self) -> bool {
        self.members.len() < TEAM_CAPACITY
    }

    /// Number of free roster slots.
    pub fn open_slots(&self) -> usize {
        TEAM_CAPACITY.saturating_sub(self.members.len())
    }

    /// Whether `user_id` occupies a slot on this team.
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Whether the captain flagged the team ready.
    pub fn is_ready(&self) -> bool {
        matches!(self.status, TeamStatus::Ready)
    }

    /// Append a regular member, enforcing capacity and uniqueness.
    pub fn add_member(
        &mut self,
        user_id: UserId,
        username: impl Into<String>,
        now: SystemTime,
    ) -> Result<&TeamMember, MembershipError> {
        if self.is_member(user_id) {
            return Err(MembershipError::AlreadyMember(user_id));
        }
        if !self.has_capacity() {
            return Err(MembershipError::TeamFull);
        }

        self.members.push(TeamMember {
            user_id,
            username: username.into(),
            role: MemberRole::Member,
            joined_at: now,
        });

        Ok(self.members.last().expect("member just pushed"))
    }

    /// Remove `user_id` from the roster, returning the evicted slot if present.
    pub fn remove_member(&mut self, user_id: UserId) -> Option<TeamMember> {
        let index = self.members.iter().position(|m| m.user_id == user_id)?;
        Some(self.members.remove(index))
    }
}

/// Kind of invitation a captain can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationKind {
    /// Captain-to-captain; acceptance creates side B.
    Opponent,
    /// Captain-to-player; acceptance fills a roster slot.
    Teammate,
}

/// Resolution state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStatus {
    /// Awaiting the invitee's response.
    Pending,
    /// The invitee committed to this invitation.
    Accepted,
    /// The invitee turned the invitation down.
    Declined,
    /// TTL elapsed, the invitee accepted elsewhere, or the team dissolved.
    Expired,
}

/// Captain-issued invitation, opponent or teammate flavoured.
#[derive(Debug, Clone)]
pub struct TeamInvitation {
    /// Stable identifier for the invitation.
    pub id: Uuid,
    /// Team the invitation originates from.
    pub team_id: Uuid,
    /// Session the invitation binds the invitee to on acceptance.
    pub session_id: String,
    /// Captain who issued the invitation.
    pub inviter_id: UserId,
    /// Player the invitation is addressed to.
    pub invitee_id: UserId,
    /// Opponent or teammate.
    pub kind: InvitationKind,
    /// Current resolution state.
    pub status: InvitationStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Instant after which the invitation is no longer acceptable.
    pub expires_at: SystemTime,
}

impl TeamInvitation {
    /// Build a pending invitation expiring `ttl` after `now`.
    pub fn new(
        team_id: Uuid,
        session_id: impl Into<String>,
        inviter_id: UserId,
        invitee_id: UserId,
        kind: InvitationKind,
        now: SystemTime,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            session_id: session_id.into(),
            inviter_id,
            invitee_id,
            kind,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the invitation still awaits a response.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, InvitationStatus::Pending)
    }

    /// Whether the TTL has elapsed at `now`.
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// Resolution state of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRequestStatus {
    /// Awaiting the captain's decision.
    Pending,
    /// The captain accepted and the requester joined.
    Accepted,
    /// The captain turned the request down.
    Rejected,
    /// TTL elapsed or the target team filled or dissolved.
    Expired,
    /// The requester withdrew the request.
    Cancelled,
}

/// Player-initiated request to join a forming team.
#[derive(Debug, Clone)]
pub struct TeamJoinRequest {
    /// Stable identifier for the request.
    pub id: Uuid,
    /// Team the requester wants to join.
    pub team_id: Uuid,
    /// Session the target team belongs to.
    pub session_id: String,
    /// Player asking to join.
    pub requester_id: UserId,
    /// Display name snapshot taken at request time.
    pub requester_name: String,
    /// Current resolution state.
    pub status: JoinRequestStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Instant after which the request is no longer acceptable.
    pub expires_at: SystemTime,
}

impl TeamJoinRequest {
    /// Build a pending request expiring `ttl` after `now`.
    pub fn new(
        team_id: Uuid,
        session_id: impl Into<String>,
        requester_id: UserId,
        requester_name: impl Into<String>,
        now: SystemTime,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            session_id: session_id.into(),
            requester_id,
            requester_name: requester_name.into(),
            status: JoinRequestStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the request still awaits a decision.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, JoinRequestStatus::Pending)
    }

    /// Whether the TTL has elapsed at `now`.
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// Explicit first-class pairing between the two sides of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattlePairing {
    /// Stable identifier for the battle itself.
    pub battle_id: Uuid,
    /// Team created first.
    pub side_a: Uuid,
    /// Team created on opponent-invitation acceptance.
    pub side_b: Uuid,
}

impl BattlePairing {
    /// Team facing `team_id`, if `team_id` is one of the two sides.
    pub fn opposing(&self, team_id: Uuid) -> Option<Uuid> {
        if self.side_a == team_id {
            Some(self.side_b)
        } else if self.side_b == team_id {
            Some(self.side_a)
        } else {
            None
        }
    }
}

/// All formation state owned by one game session.
///
/// Every mutation happens under the session's mutex (see [`Roster`]), so the
/// check-then-mutate sequences below are never interleaved for one session.
#[derive(Debug)]
pub struct SessionRoster {
    /// Opaque session identifier minted by the first client.
    pub session_id: String,
    /// Teams in creation order; at most two.
    pub teams: IndexMap<Uuid, Team>,
    /// Present exactly while the session is paired.
    pub pairing: Option<BattlePairing>,
    /// Battle phase of the session.
    pub phase: BattlePhase,
    /// Invitations scoped to this session.
    pub invitations: IndexMap<Uuid, TeamInvitation>,
    /// Join requests targeting teams of this session.
    pub join_requests: IndexMap<Uuid, TeamJoinRequest>,
}

impl SessionRoster {
    /// Build an empty roster for `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            teams: IndexMap::new(),
            pairing: None,
            phase: BattlePhase::Unpaired,
            invitations: IndexMap::new(),
            join_requests: IndexMap::new(),
        }
    }

    /// Team by id.
    pub fn team(&self, team_id: Uuid) -> Option<&Team> {
        self.teams.get(&team_id)
    }

    /// Mutable team by id.
    pub fn team_mut(&mut self, team_id: Uuid) -> Option<&mut Team> {
        self.teams.get_mut(&team_id)
    }

    /// Team the user currently occupies a slot on, if any.
    pub fn team_of_user(&self, user_id: UserId) -> Option<&Team> {
        self.teams.values().find(|team| team.is_member(user_id))
    }

    /// Team facing `team_id` when the session is paired.
    pub fn opposing_team(&self, team_id: Uuid) -> Option<&Team> {
        let pairing = self.pairing.as_ref()?;
        self.teams.get(&pairing.opposing(team_id)?)
    }

    /// Whether nothing is left in the session.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.invitations.is_empty() && self.join_requests.is_empty()
    }

    /// Apply a battle event to the session phase.
    pub fn apply_phase(&mut self, event: BattleEvent) -> Result<BattlePhase, InvalidTransition> {
        self.phase = self.phase.apply(event)?;
        Ok(self.phase)
    }

    /// Mark every due pending invitation and join request expired.
    ///
    /// Returns clones of the entries that flipped so callers can emit events
    /// and release indexes after the lock is dropped.
    pub fn expire_due(
        &mut self,
        now: SystemTime,
    ) -> (Vec<TeamInvitation>, Vec<TeamJoinRequest>) {
        let mut invitations = Vec::new();
        for invitation in self.invitations.values_mut() {
            if invitation.is_pending() && invitation.is_due(now) {
                invitation.status = InvitationStatus::Expired;
                invitations.push(invitation.clone());
            }
        }

        let mut requests = Vec::new();
        for request in self.join_requests.values_mut() {
            if request.is_pending() && request.is_due(now) {
                request.status = JoinRequestStatus::Expired;
                requests.push(request.clone());
            }
        }

        (invitations, requests)
    }

    /// Expire every pending invitation addressed to `invitee_id` except `keep`.
    ///
    /// Called when the invitee commits to one invitation: all competing offers
    /// in the session die atomically with the acceptance.
    pub fn expire_other_invitations_for(
        &mut self,
        invitee_id: UserId,
        keep: Option<Uuid>,
    ) -> Vec<TeamInvitation> {
        let mut expired = Vec::new();
        for invitation in self.invitations.values_mut() {
            if Some(invitation.id) != keep
                && invitation.invitee_id == invitee_id
                && invitation.is_pending()
            {
                invitation.status = InvitationStatus::Expired;
                expired.push(invitation.clone());
            }
        }
        expired
    }

    /// Expire every pending invitation and join request targeting `team_id`.
    ///
    /// Cascade applied when the team dissolves.
    pub fn expire_team_entries(
        &mut self,
        team_id: Uuid,
    ) -> (Vec<TeamInvitation>, Vec<TeamJoinRequest>) {
        let mut invitations = Vec::new();
        for invitation in self.invitations.values_mut() {
            if invitation.team_id == team_id && invitation.is_pending() {
                invitation.status = InvitationStatus::Expired;
                invitations.push(invitation.clone());
            }
        }

        (invitations, self.expire_requests_for_team(team_id))
    }

    /// Expire every pending join request targeting `team_id`.
    ///
    /// Applied when the team fills up or dissolves before resolution.
    pub fn expire_requests_for_team(&mut self, team_id: Uuid) -> Vec<TeamJoinRequest> {
        let mut expired = Vec::new();
        for request in self.join_requests.values_mut() {
            if request.team_id == team_id && request.is_pending() {
                request.status = JoinRequestStatus::Expired;
                expired.push(request.clone());
            }
        }
        expired
    }

    /// Expire every pending join request by `requester_id` except `keep`.
    ///
    /// The single-active-request index should make this a no-op; the engine
    /// still enforces it.
    pub fn expire_other_requests_by(
        &mut self,
        requester_id: UserId,
        keep: Option<Uuid>,
    ) -> Vec<TeamJoinRequest> {
        let mut expired = Vec::new();
        for request in self.join_requests.values_mut() {
            if Some(request.id) != keep
                && request.requester_id == requester_id
                && request.is_pending()
            {
                request.status = JoinRequestStatus::Expired;
                expired.push(request.clone());
            }
        }
        expired
    }
}

/// Authoritative registry of per-session rosters and the global indexes
/// spanning them.
///
/// Each session is guarded by its own mutex; the indexes are concurrent maps
/// whose individual operations are atomic, which is all the cross-session
/// invariants need.
pub struct Roster {
    sessions: DashMap<String, Arc<Mutex<SessionRoster>>>,
    team_index: DashMap<Uuid, String>,
    memberships: DashMap<UserId, HashMap<String, Uuid>>,
    pending_requests: DashMap<UserId, Uuid>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            team_index: DashMap::new(),
            memberships: DashMap::new(),
            pending_requests: DashMap::new(),
        }
    }

    /// Handle to an existing session roster.
    pub fn session(&self, session_id: &str) -> Option<Arc<Mutex<SessionRoster>>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Handle to the session roster, creating an empty one when absent.
    pub fn session_or_create(&self, session_id: &str) -> Arc<Mutex<SessionRoster>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionRoster::new(session_id))))
            .value()
            .clone()
    }

    /// Install a prebuilt session roster, replacing any existing entry.
    pub fn install_session(&self, roster: SessionRoster) {
        self.sessions.insert(
            roster.session_id.clone(),
            Arc::new(Mutex::new(roster)),
        );
    }

    /// Snapshot of every session handle.
    ///
    /// Collected eagerly so no shard guard is held while callers lock the
    /// individual sessions.
    pub fn sessions_snapshot(&self) -> Vec<(String, Arc<Mutex<SessionRoster>>)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Session a team lives in.
    pub fn session_of_team(&self, team_id: Uuid) -> Option<String> {
        self.team_index.get(&team_id).map(|entry| entry.value().clone())
    }

    /// Record that `team_id` lives in `session_id`.
    pub fn register_team(&self, team_id: Uuid, session_id: &str) {
        self.team_index.insert(team_id, session_id.to_string());
    }

    /// Drop the team from the lookup index.
    pub fn forget_team(&self, team_id: Uuid) {
        self.team_index.remove(&team_id);
    }

    /// Record that `user_id` occupies a slot on `team_id` in `session_id`.
    pub fn record_membership(&self, user_id: UserId, session_id: &str, team_id: Uuid) {
        self.memberships
            .entry(user_id)
            .or_default()
            .insert(session_id.to_string(), team_id);
    }

    /// Drop the user's membership in `session_id`.
    pub fn clear_membership(&self, user_id: UserId, session_id: &str) {
        if let Some(mut entry) = self.memberships.get_mut(&user_id) {
            entry.remove(session_id);
            if entry.is_empty() {
                drop(entry);
                self.memberships.remove_if(&user_id, |_, map| map.is_empty());
            }
        }
    }

    /// Every `(session, team)` pair the user currently belongs to.
    pub fn memberships_of(&self, user_id: UserId) -> Vec<(String, Uuid)> {
        self.memberships
            .get(&user_id)
            .map(|entry| {
                entry
                    .iter()
                    .map(|(session, team)| (session.clone(), *team))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Atomically claim the single-active-join-request slot for `user_id`.
    ///
    /// Returns `false` when another pending request already holds the slot,
    /// which is the linearization point of the one-pending-request-per-user
    /// invariant.
    pub fn claim_pending_request(&self, user_id: UserId, request_id: Uuid) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.pending_requests.entry(user_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(request_id);
                true
            }
        }
    }

    /// Release the slot, but only if it is still held by `request_id`.
    pub fn release_pending_request(&self, user_id: UserId, request_id: Uuid) {
        self.pending_requests
            .remove_if(&user_id, |_, held| *held == request_id);
    }

    /// Identifier of the user's pending join request, if any.
    pub fn pending_request_of(&self, user_id: UserId) -> Option<Uuid> {
        self.pending_requests.get(&user_id).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn team() -> Team {
        Team::new("s1", "Alpha", 1, "ada", now())
    }

    #[test]
    fn new_team_has_exactly_one_captain() {
        let team = team();
        assert_eq!(team.members.len(), 1);
        assert_eq!(team.captain_id, 1);
        let captains = team
            .members
            .iter()
            .filter(|m| m.role == MemberRole::Captain)
            .count();
        assert_eq!(captains, 1);
        assert_eq!(team.members[0].user_id, team.captain_id);
    }

    #[test]
    fn capacity_is_enforced_at_three() {
        let mut team = team();
        team.add_member(2, "bob", now()).unwrap();
        team.add_member(3, "eve", now()).unwrap();
        assert!(!team.has_capacity());
        assert_eq!(
            team.add_member(4, "mallory", now()).unwrap_err(),
            MembershipError::TeamFull
        );
        assert_eq!(team.members.len(), TEAM_CAPACITY);
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let mut team = team();
        team.add_member(2, "bob", now()).unwrap();
        assert_eq!(
            team.add_member(2, "bob", now()).unwrap_err(),
            MembershipError::AlreadyMember(2)
        );
    }

    #[test]
    fn removing_a_member_frees_the_slot() {
        let mut team = team();
        team.add_member(2, "bob", now()).unwrap();
        let evicted = team.remove_member(2).unwrap();
        assert_eq!(evicted.user_id, 2);
        assert!(team.has_capacity());
        assert!(team.remove_member(2).is_none());
    }

    #[test]
    fn expire_due_flips_only_overdue_pending_entries() {
        let mut roster = SessionRoster::new("s1");
        let ttl = Duration::from_secs(300);

        let fresh = TeamInvitation::new(Uuid::new_v4(), "s1", 1, 2, InvitationKind::Teammate, now(), ttl);
        let mut stale = TeamInvitation::new(Uuid::new_v4(), "s1", 1, 3, InvitationKind::Teammate, now(), ttl);
        stale.expires_at = now() - Duration::from_secs(1);
        let mut declined = TeamInvitation::new(Uuid::new_v4(), "s1", 1, 4, InvitationKind::Teammate, now(), ttl);
        declined.status = InvitationStatus::Declined;
        declined.expires_at = now() - Duration::from_secs(1);

        let stale_id = stale.id;
        for invitation in [fresh, stale, declined] {
            roster.invitations.insert(invitation.id, invitation);
        }

        let (expired, _) = roster.expire_due(now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale_id);
        assert_eq!(
            roster.invitations[&stale_id].status,
            InvitationStatus::Expired
        );
    }

    #[test]
    fn accepting_one_invitation_expires_competing_offers() {
        let mut roster = SessionRoster::new("s1");
        let ttl = Duration::from_secs(300);
        let kept = TeamInvitation::new(Uuid::new_v4(), "s1", 1, 9, InvitationKind::Teammate, now(), ttl);
        let rival = TeamInvitation::new(Uuid::new_v4(), "s1", 2, 9, InvitationKind::Teammate, now(), ttl);
        let other_user = TeamInvitation::new(Uuid::new_v4(), "s1", 1, 5, InvitationKind::Teammate, now(), ttl);

        let kept_id = kept.id;
        let rival_id = rival.id;
        let other_id = other_user.id;
        for invitation in [kept, rival, other_user] {
            roster.invitations.insert(invitation.id, invitation);
        }

        let expired = roster.expire_other_invitations_for(9, Some(kept_id));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, rival_id);
        assert!(roster.invitations[&kept_id].is_pending());
        assert!(roster.invitations[&other_id].is_pending());
    }

    #[test]
    fn pending_request_slot_is_exclusive() {
        let roster = Roster::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(roster.claim_pending_request(7, first));
        assert!(!roster.claim_pending_request(7, second));

        // Releasing with the wrong id keeps the slot claimed.
        roster.release_pending_request(7, second);
        assert_eq!(roster.pending_request_of(7), Some(first));

        roster.release_pending_request(7, first);
        assert!(roster.claim_pending_request(7, second));
    }

    #[test]
    fn membership_index_tracks_sessions() {
        let roster = Roster::new();
        let team_a = Uuid::new_v4();
        let team_b = Uuid::new_v4();

        roster.record_membership(1, "s1", team_a);
        roster.record_membership(1, "s2", team_b);
        let mut memberships = roster.memberships_of(1);
        memberships.sort();
        assert_eq!(memberships.len(), 2);

        roster.clear_membership(1, "s1");
        assert_eq!(roster.memberships_of(1), vec![("s2".to_string(), team_b)]);
    }
}
