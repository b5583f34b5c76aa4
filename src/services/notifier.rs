//! Outbound notification seam for invitees without a live connection.

use tracing::info;

use crate::state::roster::TeamInvitation;

/// Narrow interface to the product's outbound notification channel (email).
///
/// Invoked fire-and-forget: implementations must never block the roster
/// mutation path, and failures have no effect on roster state.
pub trait InviteNotifier: Send + Sync {
    /// Called when an invitation is issued to a player with no live socket.
    fn invitation_issued(&self, invitation: &TeamInvitation, team_name: &str);
}

/// Default notifier that only records the outbound intent in the logs.
pub struct LogNotifier;

impl InviteNotifier for LogNotifier {
    fn invitation_issued(&self, invitation: &TeamInvitation, team_name: &str) {
        info!(
            invitation_id = %invitation.id,
            invitee_id = invitation.invitee_id,
            team_name,
            kind = ?invitation.kind,
            "invitee not connected; handing invitation to the notification channel"
        );
    }
}
