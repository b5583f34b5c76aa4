use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{dto::events::ServerEvent, state::roster::UserId};

/// Handle used to push events to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Identity the connection authenticated as.
    pub user_id: UserId,
    /// Writer channel feeding the client's WebSocket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Fan-out hub delivering state deltas to every interested connection.
///
/// Both registries are concurrent maps guarded independently of roster
/// state: subscription churn is unrelated to roster mutation rate.
pub struct SessionHub {
    connections: DashMap<UserId, ClientConnection>,
    subscriptions: DashMap<String, HashSet<UserId>>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    /// Build an empty hub.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Register a connection, returning the one it replaced if the user
    /// already had a live socket.
    pub fn register(&self, connection: ClientConnection) -> Option<ClientConnection> {
        self.connections
            .insert(connection.user_id, connection)
    }

    /// Drop the user's connection, but only when `tx` is still the
    /// registered writer. A newer socket that replaced this one stays.
    pub fn unregister(&self, user_id: UserId, tx: &mpsc::UnboundedSender<Message>) {
        self.connections
            .remove_if(&user_id, |_, conn| conn.tx.same_channel(tx));
    }

    /// Whether the user currently has a live connection.
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Subscribe the user to a session's broadcast audience.
    pub fn subscribe(&self, session_id: &str, user_id: UserId) {
        self.subscriptions
            .entry(session_id.to_string())
            .or_default()
            .insert(user_id);
    }

    /// Remove the user from a session's broadcast audience.
    pub fn unsubscribe(&self, session_id: &str, user_id: UserId) {
        if let Some(mut subscribers) = self.subscriptions.get_mut(session_id) {
            subscribers.remove(&user_id);
        }
        self.subscriptions
            .remove_if(session_id, |_, subscribers| subscribers.is_empty());
    }

    /// Deliver an event to every subscriber of the session.
    pub fn broadcast_session(&self, session_id: &str, event: &ServerEvent) {
        let Some(text) = encode(event) else { return };
        let subscribers: Vec<UserId> = match self.subscriptions.get(session_id) {
            Some(entry) => entry.iter().copied().collect(),
            None => return,
        };

        for user_id in subscribers {
            self.push(user_id, &text);
        }
    }

    /// Deliver an event to one user's connection, if connected.
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) {
        if let Some(text) = encode(event) {
            self.push(user_id, &text);
        }
    }

    /// Deliver an event to a set of users, deduplicating recipients.
    pub fn send_to_users(&self, users: impl IntoIterator<Item = UserId>, event: &ServerEvent) {
        let Some(text) = encode(event) else { return };
        let recipients: HashSet<UserId> = users.into_iter().collect();
        for user_id in recipients {
            self.push(user_id, &text);
        }
    }

    /// Push pre-encoded text onto the user's writer channel, ignoring
    /// delivery errors; a closed writer is cleaned up by the socket task.
    fn push(&self, user_id: UserId, text: &str) {
        if let Some(connection) = self.connections.get(&user_id) {
            let _ = connection.tx.send(Message::Text(text.to_string().into()));
        }
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(event = %event.event, error = %err, "failed to serialize hub event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connect(hub: &SessionHub, user_id: UserId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register(ClientConnection { user_id, tx });
        rx
    }

    fn event() -> ServerEvent {
        ServerEvent::json("team_updated", &json!({"team": "alpha"})).unwrap()
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(text.to_string());
        }
        out
    }

    #[test]
    fn session_broadcast_reaches_only_subscribers() {
        let hub = SessionHub::new();
        let mut alice = connect(&hub, 1);
        let mut bob = connect(&hub, 2);
        let mut carol = connect(&hub, 3);

        hub.subscribe("s1", 1);
        hub.subscribe("s1", 2);
        hub.subscribe("s2", 3);

        hub.broadcast_session("s1", &event());

        assert_eq!(received(&mut alice).len(), 1);
        assert_eq!(received(&mut bob).len(), 1);
        assert!(received(&mut carol).is_empty());
    }

    #[test]
    fn user_directed_send_skips_everyone_else() {
        let hub = SessionHub::new();
        let mut alice = connect(&hub, 1);
        let mut bob = connect(&hub, 2);

        hub.send_to_user(2, &event());

        assert!(received(&mut alice).is_empty());
        let frames = received(&mut bob);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("team_updated"));
    }

    #[test]
    fn send_to_users_deduplicates_recipients() {
        let hub = SessionHub::new();
        let mut alice = connect(&hub, 1);

        hub.send_to_users([1, 1, 1], &event());

        assert_eq!(received(&mut alice).len(), 1);
    }

    #[test]
    fn replaced_connection_keeps_newer_socket() {
        let hub = SessionHub::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let replaced = hub.register(ClientConnection { user_id: 1, tx: old_tx.clone() });
        assert!(replaced.is_none());

        let mut fresh_rx = connect(&hub, 1);

        // Unregistering with the stale writer must not evict the fresh one.
        hub.unregister(1, &old_tx);
        hub.send_to_user(1, &event());

        assert!(received(&mut old_rx).is_empty());
        assert_eq!(received(&mut fresh_rx).len(), 1);
    }

    #[test]
    fn unsubscribe_stops_session_delivery() {
        let hub = SessionHub::new();
        let mut alice = connect(&hub, 1);
        hub.subscribe("s1", 1);
        hub.unsubscribe("s1", 1);

        hub.broadcast_session("s1", &event());
        assert!(received(&mut alice).is_empty());
    }
}
