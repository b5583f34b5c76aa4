//! Per-user WebSocket lifecycle: identification, subscription, heartbeat
//! supervision, and the leaving signal feeding the disconnect handler.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{info, warn};

use crate::{
    dto::{
        validation::validate_session_id,
        ws::{ClientAck, ClientInboundMessage},
    },
    services::disconnect_service,
    state::{SharedState, hub::ClientConnection, roster::UserId},
};

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps hub events flowing even while we await
    // inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match timeout(state.config().ident_timeout(), receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error before identification");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let user_id = match ClientInboundMessage::from_json_str(&initial_message) {
        Ok(ClientInboundMessage::Identify { user_id, username }) => {
            state.hub().register(ClientConnection {
                user_id,
                tx: outbound_tx.clone(),
            });
            send_to_socket(
                &outbound_tx,
                &ClientAck {
                    user_id,
                    status: "identified".into(),
                },
            );
            info!(user_id, username = %username, "client connected");
            user_id
        }
        Ok(_) => {
            warn!("first websocket message was not an identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Restore any roster state the user still holds; a client that lost its
    // local state resumes from these events alone.
    disconnect_service::handle_reconnect(&state, user_id).await;

    let explicit_leave = read_loop(&state, user_id, &mut receiver, &outbound_tx).await;

    state.hub().unregister(user_id, &outbound_tx);
    if explicit_leave {
        disconnect_service::handle_leaving(&state, user_id).await;
    }
    info!(user_id, leaving = explicit_leave, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Drain inbound frames until the connection ends.
///
/// Returns `true` when the roster must be repaired: the client sent the
/// explicit leaving signal, or the heartbeat window elapsed with no frame.
/// A plain close keeps the roster intact for a later reconnect.
async fn read_loop(
    state: &SharedState,
    user_id: UserId,
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> bool {
    loop {
        let frame = match timeout(state.config().heartbeat_timeout(), receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                warn!(user_id, "heartbeat timed out; treating connection as gone");
                return true;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => match ClientInboundMessage::from_json_str(&text) {
                Ok(ClientInboundMessage::Identify { .. }) => {
                    warn!(user_id, "ignoring duplicate identification message");
                }
                Ok(ClientInboundMessage::Subscribe { session_id }) => {
                    match validate_session_id(&session_id) {
                        Ok(()) => state.hub().subscribe(&session_id, user_id),
                        Err(err) => {
                            warn!(user_id, error = %err, "rejected malformed session subscription")
                        }
                    }
                }
                Ok(ClientInboundMessage::Leaving) => {
                    let _ = outbound_tx.send(Message::Close(None));
                    return true;
                }
                Ok(ClientInboundMessage::Heartbeat) | Ok(ClientInboundMessage::Unknown) => {}
                Err(err) => {
                    warn!(user_id, error = %err, "failed to parse client message");
                }
            },
            Some(Ok(Message::Ping(payload))) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Some(Ok(Message::Close(frame))) => {
                let _ = outbound_tx.send(Message::Close(frame));
                return false;
            }
            Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Err(err)) => {
                warn!(user_id, error = %err, "websocket error");
                return false;
            }
            None => return false,
        }
    }
}

/// Serialize a payload and push it onto the connection's writer channel.
fn send_to_socket<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + Serialize,
{
    match serde_json::to_string(value) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize websocket payload"),
    }
}

/// Ensure the writer task winds down before the socket handler returns.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
