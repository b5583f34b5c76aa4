/// Disconnect effects and reconnect recovery.
pub mod disconnect_service;
/// OpenAPI document assembly.
pub mod documentation;
/// Background TTL sweep for invitations and join requests.
pub mod expiry_sweeper;
/// Health reporting.
pub mod health_service;
/// Typed broadcast helpers for the event taxonomy.
pub mod hub_events;
/// Invitation state machine.
pub mod invitation_service;
/// Join-request state machine.
pub mod join_request_service;
/// Outbound notification seam for offline invitees.
pub mod notifier;
/// Readiness flags and the countdown controller.
pub mod readiness_service;
/// Team commands and queries.
pub mod team_service;
/// Per-user WebSocket lifecycle.
pub mod websocket_service;
