use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the team battle engine.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::teams::create_team,
        crate::routes::teams::list_teams,
        crate::routes::teams::list_available_teams,
        crate::routes::teams::rename_team,
        crate::routes::teams::leave_team,
        crate::routes::teams::set_ready,
        crate::routes::invitations::create_invitation,
        crate::routes::invitations::respond_invitation,
        crate::routes::invitations::list_invitations,
        crate::routes::join_requests::create_join_request,
        crate::routes::join_requests::respond_join_request,
        crate::routes::join_requests::cancel_join_request,
        crate::routes::join_requests::list_join_requests,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::team::TeamSummary,
            crate::dto::team::BattleSummary,
            crate::dto::invitation::InvitationSummary,
            crate::dto::join_request::JoinRequestSummary,
            crate::dto::events::TeamReadyStatusEvent,
            crate::dto::ws::ClientInboundMessage,
            crate::dto::ws::ClientAck,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "teams", description = "Team formation commands and queries"),
        (name = "invitations", description = "Opponent and teammate invitations"),
        (name = "join-requests", description = "Player-initiated join requests"),
        (name = "events", description = "WebSocket event stream"),
    )
)]
pub struct ApiDoc;
