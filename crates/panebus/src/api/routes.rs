//! API route definitions.

use axum::http::{Method, header};
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers::{agents, context, events, messages, misc, rules, tasks};
use super::state::AppState;

/// Create the application router.
///
/// Everything is loopback-only and unauthenticated; CORS is permissive so a
/// dashboard served from any local origin can talk to the daemon.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        // Events
        .route("/api/events", post(events::post_event).get(events::list_events))
        .route("/api/events/stream", get(events::stream))
        .route("/api/heartbeat", post(agents::heartbeat))
        // Sessions and pane control
        .route("/api/agents", get(agents::list_agents))
        .route("/api/agents/spawn", post(agents::spawn_agent))
        .route("/api/agents/{id}", get(agents::get_agent))
        .route("/api/agents/{id}/events", get(agents::agent_events))
        .route("/api/agents/{id}/children", get(agents::agent_children))
        .route("/api/agents/{id}/stop", post(agents::stop_agent))
        .route("/api/agents/{id}/approve", post(agents::approve_agent))
        .route("/api/agents/{id}/reject", post(agents::reject_agent))
        .route("/api/agents/{id}/interrupt", post(agents::interrupt_agent))
        .route("/api/agents/{id}/send", post(agents::send_to_agent))
        // Mesh messages
        .route(
            "/api/messages",
            post(messages::post_message).get(messages::list_messages),
        )
        .route("/api/messages/{id}", get(messages::get_message))
        .route("/api/messages/{id}/approve", post(messages::approve_message))
        .route("/api/messages/{id}/reject", post(messages::reject_message))
        // Coordination rules
        .route("/api/rules", post(rules::post_rule).get(rules::list_rules))
        .route("/api/rules/{id}", delete(rules::delete_rule))
        // Task DAG
        .route("/api/tasks", post(tasks::post_task).get(tasks::list_tasks))
        .route("/api/tasks/next", get(tasks::next_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        // Shared context and preferences
        .route(
            "/api/context",
            post(context::set_context).get(context::list_context),
        )
        .route("/api/context/{key}", delete(context::delete_context))
        .route(
            "/api/preferences",
            post(context::set_preference).get(context::list_preferences),
        )
        .route("/api/preferences/{key}", delete(context::delete_preference))
        // Health and dashboard
        .route("/api/health", get(misc::health))
        .route("/", get(misc::dashboard))
        .route("/ui", get(misc::dashboard))
        .route("/dashboard", get(misc::dashboard))
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
