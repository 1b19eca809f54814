//! HTTP facade over the gateway components.
//!
//! ```text
//! /api/terminal/*   ──> TerminalBridge (subprocess RPC)
//! /api/mqtt/command ──> Correlator (bus commands, SSE status feed)
//! /api/mjpeg        ──> StreamRelay (one transcoder per client)
//! /api/users/*      ──> storage + fan-out to every subsystem
//! ```

pub mod command;
pub mod stream;
pub mod terminal;
pub mod users;

use crate::state::AppState;
use axum::Json;
use axum::Router;
use axum::routing::{delete, get, post};
use gatehouse_correlator::MessageBus;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub fn router<B: MessageBus>(state: AppState<B>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/terminal/diagnose", get(terminal::diagnose::<B>))
        .route("/api/terminal/status", get(terminal::status::<B>))
        .route("/api/terminal/test-connection", post(terminal::test_connection::<B>))
        .route(
            "/api/terminal/users",
            get(terminal::list_users::<B>).post(terminal::create_user::<B>),
        )
        .route("/api/terminal/clear-data", post(terminal::clear_data::<B>))
        .route("/api/terminal/next-uid", get(terminal::next_uid::<B>))
        .route(
            "/api/mqtt/command",
            get(command::feed::<B>).post(command::issue::<B>),
        )
        .route("/api/mjpeg", get(stream::mjpeg::<B>))
        .route(
            "/api/capture-frame",
            get(stream::capture_frame::<B>).post(stream::capture_frame::<B>),
        )
        .route(
            "/api/users/update-registration",
            post(users::update_registration::<B>),
        )
        .route(
            "/api/users/:id/register-biometric",
            post(users::register_biometric::<B>),
        )
        .route("/api/users/:id", delete(users::delete_user::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
