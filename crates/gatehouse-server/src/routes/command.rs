//! Bus commands and the live status feed.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream, StreamExt};
use gatehouse_core::OperationResult;
use gatehouse_correlator::{CorrelatorError, MessageBus, StatusEvent};
use gatehouse_protocol::Command;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, Interval};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<String>,
    /// Milliseconds to wait for the device answer
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub action: Option<String>,
}

/// Issue a command to both devices and wait for the first terminal answer.
pub async fn issue<B: MessageBus>(
    State(state): State<AppState<B>>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let text = request
        .command
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Command is required".to_string()))?;
    let command: Command = text
        .trim()
        .parse()
        .map_err(|e: gatehouse_core::Error| ApiError::BadRequest(e.to_string()))?;

    let timeout = request.timeout.map(Duration::from_millis);
    let response = match state.correlator.dispatch(command, timeout).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => {
            let status = match e {
                CorrelatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                CorrelatorError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
                CorrelatorError::Superseded { .. } => StatusCode::CONFLICT,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(OperationResult::from(e)))
        }
    };
    Ok(response.into_response())
}

/// `?action=status` returns the feed snapshot; anything else opens the SSE
/// feed.
pub async fn feed<B: MessageBus>(
    State(state): State<AppState<B>>,
    Query(query): Query<FeedQuery>,
) -> Response {
    let feed = state.correlator.feed();
    if query.action.as_deref() == Some("status") {
        return Json(feed.snapshot()).into_response();
    }

    debug!("Status feed subscriber connected");
    let events = feed_events(feed.connection_event(), feed.subscribe(), state.feed_ping);
    Sse::new(events.map(|event| Event::default().json_data(&event))).into_response()
}

/// Connection event first, then every broadcast event interleaved with pings.
pub fn feed_events(
    initial: StatusEvent,
    rx: broadcast::Receiver<StatusEvent>,
    ping_every: Duration,
) -> impl Stream<Item = StatusEvent> + Send {
    let ping = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    let live = stream::unfold((rx, ping), next_event);
    stream::once(async move { initial }).chain(live)
}

async fn next_event(
    (mut rx, mut ping): (broadcast::Receiver<StatusEvent>, Interval),
) -> Option<(StatusEvent, (broadcast::Receiver<StatusEvent>, Interval))> {
    loop {
        let event = tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status feed subscriber lagging");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            },
            _ = ping.tick() => StatusEvent::ping(),
        };
        return Some((event, (rx, ping)));
    }
}
