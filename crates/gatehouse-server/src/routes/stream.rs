//! Camera routes: the MJPEG relay and single-frame capture.

use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::stream;
use gatehouse_core::OperationResult;
use gatehouse_core::constants::MULTIPART_CONTENT_TYPE;
use gatehouse_correlator::MessageBus;
use gatehouse_relay::RelayError;
use tracing::{error, info};

fn relay_error(err: RelayError) -> Response {
    let status = match &err {
        RelayError::CameraNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::SnapshotTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if !err.is_configuration() {
        error!(error = %err, "Camera request failed");
    }
    (status, Json(OperationResult::from_error(&err))).into_response()
}

/// Continuous `multipart/x-mixed-replace` stream. The transcoder stops when
/// the client disconnects and the body is dropped.
pub async fn mjpeg<B: MessageBus>(State(state): State<AppState<B>>) -> Response {
    let sections = match state.relay.start() {
        Ok(rx) => rx,
        Err(e) => return relay_error(e),
    };
    info!("MJPEG client connected");

    let body = Body::from_stream(stream::unfold(sections, |mut rx| async move {
        rx.recv().await.map(|section| (section, rx))
    }));

    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

pub async fn capture_frame<B: MessageBus>(State(state): State<AppState<B>>) -> Response {
    match state.relay.capture_frame().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => relay_error(e),
    }
}
