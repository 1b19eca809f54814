use crate::error::operation;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use gatehouse_bridge::{DeviceConfig, DiagnosticsReport, NewTerminalUser};
use gatehouse_core::{ConnectionStatus, OperationResult, Uid};
use gatehouse_correlator::MessageBus;
use gatehouse_storage::UserRepository;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct TerminalStatus {
    pub connection: ConnectionStatus,
    pub device: DeviceConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestConnectionQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalUser {
    pub uid: Uid,
    pub name: String,
    pub user_id: String,
    pub privilege: Option<u8>,
    pub password: Option<String>,
}

pub async fn diagnose<B: MessageBus>(State(state): State<AppState<B>>) -> Json<DiagnosticsReport> {
    Json(state.bridge.diagnose().await)
}

pub async fn status<B: MessageBus>(State(state): State<AppState<B>>) -> Json<TerminalStatus> {
    Json(TerminalStatus {
        connection: state.bridge.connection_status(),
        device: state.bridge.device_config(),
    })
}

pub async fn test_connection<B: MessageBus>(
    State(state): State<AppState<B>>,
    Query(query): Query<TestConnectionQuery>,
) -> Json<OperationResult> {
    Json(state.bridge.test_connection(query.force).await)
}

/// Create the user on the terminal.
///
/// When `userId` names a stored user, the uid the terminal actually assigned
/// is recorded on it.
pub async fn create_user<B: MessageBus>(
    State(state): State<AppState<B>>,
    Json(request): Json<CreateTerminalUser>,
) -> Response {
    let user_id = request.user_id.clone();
    let mut user = NewTerminalUser::new(request.uid, request.name, request.user_id);
    if let Some(privilege) = request.privilege {
        user = user.privilege(privilege);
    }
    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        user = user.password(password);
    }

    let outcome = state.bridge.create_user(&user).await;
    if let Some(creation) = &outcome.creation {
        info!(requested = %creation.requested, actual = %creation.actual, "Terminal user created");
        match state.users.set_zkteco_uid(&user_id, Some(creation.actual)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(%user_id, error = %e, "Failed to record terminal uid"),
        }
    }
    operation(outcome.result, StatusCode::BAD_GATEWAY)
}

/// Every user stored on the terminal.
pub async fn list_users<B: MessageBus>(State(state): State<AppState<B>>) -> Response {
    operation(state.bridge.list_users().await, StatusCode::BAD_GATEWAY)
}

/// Wipe users and templates from the terminal.
pub async fn clear_data<B: MessageBus>(State(state): State<AppState<B>>) -> Response {
    warn!("Clearing all terminal data");
    operation(state.bridge.clear_data().await, StatusCode::BAD_GATEWAY)
}

pub async fn next_uid<B: MessageBus>(State(state): State<AppState<B>>) -> Response {
    operation(state.bridge.next_free_uid().await, StatusCode::BAD_GATEWAY)
}
