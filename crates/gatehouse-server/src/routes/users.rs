//! User credential routes backed by storage and the device components.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatehouse_bridge::EnrollMode;
use gatehouse_core::constants::STATUS_UID_NOT_FOUND;
use gatehouse_core::{
    BusVerb, DeviceOperation, OperationResult, RegistrationKind, RegistrationUpdate, ServiceOp,
    Uid, Verb,
};
use gatehouse_correlator::MessageBus;
use gatehouse_protocol::Command;
use gatehouse_storage::{User, UserRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{debug, info, warn};

/// Credential handled by `register-biometric`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricKind {
    Card,
    Fingerprint,
    Password,
    Face,
}

impl fmt::Display for BiometricKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BiometricKind::Card => "card",
            BiometricKind::Fingerprint => "fingerprint",
            BiometricKind::Password => "password",
            BiometricKind::Face => "face",
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBiometric {
    #[serde(rename = "type")]
    pub kind: BiometricKind,
    pub card_number: Option<String>,
    pub finger_id: Option<u8>,
    /// Fingerprint enrollment mode, `register` unless given
    #[serde(default)]
    pub mode: Option<EnrollMode>,
    pub password: Option<String>,
}

/// Outcome of one subsystem during user deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub success: bool,
    pub error: Option<String>,
}

/// How one deletion step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Nothing to remove for this subsystem.
    Skipped,
    Done,
    /// The device no longer knows the user.
    AlreadyGone,
    Failed(String),
}

impl Step {
    fn from_service<E: fmt::Display>(outcome: Result<(), E>) -> Self {
        match outcome {
            Ok(()) => Step::Done,
            Err(e) => Step::Failed(e.to_string()),
        }
    }

    fn from_bus(result: &OperationResult) -> Self {
        if result.success {
            Step::Done
        } else if result
            .error
            .as_deref()
            .is_some_and(|e| e.trim().eq_ignore_ascii_case(STATUS_UID_NOT_FOUND))
        {
            Step::AlreadyGone
        } else {
            Step::Failed(result.error_text().to_string())
        }
    }

    fn result(&self) -> StepResult {
        match self {
            Step::Failed(error) => StepResult {
                success: false,
                error: Some(error.clone()),
            },
            _ => StepResult {
                success: true,
                error: None,
            },
        }
    }

    fn detail(&self, done: &str, skipped: &str, prefix: &str) -> String {
        match self {
            Step::Skipped => skipped.to_string(),
            Step::Done => done.to_string(),
            Step::AlreadyGone => {
                "User not found on ZKTeco device, may have been already deleted".to_string()
            }
            Step::Failed(error) => format!("{prefix}: {error}"),
        }
    }
}

/// Subsystem removals for `user`, in the order they run.
///
/// Local deletion is not part of the plan; it always runs last.
pub fn deletion_plan(user: &User) -> Vec<DeviceOperation> {
    let mut plan = Vec::new();
    if let Some(face_id) = user.face_api_id.as_deref().filter(|f| !f.is_empty()) {
        plan.push(DeviceOperation::new(Verb::Service(ServiceOp::DeleteFace)).parameter(face_id));
    }
    if user.palm_registered {
        plan.push(
            DeviceOperation::new(Verb::Service(ServiceOp::DeletePalm)).parameter(user.id.as_str()),
        );
    }
    if let Some(uid) = user.terminal_uid() {
        plan.push(DeviceOperation::new(Verb::Bus(BusVerb::DeleteUser)).target(uid));
    }
    plan
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionResults {
    pub face_api: StepResult,
    pub palm: StepResult,
    pub zkteco_mqtt: StepResult,
    pub local: StepResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionDetails {
    pub face_api: String,
    pub palm: String,
    pub zkteco_mqtt: String,
    pub local: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub success: bool,
    pub message: String,
    pub results: DeletionResults,
    pub details: DeletionDetails,
}

fn require_terminal_uid(user: &User) -> ApiResult<Uid> {
    user.terminal_uid().ok_or_else(|| {
        ApiError::BadRequest(
            "User not registered in ZKTeco device. Please recreate the user.".to_string(),
        )
    })
}

async fn require_user<B: MessageBus>(state: &AppState<B>, id: &str) -> ApiResult<User> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Persist a registration change reported for a terminal uid.
pub async fn update_registration<B: MessageBus>(
    State(state): State<AppState<B>>,
    body: Result<Json<RegistrationUpdate>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(update) = body.map_err(|_| {
        ApiError::BadRequest("Missing required fields: uid, type, registered".to_string())
    })?;

    let user = match state.users.apply_registration(&update).await {
        Ok(user) => user,
        Err(e) if e.is_not_found() => {
            return Err(ApiError::NotFound(format!(
                "User not found with ZKTeco UID: {}",
                update.uid
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let kind = serde_json::to_value(update.kind).unwrap_or_default();
    Ok(Json(json!({
        "success": true,
        "message": format!("{} registration updated successfully", kind.as_str().unwrap_or_default()),
        "data": {
            "userId": user.id,
            "userName": user.name,
            "type": kind,
            "registered": update.registered,
            "cardNumber": update.card_number,
        }
    })))
}

/// Register a credential on the terminal and record it locally.
///
/// Face registration is local only; every other kind needs the user's
/// terminal uid.
pub async fn register_biometric<B: MessageBus>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
    body: Result<Json<RegisterBiometric>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(|_| {
        ApiError::BadRequest(
            "Invalid biometric type. Must be 'card', 'fingerprint', 'password', or 'face'"
                .to_string(),
        )
    })?;
    let user = require_user(&state, &id).await?;
    info!(user_id = %user.id, kind = %request.kind, "Starting registration");

    let (result, stored) = match request.kind {
        BiometricKind::Card => {
            let uid = require_terminal_uid(&user)?;
            let card = request
                .card_number
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ApiError::BadRequest("Card number is required".to_string()))?;
            let result = state.bridge.register_card(uid, &card).await;
            (result, Some((RegistrationKind::Card, Some(card))))
        }
        BiometricKind::Fingerprint => {
            let uid = require_terminal_uid(&user)?;
            let result = state
                .bridge
                .enroll_fingerprint(uid, request.finger_id, request.mode.unwrap_or_default())
                .await;
            (result, Some((RegistrationKind::Fingerprint, None)))
        }
        BiometricKind::Password => {
            let uid = require_terminal_uid(&user)?;
            let password = request
                .password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ApiError::BadRequest("Password is required".to_string()))?;
            (state.bridge.set_password(uid, &password).await, None)
        }
        BiometricKind::Face => {
            let updated = state
                .users
                .set_registration(&user.id, RegistrationKind::Face, true, None)
                .await?;
            return Ok(Json(json!({
                "success": true,
                "message": "Face registration completed successfully",
                "data": updated,
            }))
            .into_response());
        }
    };

    if !result.success {
        warn!(user_id = %user.id, kind = %request.kind, error = result.error_text(), "Terminal registration failed");
        return Ok((StatusCode::BAD_GATEWAY, Json(result)).into_response());
    }

    let updated = match stored {
        Some((kind, card)) => {
            state
                .users
                .set_registration(&user.id, kind, true, card.as_deref())
                .await?
        }
        None => user,
    };

    Ok(Json(json!({
        "success": true,
        "message": format!("{} registration completed successfully", request.kind),
        "data": updated,
        "device": result,
    }))
    .into_response())
}

/// Remove a user from every subsystem, then locally.
///
/// Subsystem failures are reported, never rolled back; only a failed local
/// delete fails the request.
pub async fn delete_user<B: MessageBus>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let user = require_user(&state, &id).await?;

    let (mut face_api, mut palm, mut zkteco_mqtt) = (Step::Skipped, Step::Skipped, Step::Skipped);
    for op in deletion_plan(&user) {
        debug!(user_id = %user.id, verb = ?op.verb, transport = ?op.transport(), "Deletion step");
        let parameter = op.parameters.first().map(String::as_str).unwrap_or_default();
        match (op.verb, op.target) {
            (Verb::Service(ServiceOp::DeleteFace), _) => {
                face_api = Step::from_service(state.services.delete_face(parameter).await);
            }
            (Verb::Service(ServiceOp::DeletePalm), _) => {
                palm = Step::from_service(state.services.delete_palm(parameter).await);
            }
            (Verb::Bus(BusVerb::DeleteUser), Some(uid)) => {
                let result = state.correlator.send(Command::delete_user(uid), None).await;
                zkteco_mqtt = Step::from_bus(&result);
            }
            (verb, _) => warn!(?verb, "Skipping unsupported deletion step"),
        }
    }

    let local = match state.users.delete(&user.id).await {
        Ok(()) => Step::Done,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Local delete failed");
            Step::Failed("Failed to delete from local database".to_string())
        }
    };

    let details = DeletionDetails {
        face_api: face_api.detail(
            "Deleted from Face API",
            "No Face API ID to delete",
            "Face API error",
        ),
        palm: palm.detail("Deleted palm data", "No palm data to delete", "Palm error"),
        zkteco_mqtt: zkteco_mqtt.detail(
            "MQTT delete command sent to ZKTeco device",
            "No ZKTeco UID to delete",
            "ZKTeco MQTT error",
        ),
        local: local.detail(
            "Deleted from local database",
            "Deleted from local database",
            "Local error",
        ),
    };
    let results = DeletionResults {
        face_api: face_api.result(),
        palm: palm.result(),
        zkteco_mqtt: zkteco_mqtt.result(),
        local: local.result(),
    };

    let success = results.local.success;
    info!(
        user_id = %user.id,
        face_api = results.face_api.success,
        palm = results.palm.success,
        terminal = results.zkteco_mqtt.success,
        local = success,
        "User deletion finished"
    );

    let report = DeletionReport {
        success,
        message: if success {
            "User and all biometric data deletion completed".to_string()
        } else {
            "Failed to delete user from local database".to_string()
        },
        results,
        details,
    };

    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(report)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::Transport;

    fn user(zkteco_uid: Option<i64>, palm_registered: bool) -> User {
        let now = chrono::Utc::now();
        User {
            id: "u-1".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            department: None,
            status: "active".to_string(),
            card_registered: false,
            fingerprint_registered: false,
            palm_registered,
            face_registered: false,
            card_number: None,
            face_api_id: Some(String::new()),
            zkteco_uid,
            created_at: now,
            updated_at: now,
            last_seen: None,
        }
    }

    #[test]
    fn test_step_details() {
        assert_eq!(
            Step::Done.detail("Deleted from Face API", "No Face API ID to delete", "Face API error"),
            "Deleted from Face API"
        );
        assert_eq!(
            Step::Skipped.detail("Deleted from Face API", "No Face API ID to delete", "Face API error"),
            "No Face API ID to delete"
        );
        assert_eq!(
            Step::Failed("HTTP error! status: 500".to_string()).detail("a", "b", "Face API error"),
            "Face API error: HTTP error! status: 500"
        );
        assert!(Step::Skipped.result().success);
        assert!(!Step::Failed("x".to_string()).result().success);
    }

    #[test]
    fn test_uid_not_found_counts_as_deleted() {
        let step = Step::from_bus(&OperationResult::failure("uid not found"));
        assert_eq!(step, Step::AlreadyGone);
        assert_eq!(step.result(), StepResult { success: true, error: None });
        assert!(step.detail("a", "b", "c").contains("may have been already deleted"));

        let step = Step::from_bus(&OperationResult::failure("Operation timeout"));
        assert_eq!(step, Step::Failed("Operation timeout".to_string()));
    }

    #[test]
    fn test_deletion_plan_routes_by_transport() {
        let plan = deletion_plan(&user(Some(12), true));

        let transports: Vec<Transport> = plan.iter().map(DeviceOperation::transport).collect();
        assert_eq!(transports, [Transport::Rest, Transport::Correlator]);
        assert_eq!(plan[0].verb, Verb::Service(ServiceOp::DeletePalm));
        assert_eq!(plan[0].parameters, ["u-1"]);
        assert_eq!(plan[1].verb, Verb::Bus(BusVerb::DeleteUser));
        assert_eq!(plan[1].target, Some(Uid::new(12).unwrap()));
    }

    #[test]
    fn test_deletion_plan_for_local_only_user() {
        assert!(deletion_plan(&user(None, false)).is_empty());
    }

    #[test]
    fn test_biometric_kind_parsing() {
        let request: RegisterBiometric =
            serde_json::from_value(json!({"type": "card", "cardNumber": "0012"})).unwrap();
        assert_eq!(request.kind, BiometricKind::Card);
        assert_eq!(request.card_number.as_deref(), Some("0012"));
        assert_eq!(request.mode, None);

        let request: RegisterBiometric =
            serde_json::from_value(json!({"type": "fingerprint", "fingerId": 2, "mode": "save"}))
                .unwrap();
        assert_eq!(request.mode, Some(EnrollMode::Save));
        assert!(serde_json::from_value::<RegisterBiometric>(json!({"type": "iris"})).is_err());
    }
}
