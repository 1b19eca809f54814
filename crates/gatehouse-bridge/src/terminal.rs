//! Typed operations against the terminal.
//!
//! Every method returns an [`OperationResult`]; nothing here fails past the
//! bridge boundary. Operations that change device state check connectivity
//! first so that an unreachable terminal costs one cached connectivity check instead of a
//! full script timeout.

use crate::cache::ConnectivityCache;
use crate::config::{BridgeConfig, DeviceConfig};
use crate::runner::ScriptRunner;
use gatehouse_core::{ConnectionStatus, OperationResult, TerminalOp, Uid};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use tracing::{info, warn};

/// User record sent to `create_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTerminalUser {
    pub uid: Uid,
    pub name: String,
    pub user_id: String,
    pub privilege: u8,
    pub password: Option<String>,
}

impl NewTerminalUser {
    pub fn new(uid: Uid, name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            user_id: user_id.into(),
            privilege: 0,
            password: None,
        }
    }

    pub fn privilege(mut self, privilege: u8) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn script_args(&self) -> Vec<String> {
        let mut args = vec![
            self.uid.to_string(),
            self.name.clone(),
            self.user_id.clone(),
            self.privilege.to_string(),
        ];
        if let Some(password) = &self.password {
            args.push(password.clone());
        }
        args
    }
}

/// Uid the terminal actually assigned versus the one requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreation {
    pub requested: Uid,
    pub actual: Uid,
    pub uid_changed: bool,
}

impl UserCreation {
    /// Read `user.uid` and `user.uid_changed` from script data.
    fn from_data(requested: Uid, data: Option<&Value>) -> Self {
        let user = data.and_then(|d| d.get("user"));
        let actual = user
            .and_then(|u| u.get("uid"))
            .and_then(Uid::from_json)
            .unwrap_or(requested);
        let flagged = user
            .and_then(|u| u.get("uid_changed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            requested,
            actual,
            uid_changed: flagged || actual != requested,
        }
    }

    fn as_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("requestedUid".into(), json!(self.requested.get()));
        fields.insert("actualUid".into(), json!(self.actual.get()));
        fields.insert("uidChanged".into(), json!(self.uid_changed));
        fields
    }
}

/// Result of `create_user`, with the uid outcome when the call succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUserOutcome {
    pub result: OperationResult,
    pub creation: Option<UserCreation>,
}

/// What `enroll_finger` does with the captured template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollMode {
    /// Start enrollment on the terminal's own sensor
    #[default]
    Register,
    /// Store a template that was already captured
    Save,
}

impl fmt::Display for EnrollMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnrollMode::Register => f.write_str("register"),
            EnrollMode::Save => f.write_str("save"),
        }
    }
}

const DEFAULT_FINGER_INDEX: u8 = 1;

/// Entry point to the terminal.
#[derive(Debug)]
pub struct TerminalBridge {
    runner: ScriptRunner,
    cache: ConnectivityCache,
}

impl TerminalBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let cache = ConnectivityCache::new(config.cache_window);
        Self {
            runner: ScriptRunner::new(config),
            cache,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        self.runner.config()
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Check the terminal, reusing a recent result unless `force` is set.
    pub async fn test_connection(&self, force: bool) -> OperationResult {
        if !force && let Some(cached) = self.cache.fresh() {
            return cached;
        }

        let result = self
            .runner
            .execute(TerminalOp::TestConnection.script_name(), &[])
            .await;
        if result.success {
            info!(ip = %self.config().device_ip, "terminal reachable");
        } else {
            warn!(ip = %self.config().device_ip, error = result.error_text(), "terminal unreachable");
        }
        self.cache.record(&result);
        result
    }

    async fn ensure_connected(&self) -> Result<(), OperationResult> {
        let check = self.test_connection(false).await;
        if check.success {
            Ok(())
        } else {
            Err(OperationResult::failure(format!(
                "Cannot connect to device: {}",
                check.error_text()
            )))
        }
    }

    async fn call(&self, op: TerminalOp, args: &[String]) -> OperationResult {
        if op.requires_connectivity()
            && let Err(failure) = self.ensure_connected().await
        {
            return failure;
        }
        self.runner.execute(op.script_name(), args).await
    }

    /// Create a user; the terminal may assign a different uid than requested.
    pub async fn create_user(&self, user: &NewTerminalUser) -> CreateUserOutcome {
        let result = self.call(TerminalOp::CreateUser, &user.script_args()).await;
        if !result.success {
            return CreateUserOutcome {
                result,
                creation: None,
            };
        }

        let creation = UserCreation::from_data(user.uid, result.data.as_ref());
        if creation.uid_changed {
            info!(
                requested = %creation.requested,
                actual = %creation.actual,
                "terminal assigned a different uid"
            );
        }

        CreateUserOutcome {
            result: result.merge_data(creation.as_fields()),
            creation: Some(creation),
        }
    }

    pub async fn delete_user(&self, uid: Uid) -> OperationResult {
        self.call(TerminalOp::DeleteUser, &[uid.to_string()]).await
    }

    pub async fn set_password(&self, uid: Uid, password: &str) -> OperationResult {
        self.call(TerminalOp::SetPassword, &[uid.to_string(), password.to_string()])
            .await
    }

    pub async fn enroll_fingerprint(
        &self,
        uid: Uid,
        finger_index: Option<u8>,
        mode: EnrollMode,
    ) -> OperationResult {
        let args = [
            uid.to_string(),
            finger_index.unwrap_or(DEFAULT_FINGER_INDEX).to_string(),
            mode.to_string(),
        ];
        self.call(TerminalOp::EnrollFingerprint, &args).await
    }

    pub async fn register_card(&self, uid: Uid, card: &str) -> OperationResult {
        self.call(TerminalOp::RegisterCard, &[uid.to_string(), card.to_string()])
            .await
    }

    pub async fn list_users(&self) -> OperationResult {
        self.call(TerminalOp::ListUsers, &[]).await
    }

    pub async fn clear_data(&self) -> OperationResult {
        self.call(TerminalOp::ClearData, &[]).await
    }

    pub async fn add_user(&self, uid: Uid, username: &str, password: Option<&str>) -> OperationResult {
        let args = [
            uid.to_string(),
            username.to_string(),
            password.unwrap_or_default().to_string(),
        ];
        self.call(TerminalOp::AddUser, &args).await
    }

    /// Data carries `last_uid`, `next_uid` and `user_count`.
    pub async fn next_free_uid(&self) -> OperationResult {
        self.call(TerminalOp::NextFreeUid, &[]).await
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.cache.status()
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.config().device_config()
    }
}
