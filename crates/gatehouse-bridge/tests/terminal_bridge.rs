//! Integration tests for the terminal bridge
//!
//! Each test builds a scratch scripts directory. Scripts append to a counter
//! file so tests can tell how many processes were spawned.
//!
//! Run with: cargo test --package gatehouse-bridge --test terminal_bridge

use gatehouse_bridge::{BridgeConfig, EnrollMode, NewTerminalUser, TerminalBridge};
use gatehouse_core::Uid;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONNECT_OK: &str = "echo '{\"success\":true,\"message\":\"Connected\"}'\n";
const CONNECT_FAIL: &str =
    "echo '{\"success\":false,\"error\":\"unreachable\"}' >&2\nexit 1\n";

struct Scripts {
    dir: TempDir,
}

impl Scripts {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn counter(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.count"))
    }

    /// Write `name.py` that records each run before executing `body`.
    fn add(&self, name: &str, body: &str) -> &Self {
        let script = format!("echo run >> '{}'\n{body}", self.counter(name).display());
        std::fs::write(self.dir.path().join(format!("{name}.py")), script).unwrap();
        self
    }

    fn runs(&self, name: &str) -> usize {
        std::fs::read_to_string(self.counter(name))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn bridge(&self) -> TerminalBridge {
        TerminalBridge::new(
            BridgeConfig::default()
                .scripts_dir(self.path())
                .interpreter("sh")
                .timeout_secs(2),
        )
    }
}

fn uid(v: u64) -> Uid {
    Uid::new(v).unwrap()
}

#[tokio::test]
async fn test_failed_connection_check_is_cached_until_forced() {
    let scripts = Scripts::new();
    scripts.add("test_connection", CONNECT_FAIL);
    let bridge = scripts.bridge();

    let first = bridge.test_connection(false).await;
    assert!(!first.success);
    assert_eq!(scripts.runs("test_connection"), 1);

    let second = bridge.test_connection(false).await;
    assert_eq!(second, first);
    assert_eq!(scripts.runs("test_connection"), 1);

    bridge.test_connection(true).await;
    assert_eq!(scripts.runs("test_connection"), 2);

    let status = bridge.connection_status();
    assert!(!status.connected);
    assert!(status.last_checked.is_some());
}

#[tokio::test]
async fn test_unreachable_device_fails_fast() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_FAIL)
        .add("create_user", "echo '{\"success\":true}'\n");
    let bridge = scripts.bridge();

    let outcome = bridge
        .create_user(&NewTerminalUser::new(uid(12), "Alice", "EMP12"))
        .await;

    assert!(!outcome.result.success);
    assert_eq!(
        outcome.result.error.as_deref(),
        Some("Cannot connect to device: unreachable")
    );
    assert!(outcome.creation.is_none());
    assert_eq!(scripts.runs("create_user"), 0);
}

#[tokio::test]
async fn test_dependent_operations_share_one_connection_check() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_OK)
        .add("delete_user", "echo '{\"success\":true}'\n")
        .add("register_card", "echo \"{\\\"card\\\":\\\"$6\\\"}\"\n");
    let bridge = scripts.bridge();

    assert!(bridge.delete_user(uid(3)).await.success);
    let card = bridge.register_card(uid(3), "0099").await;

    assert_eq!(card.data, Some(json!({"card": "0099"})));
    assert_eq!(scripts.runs("test_connection"), 1);
    assert!(bridge.connection_status().connected);
}

#[tokio::test]
async fn test_create_user_reports_assigned_uid() {
    let scripts = Scripts::new();
    scripts.add("test_connection", CONNECT_OK).add(
        "create_user",
        "echo 'connecting'\necho '{\"success\":true,\"user\":{\"uid\":13,\"uid_changed\":true}}'\n",
    );
    let bridge = scripts.bridge();

    let outcome = bridge
        .create_user(&NewTerminalUser::new(uid(12), "Alice", "EMP12"))
        .await;

    let creation = outcome.creation.unwrap();
    assert_eq!(creation.requested, uid(12));
    assert_eq!(creation.actual, uid(13));
    assert!(creation.uid_changed);
    assert_eq!(outcome.result.data_field("actualUid"), Some(&json!(13)));
    assert_eq!(outcome.result.data_field("uidChanged"), Some(&json!(true)));
}

#[tokio::test]
async fn test_set_password_skips_connection_check() {
    let scripts = Scripts::new();
    scripts.add("set_password", "echo \"{\\\"uid\\\":$5}\"\n");
    let bridge = scripts.bridge();

    let result = bridge.set_password(uid(4), "1234").await;

    assert!(result.success);
    assert_eq!(result.data, Some(json!({"uid": 4})));
    assert_eq!(scripts.runs("test_connection"), 0);
}

#[tokio::test]
async fn test_list_users_runs_get_users_without_connection_check() {
    let scripts = Scripts::new();
    scripts.add("test_connection", CONNECT_FAIL).add(
        "get_users",
        "echo 'INFO connecting'\necho '{\"users\":[{\"uid\":1,\"name\":\"Ana\"}],\"count\":1}'\n",
    );
    let bridge = scripts.bridge();

    let result = bridge.list_users().await;

    assert!(result.success);
    assert_eq!(result.data_field("count"), Some(&json!(1)));
    assert_eq!(scripts.runs("get_users"), 1);
    assert_eq!(scripts.runs("test_connection"), 0);
}

#[tokio::test]
async fn test_clear_data_runs_without_connection_check() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_FAIL)
        .add("clear_data", "echo \"cleared $1:$2\"\n");
    let bridge = scripts.bridge();

    let result = bridge.clear_data().await;

    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("cleared 192.168.1.201:4370"));
    assert_eq!(scripts.runs("clear_data"), 1);
    assert_eq!(scripts.runs("test_connection"), 0);
}

#[tokio::test]
async fn test_enroll_fingerprint_save_mode() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_OK)
        .add("enroll_finger", "echo \"$5 $6 $7\"\n");
    let bridge = scripts.bridge();

    let result = bridge
        .enroll_fingerprint(uid(7), Some(3), EnrollMode::Save)
        .await;
    assert_eq!(result.message.as_deref(), Some("7 3 save"));
}

#[tokio::test]
async fn test_enroll_fingerprint_default_arguments() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_OK)
        .add("enroll_finger", "echo \"$5 $6 $7\"\n");
    let bridge = scripts.bridge();

    let result = bridge
        .enroll_fingerprint(uid(7), None, EnrollMode::default())
        .await;
    assert_eq!(result.message.as_deref(), Some("7 1 register"));
}

#[tokio::test]
async fn test_add_user_without_password_passes_empty_argument() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_OK)
        .add("add_user", "echo \"[$5][$6][$7]\"\n");
    let bridge = scripts.bridge();

    let result = bridge.add_user(uid(2), "bob", None).await;
    assert_eq!(result.message.as_deref(), Some("[2][bob][]"));
}

#[tokio::test]
async fn test_next_free_uid() {
    let scripts = Scripts::new();
    scripts.add("test_connection", CONNECT_OK).add(
        "get_last_uid",
        "echo '{\"last_uid\":41,\"next_uid\":42,\"user_count\":40}'\n",
    );
    let bridge = scripts.bridge();

    let result = bridge.next_free_uid().await;
    assert_eq!(result.data_field("next_uid"), Some(&json!(42)));
}

#[tokio::test]
async fn test_diagnose_reports_every_failure() {
    let scripts = Scripts::new();
    let bridge = TerminalBridge::new(
        BridgeConfig::default()
            .scripts_dir(scripts.path())
            .interpreter("/nonexistent/interpreter"),
    );

    let report = bridge.diagnose().await;

    assert!(!report.success);
    assert_eq!(report.message, "Some diagnostics failed");
    assert!(!report.python_available);
    assert!(!report.scripts_exist);
    assert!(!report.device_reachable);
    assert_eq!(report.errors.len(), 3);
    assert_eq!(
        report.details.missing_scripts,
        ["test_connection.py", "create_user.py", "delete_user.py"]
    );
}

#[tokio::test]
async fn test_diagnose_with_scripts_in_place() {
    let scripts = Scripts::new();
    scripts
        .add("test_connection", CONNECT_OK)
        .add("create_user", "exit 0\n")
        .add("delete_user", "exit 0\n");
    let bridge = scripts.bridge();

    let report = bridge.diagnose().await;

    assert!(report.scripts_exist);
    assert!(report.device_reachable);
    assert!(report.details.missing_scripts.is_empty());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["details"]["devicePort"], json!(4370));
    assert!(json.get("pythonAvailable").is_some());
}

#[tokio::test]
async fn test_device_config_never_exposes_password() {
    let bridge = TerminalBridge::new(BridgeConfig::default().device_password("s3cret"));

    let json = serde_json::to_string(&bridge.device_config()).unwrap();
    assert!(!json.contains("s3cret"));
    assert!(json.contains("\"port\":4370"));
}
