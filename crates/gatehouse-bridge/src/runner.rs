//! Script execution and result interpretation.
//!
//! A script talks to the gateway through its exit code and the last line it
//! prints. Anything before that line is diagnostic noise and only logged.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use gatehouse_core::OperationResult;
use gatehouse_core::constants::{RESULT_SENTINEL, SCRIPT_EXTENSION};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Captured output of a finished script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Exit code; `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs vendor scripts with the device parameters prepended.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: BridgeConfig,
}

impl ScriptRunner {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run `script` to completion and capture its output.
    ///
    /// # Errors
    /// Fails without spawning when the script file is missing. Fails after
    /// killing the process when the wall-clock limit expires.
    pub async fn run(&self, script: &str, args: &[String]) -> BridgeResult<ScriptOutput> {
        let path = self.config.script_path(script);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(BridgeError::ScriptNotFound {
                script: format!("{script}.{SCRIPT_EXTENSION}"),
                dir: self.config.scripts_dir.clone(),
            });
        }

        debug!(script, ?args, "running terminal script");

        let child = Command::new(&self.config.interpreter)
            .arg(&path)
            .args(self.config.device_args())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(script, error = %e, "failed to spawn interpreter");
                BridgeError::Spawn(e)
            })?;

        let limit = self.config.wall_clock_timeout();
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let output = ScriptOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(
                    script,
                    exit_code = ?output.exit_code,
                    stdout = %output.stdout.trim(),
                    stderr = %output.stderr.trim(),
                    "terminal script finished"
                );
                Ok(output)
            }
            Ok(Err(e)) => Err(BridgeError::Wait(e)),
            Err(_) => {
                // The future owned the child; dropping it kills the process.
                warn!(script, limit_secs = limit.as_secs(), "terminal script timed out");
                Err(BridgeError::Timeout {
                    secs: limit.as_secs(),
                })
            }
        }
    }

    /// Run `script` and interpret its output into a result.
    pub async fn execute(&self, script: &str, args: &[String]) -> OperationResult {
        match self.run(script, args).await {
            Ok(output) => interpret(&output),
            Err(err) => err.into(),
        }
    }

    /// Whether `<interpreter> --version` runs and exits 0.
    pub async fn interpreter_available(&self) -> bool {
        let status = Command::new(&self.config.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.config.wall_clock_timeout(), status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                warn!(interpreter = %self.config.interpreter, error = %e, "interpreter not available");
                false
            }
            Err(_) => false,
        }
    }
}

/// The line that carries a script's result.
///
/// The last line starting with the `RESULT ` sentinel wins, with the prefix
/// removed. Without a sentinel the last non-empty line is used.
pub fn result_line(text: &str) -> Option<&str> {
    let lines = || text.lines().map(str::trim).filter(|l| !l.is_empty());

    lines()
        .filter_map(|line| line.strip_prefix(RESULT_SENTINEL))
        .map(str::trim)
        .next_back()
        .or_else(|| lines().next_back())
}

fn json_object(line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Map captured output to an [`OperationResult`].
pub fn interpret(output: &ScriptOutput) -> OperationResult {
    if output.succeeded() {
        if let Some(data) = result_line(&output.stdout).and_then(json_object) {
            return OperationResult::with_data(data);
        }
        let text = output.stdout.trim();
        return if text.is_empty() {
            OperationResult::ok()
        } else {
            OperationResult::with_message(text)
        };
    }

    if let Some(line) = result_line(&output.stderr)
        && let Some(object) = json_object(line)
    {
        let error = ["error", "message"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .unwrap_or(line)
            .to_string();
        return OperationResult::failure(error).data(object);
    }

    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return OperationResult::failure(stderr);
    }

    match output.exit_code {
        Some(code) => OperationResult::failure(format!("Process exited with code {code}")),
        None => OperationResult::failure("Process terminated by signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> ScriptOutput {
        ScriptOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[rstest]
    #[case("a\nb\n", Some("b"))]
    #[case("a\nb\n\n   \n", Some("b"))]
    #[case("RESULT {\"x\":1}\ntrailing noise\n", Some("{\"x\":1}"))]
    #[case("RESULT one\nRESULT two\nnoise", Some("two"))]
    #[case("", None)]
    #[case("\n\n", None)]
    fn test_result_line(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(result_line(text), expected);
    }

    #[test]
    fn test_success_with_json_line() {
        let result = interpret(&output(Some(0), "INFO line\n{\"ok\":true}\n", ""));
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"ok": true})));
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_success_without_json_returns_raw_text() {
        let result = interpret(&output(Some(0), "  connected\nall good  \n", ""));
        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("connected\nall good"));
        assert_eq!(result.data, None);
    }

    #[test]
    fn test_success_json_array_is_not_data() {
        let result = interpret(&output(Some(0), "[1,2]\n", ""));
        assert_eq!(result.message.as_deref(), Some("[1,2]"));
    }

    #[rstest]
    #[case("{\"error\":\"uid busy\",\"code\":3}", "uid busy")]
    #[case("{\"message\":\"no device\"}", "no device")]
    #[case("{\"code\":3}", "{\"code\":3}")]
    fn test_failure_with_json_line(#[case] line: &str, #[case] expected: &str) {
        let stderr = format!("Traceback...\n{line}\n");
        let result = interpret(&output(Some(1), "", &stderr));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(expected));
        assert!(result.data.is_some());
    }

    #[test]
    fn test_failure_plain_stderr() {
        let result = interpret(&output(Some(2), "", "  boom\n"));
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.data, None);
    }

    #[test]
    fn test_failure_empty_stderr() {
        let result = interpret(&output(Some(4), "ignored", ""));
        assert_eq!(result.error.as_deref(), Some("Process exited with code 4"));
    }

    #[test]
    fn test_killed_by_signal() {
        let result = interpret(&output(None, "", ""));
        assert_eq!(result.error.as_deref(), Some("Process terminated by signal"));
    }
}
