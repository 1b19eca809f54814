use crate::terminal::TerminalBridge;
use gatehouse_core::OperationResult;
use gatehouse_core::constants::{REQUIRED_SCRIPTS, SCRIPT_EXTENSION};
use serde::Serialize;
use tracing::info;

/// Outcome of [`TerminalBridge::diagnose`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub success: bool,
    pub message: String,
    pub python_available: bool,
    pub scripts_exist: bool,
    pub device_reachable: bool,
    pub errors: Vec<String>,
    pub details: DiagnosticsDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsDetails {
    pub device_ip: String,
    pub device_port: u16,
    pub timeout: u64,
    pub scripts_path: String,
    pub missing_scripts: Vec<String>,
    pub connection_result: Option<OperationResult>,
}

impl TerminalBridge {
    /// Check the interpreter, the required scripts and the device, in order.
    ///
    /// Every check runs even when an earlier one fails.
    pub async fn diagnose(&self) -> DiagnosticsReport {
        let config = self.config();
        let mut errors = Vec::new();

        let python_available = self.runner().interpreter_available().await;
        if !python_available {
            errors.push(format!(
                "Interpreter '{}' is not available",
                config.interpreter
            ));
        }

        let mut missing_scripts = Vec::new();
        for name in REQUIRED_SCRIPTS {
            let path = config.script_path(name);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                missing_scripts.push(format!("{name}.{SCRIPT_EXTENSION}"));
            }
        }
        let scripts_exist = missing_scripts.is_empty();
        if !scripts_exist {
            errors.push(format!("Missing scripts: {}", missing_scripts.join(", ")));
        }

        let connection = self.test_connection(true).await;
        let device_reachable = connection.success;
        if !device_reachable {
            errors.push(format!(
                "Device connection failed: {}",
                connection.error_text()
            ));
        }

        let success = errors.is_empty();
        info!(success, errors = errors.len(), "terminal diagnostics finished");

        DiagnosticsReport {
            success,
            message: if success {
                "All diagnostics passed".to_string()
            } else {
                "Some diagnostics failed".to_string()
            },
            python_available,
            scripts_exist,
            device_reachable,
            errors,
            details: DiagnosticsDetails {
                device_ip: config.device_ip.clone(),
                device_port: config.device_port,
                timeout: config.timeout_secs,
                scripts_path: config.scripts_dir.display().to_string(),
                missing_scripts,
                connection_result: Some(connection),
            },
        }
    }
}
