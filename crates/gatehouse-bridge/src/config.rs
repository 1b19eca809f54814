use gatehouse_core::constants::{
    BRIDGE_TIMEOUT_MULTIPLIER, CONNECTION_CACHE_WINDOW_SECS, DEFAULT_TERMINAL_IP,
    DEFAULT_TERMINAL_PASSWORD, DEFAULT_TERMINAL_PORT, DEFAULT_TERMINAL_TIMEOUT_SECS,
    SCRIPT_EXTENSION,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Terminal bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Terminal IP address
    pub device_ip: String,

    /// Terminal TCP port
    pub device_port: u16,

    /// Terminal communication password
    pub device_password: String,

    /// Device I/O timeout handed to scripts, in seconds
    pub timeout_secs: u64,

    /// Directory holding the vendor scripts
    pub scripts_dir: PathBuf,

    /// Interpreter used to run the scripts
    pub interpreter: String,

    /// How long a connectivity check result stays valid
    pub cache_window: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_ip: DEFAULT_TERMINAL_IP.to_string(),
            device_port: DEFAULT_TERMINAL_PORT,
            device_password: DEFAULT_TERMINAL_PASSWORD.to_string(),
            timeout_secs: DEFAULT_TERMINAL_TIMEOUT_SECS,
            scripts_dir: PathBuf::from("scripts/zkteco"),
            interpreter: "python3".to_string(),
            cache_window: Duration::from_secs(CONNECTION_CACHE_WINDOW_SECS),
        }
    }
}

impl BridgeConfig {
    pub fn device_ip(mut self, ip: impl Into<String>) -> Self {
        self.device_ip = ip.into();
        self
    }

    pub fn device_port(mut self, port: u16) -> Self {
        self.device_port = port;
        self
    }

    pub fn device_password(mut self, password: impl Into<String>) -> Self {
        self.device_password = password.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn cache_window(mut self, window: Duration) -> Self {
        self.cache_window = window;
        self
    }

    /// Wall-clock limit the bridge applies to each script run.
    pub fn wall_clock_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs * BRIDGE_TIMEOUT_MULTIPLIER)
    }

    /// Full path of the script for `name`.
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(format!("{name}.{SCRIPT_EXTENSION}"))
    }

    /// Connection parameters passed ahead of every operation's arguments.
    pub fn device_args(&self) -> [String; 4] {
        [
            self.device_ip.clone(),
            self.device_port.to_string(),
            self.device_password.clone(),
            self.timeout_secs.to_string(),
        ]
    }

    pub fn scripts_path(&self) -> &Path {
        &self.scripts_dir
    }

    /// Public view of the device settings; never includes the password.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            ip: self.device_ip.clone(),
            port: self.device_port,
            timeout: self.timeout_secs,
        }
    }
}

/// Device settings safe to expose over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    pub ip: String,
    pub port: u16,
    pub timeout: u64,
}
