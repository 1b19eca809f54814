//! Command-line and environment configuration.
//!
//! Every option can be set through the environment variable named next to
//! it, which is how the gateway is normally deployed.

use clap::{Parser, ValueEnum};
use gatehouse_bridge::BridgeConfig;
use gatehouse_correlator::{BrokerConfig, BrokerTransport, CorrelatorConfig};
use gatehouse_relay::{CameraConfig, RelayConfig};
use gatehouse_storage::DatabaseConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::clients::ServiceUrls;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse", version, about = "Device-integration gateway for the access-control dashboard")]
pub struct Cli {
    /// Address the HTTP API listens on.
    #[arg(long, env = "GATEHOUSE_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    #[arg(long, env = "GATEHOUSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "gatehouse.db")]
    pub database_path: String,

    // Terminal bridge
    #[arg(long, env = "ZKTECO_DEVICE_IP", default_value = "192.168.1.201")]
    pub terminal_ip: String,

    #[arg(long, env = "ZKTECO_DEVICE_PORT", default_value_t = 4370)]
    pub terminal_port: u16,

    #[arg(long, env = "ZKTECO_DEVICE_PASSWORD", default_value = "0", hide_env_values = true)]
    pub terminal_password: String,

    /// Per-call device timeout in seconds; scripts are killed after twice this.
    #[arg(long, env = "ZKTECO_TIMEOUT", default_value_t = 5)]
    pub terminal_timeout: u64,

    #[arg(long, env = "ZKTECO_SCRIPTS_DIR", default_value = "scripts/zkteco")]
    pub scripts_dir: PathBuf,

    #[arg(long, env = "ZKTECO_INTERPRETER", default_value = "python3")]
    pub interpreter: String,

    // Message broker
    #[arg(long, env = "MQTT_ZKTECO_BROKER_HOST", default_value = "192.168.1.86")]
    pub broker_host: String,

    #[arg(long, env = "MQTT_ZKTECO_BROKER_PORT", default_value_t = 9001)]
    pub broker_port: u16,

    #[arg(long, env = "MQTT_ZKTECO_USERNAME")]
    pub broker_username: Option<String>,

    #[arg(long, env = "MQTT_ZKTECO_PASSWORD", hide_env_values = true)]
    pub broker_password: Option<String>,

    /// `ws` or `tcp`.
    #[arg(long, env = "MQTT_ZKTECO_TRANSPORT", default_value = "ws")]
    pub broker_transport: BrokerTransport,

    /// Default wait for a device answer, in milliseconds.
    #[arg(long, env = "MQTT_COMMAND_TIMEOUT_MS", default_value_t = 30_000)]
    pub command_timeout_ms: u64,

    // Camera
    /// Full stream URL; overrides the individual camera settings.
    #[arg(long, env = "RTSP_CAMERA_URL")]
    pub camera_url: Option<String>,

    #[arg(long, env = "RTSP_CAMERA_IP")]
    pub camera_ip: Option<String>,

    #[arg(long, env = "RTSP_CAMERA_PORT", default_value_t = 554)]
    pub camera_port: u16,

    #[arg(long, env = "RTSP_CAMERA_USERNAME")]
    pub camera_username: Option<String>,

    #[arg(long, env = "RTSP_CAMERA_PASSWORD", hide_env_values = true)]
    pub camera_password: Option<String>,

    #[arg(long, env = "RTSP_CAMERA_CHANNEL", default_value = "101")]
    pub camera_channel: String,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: String,

    // Biometric services
    #[arg(long, env = "FACE_API_BASE_URL", default_value = "https://face.iotech.my.id")]
    pub face_api_url: String,

    #[arg(long, env = "PALM_API_URL", default_value = "http://localhost:8000/api/palm/delete")]
    pub palm_api_url: String,
}

impl Cli {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .device_ip(&self.terminal_ip)
            .device_port(self.terminal_port)
            .device_password(&self.terminal_password)
            .timeout_secs(self.terminal_timeout)
            .scripts_dir(&self.scripts_dir)
            .interpreter(&self.interpreter)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        let config = BrokerConfig::new(&self.broker_host, self.broker_port)
            .transport(self.broker_transport);
        match (&self.broker_username, &self.broker_password) {
            (Some(user), password) => {
                config.credentials(user, password.as_deref().unwrap_or_default())
            }
            _ => config,
        }
    }

    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            default_timeout: Duration::from_millis(self.command_timeout_ms),
            ..CorrelatorConfig::default()
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        let mut camera = CameraConfig::default()
            .port(self.camera_port)
            .channel(&self.camera_channel);
        camera.url = self.camera_url.clone().filter(|url| !url.is_empty());
        camera.ip = self.camera_ip.clone().filter(|ip| !ip.is_empty());
        camera.username = self.camera_username.clone();
        camera.password = self.camera_password.clone();
        camera
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default().ffmpeg_path(&self.ffmpeg_path)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_path)
    }

    pub fn service_urls(&self) -> ServiceUrls {
        ServiceUrls {
            face_api: self.face_api_url.trim_end_matches('/').to_string(),
            palm_api: self.palm_api_url.clone(),
        }
    }
}
