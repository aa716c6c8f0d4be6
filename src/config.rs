//! Configuration loading for the Tello link

use crate::{Result, TelloError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Well-known link-local address of the drone in access-point mode
pub const TELLO_HOST: &str = "192.168.10.1";
pub const TELLO_COMMAND_PORT: u16 = 8889;
pub const TELLO_TELEMETRY_PORT: u16 = 8890;

const DEFAULT_REPLY_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_KEEP_ALIVE_SECS: f64 = 10.0;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub drone: DroneConfig,
    pub connection: ConnectionConfig,
    pub telemetry: TelemetryConfig,
    pub keep_alive: KeepAliveConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DroneConfig {
    pub host: String,
    /// Local interface the sockets bind to
    pub bind_host: String,
    pub ports: PortConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device command port
    pub command: u16,
    /// Local port the device pushes telemetry to
    pub telemetry: u16,
    /// Local command socket port, 0 for ephemeral
    pub local_command: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Command reply deadline in seconds
    pub timeout: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    /// Probe interval in seconds
    pub interval: f64,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            host: TELLO_HOST.to_string(),
            bind_host: "0.0.0.0".to_string(),
            ports: PortConfig::default(),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            command: TELLO_COMMAND_PORT,
            telemetry: TELLO_TELEMETRY_PORT,
            local_command: 0,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REPLY_TIMEOUT_SECS,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl Config {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| TelloError::Config(format!("Failed to read {}: {}", config_path, e)))?;

        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot become a usable duration or socket pair.
    /// Runs on every load and in every constructor that takes a `Config`.
    pub(crate) fn validate(&self) -> Result<()> {
        check_seconds("connection.timeout", self.connection.timeout)?;
        check_seconds("keep_alive.interval", self.keep_alive.interval)?;
        if self.drone.ports.command == self.drone.ports.telemetry {
            return Err(TelloError::Config(
                "command and telemetry ports must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_seconds(name: &str, seconds: f64) -> Result<()> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        _ => Err(TelloError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            name, seconds
        ))),
    }
}

impl ConnectionConfig {
    /// Falls back to the default when `timeout` is not a valid duration
    pub fn reply_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_REPLY_TIMEOUT_SECS))
    }
}

impl KeepAliveConfig {
    /// Falls back to the default when `interval` is not a valid duration
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_KEEP_ALIVE_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device() {
        let config = Config::default();
        assert_eq!(config.drone.host, "192.168.10.1");
        assert_eq!(config.drone.ports.command, 8889);
        assert_eq!(config.drone.ports.telemetry, 8890);
        assert_eq!(config.connection.reply_timeout(), Duration::from_secs(10));
        assert_eq!(config.keep_alive.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::load_from_str(
            "connection:\n  timeout: 5.0\nkeep_alive:\n  enabled: true\n",
        )
        .unwrap();
        assert_eq!(config.connection.reply_timeout(), Duration::from_secs(5));
        assert!(config.keep_alive.enabled);
        assert_eq!(config.keep_alive.interval, 10.0);
        assert_eq!(config.drone.host, TELLO_HOST);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = Config::load_from_str("connection:\n  timeout: 0\n").unwrap_err();
        assert!(matches!(err, TelloError::Config(_)));
    }

    #[test]
    fn test_rejects_unrepresentable_durations() {
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            let mut config = Config::default();
            config.keep_alive.interval = bad;
            assert!(matches!(config.validate(), Err(TelloError::Config(_))), "{}", bad);

            let mut config = Config::default();
            config.connection.timeout = bad;
            assert!(matches!(config.validate(), Err(TelloError::Config(_))), "{}", bad);
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_shared_ports() {
        let err = Config::load_from_str("drone:\n  ports:\n    command: 9000\n    telemetry: 9000\n")
            .unwrap_err();
        assert!(matches!(err, TelloError::Config(_)));
    }
}
