//! Gateway configuration – read from `~/.rigbridge/config.toml`.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rigbridge_hal::SerialConfig;
use rigbridge_protocol::PaddingPolicy;
use rigbridge_runtime::{DispatcherConfig, GatewayConfig};
use serde::{Deserialize, Serialize};

/// Settings of one gateway process.  Every field has a default, so an empty
/// file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial device the rig is attached to.
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_serial_read_timeout_ms")]
    pub serial_read_timeout_ms: u64,

    /// Host of the front end receiving telemetry.
    #[serde(default = "default_frontend_host")]
    pub frontend_host: String,

    /// Front-end port for gateway → front-end traffic.
    #[serde(default = "default_uplink_port")]
    pub uplink_port: u16,

    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Local port for front-end → gateway commands.
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    #[serde(default = "default_gait_tick_ms")]
    pub gait_tick_ms: u64,

    #[serde(default = "default_gain_timeout_ms")]
    pub gain_timeout_ms: u64,

    /// Reject frames with non-zero padding instead of warning.
    #[serde(default)]
    pub strict_padding: bool,

    /// Divisor for command-mode target values.
    #[serde(default = "default_command_scale")]
    pub command_scale: f64,

    #[serde(default = "default_device_silence_ms")]
    pub device_silence_ms: u64,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_serial_read_timeout_ms() -> u64 {
    1_000
}
fn default_frontend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_uplink_port() -> u16 {
    6050
}
fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_command_port() -> u16 {
    6060
}
fn default_gait_tick_ms() -> u64 {
    300
}
fn default_gain_timeout_ms() -> u64 {
    2_000
}
fn default_command_scale() -> f64 {
    2.275
}
fn default_device_silence_ms() -> u64 {
    2_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            serial_read_timeout_ms: default_serial_read_timeout_ms(),
            frontend_host: default_frontend_host(),
            uplink_port: default_uplink_port(),
            listen_host: default_listen_host(),
            command_port: default_command_port(),
            gait_tick_ms: default_gait_tick_ms(),
            gain_timeout_ms: default_gain_timeout_ms(),
            strict_padding: false,
            command_scale: default_command_scale(),
            device_silence_ms: default_device_silence_ms(),
        }
    }
}

impl Config {
    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.command_scale.is_finite() && self.command_scale > 0.0) {
            return Err(format!(
                "command_scale must be a positive number, got {}",
                self.command_scale
            ));
        }
        if self.baud_rate == 0 {
            return Err("baud_rate must be non-zero".to_string());
        }
        for (key, value) in [
            ("gait_tick_ms", self.gait_tick_ms),
            ("gain_timeout_ms", self.gain_timeout_ms),
            ("device_silence_ms", self.device_silence_ms),
        ] {
            if value == 0 {
                return Err(format!("{key} must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            path: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.serial_read_timeout_ms),
        }
    }

    /// Resolve addresses and build the runtime's configuration.
    pub fn gateway_config(&self) -> Result<GatewayConfig, String> {
        self.validate()?;
        Ok(GatewayConfig {
            listen_addr: resolve(&self.listen_host, self.command_port)?,
            frontend_addr: resolve(&self.frontend_host, self.uplink_port)?,
            padding: if self.strict_padding {
                PaddingPolicy::Reject
            } else {
                PaddingPolicy::Warn
            },
            device_silence: Duration::from_millis(self.device_silence_ms),
            dispatcher: DispatcherConfig {
                gain_timeout: Duration::from_millis(self.gain_timeout_ms),
                command_scale: self.command_scale,
                gait_tick: Duration::from_millis(self.gait_tick_ms),
            },
        })
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("Failed to resolve {host}:{port}: {e}"))?
        .next()
        .ok_or_else(|| format!("No address found for {host}:{port}"))
}

/// Return the path to `~/.rigbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rigbridge").join("config.toml")
}

/// Load `path`, falling back to defaults when it does not exist, then apply
/// environment overrides.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file alone.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `RIGBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RIGBRIDGE_SERIAL_PORT` | `serial_port` |
/// | `RIGBRIDGE_BAUD_RATE` | `baud_rate` |
/// | `RIGBRIDGE_FRONTEND_HOST` | `frontend_host` |
/// | `RIGBRIDGE_UPLINK_PORT` | `uplink_port` |
/// | `RIGBRIDGE_COMMAND_PORT` | `command_port` |
/// | `RIGBRIDGE_GAIN_TIMEOUT_MS` | `gain_timeout_ms` |
///
/// Numeric values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RIGBRIDGE_SERIAL_PORT") {
        cfg.serial_port = v;
    }
    if let Ok(v) = std::env::var("RIGBRIDGE_BAUD_RATE")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.baud_rate = baud;
    }
    if let Ok(v) = std::env::var("RIGBRIDGE_FRONTEND_HOST") {
        cfg.frontend_host = v;
    }
    if let Ok(v) = std::env::var("RIGBRIDGE_UPLINK_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.uplink_port = port;
    }
    if let Ok(v) = std::env::var("RIGBRIDGE_COMMAND_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.command_port = port;
    }
    if let Ok(v) = std::env::var("RIGBRIDGE_GAIN_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.gain_timeout_ms = ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_to_rigbridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".rigbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "serial_port = \"/dev/ttyACM1\"\nstrict_padding = true\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.serial_port, "/dev/ttyACM1");
        assert!(cfg.strict_padding);
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.uplink_port, 6050);
        assert_eq!(cfg.command_port, 6060);
        assert_eq!(cfg.command_scale, 2.275);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "baud_rate = \"fast\"").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"), "{err}");
    }

    #[test]
    fn gateway_config_maps_every_field() {
        let cfg = Config {
            frontend_host: "127.0.0.1".to_string(),
            listen_host: "127.0.0.1".to_string(),
            strict_padding: true,
            gain_timeout_ms: 500,
            gait_tick_ms: 100,
            device_silence_ms: 750,
            ..Config::default()
        };
        let gw = cfg.gateway_config().expect("valid config");
        assert_eq!(gw.frontend_addr, "127.0.0.1:6050".parse().unwrap());
        assert_eq!(gw.listen_addr, "127.0.0.1:6060".parse().unwrap());
        assert_eq!(gw.padding, PaddingPolicy::Reject);
        assert_eq!(gw.device_silence, Duration::from_millis(750));
        assert_eq!(gw.dispatcher.gain_timeout, Duration::from_millis(500));
        assert_eq!(gw.dispatcher.gait_tick, Duration::from_millis(100));
        assert_eq!(gw.dispatcher.command_scale, 2.275);
    }

    #[test]
    fn non_positive_command_scale_is_rejected() {
        let cfg = Config {
            command_scale: 0.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.gateway_config().is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let zero_silence = Config {
            device_silence_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            zero_silence.validate().unwrap_err(),
            "device_silence_ms must be non-zero"
        );

        let zero_timeout = Config {
            gain_timeout_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            zero_timeout.validate().unwrap_err(),
            "gain_timeout_ms must be non-zero"
        );
        assert!(zero_timeout.gateway_config().is_err());

        let zero_tick = Config {
            gait_tick_ms: 0,
            ..Config::default()
        };
        assert_eq!(zero_tick.validate().unwrap_err(), "gait_tick_ms must be non-zero");
    }

    #[test]
    fn serial_config_uses_port_settings() {
        let cfg = Config {
            serial_port: "/dev/ttyS3".to_string(),
            baud_rate: 9600,
            serial_read_timeout_ms: 250,
            ..Config::default()
        };
        let serial = cfg.serial_config();
        assert_eq!(serial.path, "/dev/ttyS3");
        assert_eq!(serial.baud_rate, 9600);
        assert_eq!(serial.read_timeout, Duration::from_millis(250));
    }

    // All environment cases run in one test so no two tests race on the
    // process environment.
    #[test]
    fn apply_env_overrides_reads_rigbridge_variables() {
        // SAFETY: only this test touches RIGBRIDGE_* variables.
        unsafe {
            std::env::set_var("RIGBRIDGE_SERIAL_PORT", "/dev/ttyUSB3");
            std::env::set_var("RIGBRIDGE_UPLINK_PORT", "7050");
            std::env::set_var("RIGBRIDGE_COMMAND_PORT", "not-a-port");
            std::env::set_var("RIGBRIDGE_GAIN_TIMEOUT_MS", "1500");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("RIGBRIDGE_SERIAL_PORT");
            std::env::remove_var("RIGBRIDGE_UPLINK_PORT");
            std::env::remove_var("RIGBRIDGE_COMMAND_PORT");
            std::env::remove_var("RIGBRIDGE_GAIN_TIMEOUT_MS");
        }

        assert_eq!(cfg.serial_port, "/dev/ttyUSB3");
        assert_eq!(cfg.uplink_port, 7050);
        assert_eq!(cfg.command_port, 6060);
        assert_eq!(cfg.gain_timeout_ms, 1500);
    }
}
