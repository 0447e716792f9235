//! Configuration – reads/writes `~/.stagectl/config.toml`.

use serde::{Deserialize, Serialize};
use stagectl_hal::motor::{DEFAULT_SAFETY_BUFFER, EnableTiming};
use stagectl_types::{DeviceFamily, MotorType, VelocityParams};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// One stage as listed under `[[axes]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Controller serial number.
    pub serial: String,
    pub family: DeviceFamily,
    #[serde(default = "default_motor_type")]
    pub motor_type: MotorType,
}

/// Persisted user configuration stored in `~/.stagectl/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Kinesis installation directory.
    #[serde(default = "default_kinesis_path")]
    pub kinesis_path: String,

    /// Drive simulated controllers instead of the vendor runtime.
    #[serde(default)]
    pub simulate: bool,

    #[serde(default = "default_settings_timeout_ms")]
    pub settings_timeout_ms: u64,

    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Pause after starting polling and after enabling a device.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,

    #[serde(default = "default_max_acceleration")]
    pub max_acceleration: f64,

    /// Margin kept clear at both ends of every travel range.
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: f64,

    #[serde(default)]
    pub axes: Vec<AxisConfig>,
}

fn default_kinesis_path() -> String {
    r"C:\Program Files\Thorlabs\Kinesis".to_string()
}
fn default_settings_timeout_ms() -> u64 {
    5000
}
fn default_polling_interval_ms() -> u64 {
    250
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_max_velocity() -> f64 {
    VelocityParams::default().max_velocity
}
fn default_max_acceleration() -> f64 {
    VelocityParams::default().acceleration
}
fn default_safety_buffer() -> f64 {
    DEFAULT_SAFETY_BUFFER
}
fn default_motor_type() -> MotorType {
    MotorType::Translation
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kinesis_path: default_kinesis_path(),
            simulate: false,
            settings_timeout_ms: default_settings_timeout_ms(),
            polling_interval_ms: default_polling_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            max_velocity: default_max_velocity(),
            max_acceleration: default_max_acceleration(),
            safety_buffer: default_safety_buffer(),
            axes: Vec::new(),
        }
    }
}

impl Config {
    pub fn timing(&self) -> EnableTiming {
        EnableTiming {
            settings_timeout: Duration::from_millis(self.settings_timeout_ms),
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    /// Reject values no axis could use.  The upper bound on the safety
    /// buffer depends on the motor type and is checked at bring-up.
    pub fn validate(&self) -> Result<(), String> {
        if !self.safety_buffer.is_finite() || self.safety_buffer < 0.0 {
            return Err(format!(
                "safety_buffer must be a finite value >= 0, got {}",
                self.safety_buffer
            ));
        }
        Ok(())
    }

    pub fn profile(&self) -> VelocityParams {
        VelocityParams {
            max_velocity: self.max_velocity,
            acceleration: self.max_acceleration,
        }
    }
}

/// Return the path to `~/.stagectl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".stagectl").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `STAGECTL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STAGECTL_KINESIS_PATH` | `kinesis_path` |
/// | `STAGECTL_SIMULATE` | `simulate` (`1`/`true`/`yes`, `0`/`false`/`no`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STAGECTL_KINESIS_PATH") {
        cfg.kinesis_path = v;
    }
    if let Ok(v) = std::env::var("STAGECTL_SIMULATE")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.simulate = flag;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.stagectl/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_config_with_axes() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.simulate = true;
        cfg.axes.push(AxisConfig {
            serial: "27502878".to_string(),
            family: DeviceFamily::KCubeDcServo,
            motor_type: MotorType::Rotation,
        });
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.axes, cfg.axes);
        assert_eq!(loaded.settings_timeout_ms, 5000);
        assert!((loaded.safety_buffer - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            simulate = true

            [[axes]]
            serial = "80864431"
            family = "tcube_stepper"
            "#,
        )
        .expect("parse");
        assert!(cfg.simulate);
        assert_eq!(cfg.polling_interval_ms, 250);
        assert_eq!(cfg.axes[0].motor_type, MotorType::Translation);
        assert_eq!(cfg.axes[0].family, DeviceFamily::TCubeStepper);
        assert_eq!(cfg.profile(), VelocityParams::default());
    }

    #[test]
    fn timing_converts_milliseconds() {
        let cfg = Config {
            settle_delay_ms: 0,
            ..Config::default()
        };
        let timing = cfg.timing();
        assert_eq!(timing.settings_timeout, Duration::from_millis(5000));
        assert_eq!(timing.polling_interval, Duration::from_millis(250));
        assert!(timing.settle_delay.is_zero());
    }

    #[test]
    fn config_path_points_to_stagectl_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".stagectl"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[axes]]\nserial = 1\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn load_from_rejects_negative_safety_buffer() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "simulate = true\nsafety_buffer = -1.0\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("safety_buffer"));
    }

    #[test]
    fn zero_safety_buffer_is_valid() {
        let cfg = Config {
            safety_buffer: 0.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn apply_env_overrides_changes_kinesis_path() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("STAGECTL_KINESIS_PATH", "/opt/kinesis") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.kinesis_path, "/opt/kinesis");
        unsafe { std::env::remove_var("STAGECTL_KINESIS_PATH") };
    }

    #[test]
    fn simulate_flag_parsing() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
