use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of motorized stage attached to a controller. Determines the travel envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorType {
    /// Linear stage, travel in millimetres.
    Translation,
    /// Rotation mount, travel in degrees.
    Rotation,
}

impl MotorType {
    /// Full mechanical travel of the stage in real-world units.
    pub fn max_travel(self) -> f64 {
        match self {
            MotorType::Translation => 25.0,
            MotorType::Rotation => 12.0,
        }
    }
}

impl fmt::Display for MotorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorType::Translation => write!(f, "translation"),
            MotorType::Rotation => write!(f, "rotation"),
        }
    }
}

impl FromStr for MotorType {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "translation" => Ok(MotorType::Translation),
            "rotation" => Ok(MotorType::Rotation),
            other => Err(StageError::Config(format!("not a valid motor type: '{other}'"))),
        }
    }
}

/// Physical controller family. Each family binds a different vendor handle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// Single-axis APT controller driven through the `MGMotor` ActiveX control.
    #[serde(rename = "legacy_activex", alias = "apt")]
    LegacyActiveX,
    /// K-Cube DC servo controller (KDC101).
    #[serde(rename = "kcube_dc_servo")]
    KCubeDcServo,
    /// T-Cube DC servo controller (TDC001).
    #[serde(rename = "tcube_dc_servo")]
    TCubeDcServo,
    /// T-Cube stepper controller (TST001).
    #[serde(rename = "tcube_stepper")]
    TCubeStepper,
}

impl DeviceFamily {
    /// Vendor capability module that must be loaded before a handle of this
    /// family can be created. `None` for the legacy control.
    pub fn capability_module(self) -> Option<&'static str> {
        match self {
            DeviceFamily::LegacyActiveX => None,
            DeviceFamily::KCubeDcServo => Some("Thorlabs.MotionControl.KCube.DCServoCLI"),
            DeviceFamily::TCubeDcServo => Some("Thorlabs.MotionControl.TCube.DCServoCLI"),
            DeviceFamily::TCubeStepper => Some("Thorlabs.MotionControl.TCube.StepperMotorCLI"),
        }
    }

    /// Whether the controller has a K-Cube style front panel (wheel/joystick and display).
    pub fn has_front_panel(self) -> bool {
        matches!(self, DeviceFamily::KCubeDcServo)
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFamily::LegacyActiveX => write!(f, "legacy_activex"),
            DeviceFamily::KCubeDcServo => write!(f, "kcube_dc_servo"),
            DeviceFamily::TCubeDcServo => write!(f, "tcube_dc_servo"),
            DeviceFamily::TCubeStepper => write!(f, "tcube_stepper"),
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy_activex" | "apt" => Ok(DeviceFamily::LegacyActiveX),
            "kcube_dc_servo" => Ok(DeviceFamily::KCubeDcServo),
            "tcube_dc_servo" => Ok(DeviceFamily::TCubeDcServo),
            "tcube_stepper" => Ok(DeviceFamily::TCubeStepper),
            other => Err(StageError::Config(format!("unknown device family: '{other}'"))),
        }
    }
}

/// Direction of travel as understood by the vendor SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorDirection {
    Forward,
    Backward,
}

impl MotorDirection {
    /// Negative values travel backward, everything else forward.
    pub fn from_signed(value: f64) -> Self {
        if value < 0.0 {
            MotorDirection::Backward
        } else {
            MotorDirection::Forward
        }
    }
}

/// Velocity profile in real-world units (mm/s or deg/s, and per second squared).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityParams {
    pub max_velocity: f64,
    pub acceleration: f64,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            max_velocity: 2.2,
            acceleration: 1.0,
        }
    }
}

/// Status flags reported by the device polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub is_homed: bool,
    pub is_moving: bool,
}

/// Identification block returned by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub name: String,
}

/// Behaviour of the K-Cube velocity wheel / joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoystickMode {
    Velocity,
    Jog,
    MoveAbsolute,
}

/// K-Cube front panel (MMI) settings.
///
/// The wheel mode property was renamed across SDK releases: controllers driven
/// by SDKs before 1.14.6 expose `wheel_mode`, later ones `joystick_mode`. A
/// `None` slot means the property does not exist in the connected SDK.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MmiParams {
    pub wheel_mode: Option<JoystickMode>,
    pub joystick_mode: Option<JoystickMode>,
    pub display_intensity: u8,
    pub display_timeout: u16,
}

/// A commanded position that fell outside the axis travel envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// The position the move would have ended at.
    pub target: f64,
    /// Lowest allowed position (inclusive).
    pub min: f64,
    /// Highest allowed position (inclusive).
    pub max: f64,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position {} is outside the travel envelope [{}, {}]",
            self.target, self.min, self.max
        )
    }
}

/// Result of a motion command that was accepted at the call boundary.
///
/// Validation rejections and hardware failures on the move call itself are
/// contained here instead of being returned as errors, so the adapter stays
/// usable and callers can tell the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// The command was handed to the device.
    Dispatched,
    /// The target lies outside the envelope; nothing was sent to the device.
    Rejected(Rejection),
    /// A jog toward an envelope edge was refused and the axis was stopped.
    Halted(Rejection),
    /// The device refused the move call.
    Failed(StageError),
}

impl MoveOutcome {
    /// `true` only when the command reached the device.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, MoveOutcome::Dispatched)
    }
}

/// Motion commands that can be routed to a registered axis by serial number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum MotionIntent {
    /// Run the firmware homing procedure.
    Home { serial: String },
    /// Move to an absolute position.
    MoveAbsolute { serial: String, target: f64 },
    /// Move by a signed distance from the current position.
    MoveRelative { serial: String, delta: f64 },
    /// Continuous motion at a signed speed until stopped.
    Jog { serial: String, speed: f64 },
    /// Graceful stop of a single axis.
    Stop { serial: String },
    /// Immediate stop of every registered axis.
    EmergencyStop,
}

/// Error type shared by every stage adapter.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageError {
    #[error("Device Not Created: {serial} has no bound handle (call create() first)")]
    NotCreated { serial: String },

    #[error("Settings Timeout: {serial} did not initialize within {timeout_ms} ms")]
    SettingsTimeout { serial: String, timeout_ms: u64 },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("API Drift: neither '{primary}' nor '{fallback}' exists in this SDK version")]
    ApiDrift { primary: String, fallback: String },

    #[error("Unsupported: {family} devices do not support {operation}")]
    Unsupported { family: DeviceFamily, operation: String },

    #[error("Runtime Location Error: {0}")]
    RuntimeLocation(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl StageError {
    /// Convenience constructor for vendor call failures.
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        StageError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}
