//! [`MotorAdapter`] – uniform command surface over one Kinesis device handle.
//!
//! The adapter owns the axis identity (serial number and [`MotorType`]), the
//! velocity profile, and the [`TravelEnvelope`].  Every command is forwarded
//! to the bound [`DeviceHandle`]; the adapter adds exactly three things:
//!
//! 1. **Lifecycle** – [`create`][MotorAdapter::create] binds a handle through
//!    the family [`DeviceDescriptor`], [`enable`][MotorAdapter::enable] runs
//!    the connect handshake, [`disconnect`][MotorAdapter::disconnect] releases
//!    the binding.  Any command without a bound handle fails with
//!    [`StageError::NotCreated`].
//! 2. **Range guard** – absolute moves, relative moves and jogs are checked
//!    against the envelope first.  Rejected moves touch no device state and
//!    come back as [`MoveOutcome::Rejected`].
//! 3. **Containment** – a failing move call is logged and returned as
//!    [`MoveOutcome::Failed`] so the caller can inspect status and retry.
//!
//! Motion commands are fire-and-forget; completion is observed by polling
//! [`is_homed`][MotorAdapter::is_homed] / [`is_moving`][MotorAdapter::is_moving].
//! The adapter does not serialize overlapping commands; issue a stop between
//! motions.

use std::thread;
use std::time::Duration;

use stagectl_types::{
    DeviceFamily, DeviceInfo, JoystickMode, MotorDirection, MotorType, MoveOutcome, StageError,
    VelocityParams,
};
use tracing::{debug, info, warn};

pub use crate::envelope::DEFAULT_SAFETY_BUFFER;
use crate::envelope::TravelEnvelope;
use crate::family::DeviceDescriptor;
use crate::handle::DeviceHandle;

/// Channel index used for every single-axis controller.
pub const CHANNEL: u32 = 0;

/// Timing of the [`MotorAdapter::enable`] handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableTiming {
    /// Upper bound on waiting for device settings to initialize.
    pub settings_timeout: Duration,
    /// Interval of the vendor status polling loop.
    pub polling_interval: Duration,
    /// Pause after starting polling and after enabling the device.
    pub settle_delay: Duration,
}

impl Default for EnableTiming {
    fn default() -> Self {
        Self {
            settings_timeout: Duration::from_millis(5000),
            polling_interval: Duration::from_millis(250),
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// One physical axis driven through a Kinesis controller.
pub struct MotorAdapter {
    serial: String,
    motor_type: MotorType,
    descriptor: DeviceDescriptor,
    profile: VelocityParams,
    envelope: TravelEnvelope,
    timing: EnableTiming,
    handle: Option<Box<dyn DeviceHandle>>,
}

impl MotorAdapter {
    /// New, unbound adapter.  Call [`create`][Self::create] before anything else.
    pub fn new(
        serial: impl Into<String>,
        motor_type: MotorType,
        descriptor: DeviceDescriptor,
    ) -> Self {
        Self {
            serial: serial.into(),
            motor_type,
            descriptor,
            profile: VelocityParams::default(),
            envelope: TravelEnvelope::standard(motor_type),
            timing: EnableTiming::default(),
            handle: None,
        }
    }

    /// Velocity profile applied before every move.
    pub fn with_profile(mut self, profile: VelocityParams) -> Self {
        self.profile = profile;
        self
    }

    /// # Errors
    ///
    /// [`StageError::Config`] when `buffer` is negative, non-finite, or
    /// leaves no valid position on this axis.
    pub fn with_safety_buffer(mut self, buffer: f64) -> Result<Self, StageError> {
        self.envelope = TravelEnvelope::for_motor(self.motor_type, buffer)?;
        Ok(self)
    }

    pub fn with_timing(mut self, timing: EnableTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    pub fn motor_type(&self) -> MotorType {
        self.motor_type
    }

    pub fn family(&self) -> DeviceFamily {
        self.descriptor.family()
    }

    pub fn envelope(&self) -> TravelEnvelope {
        self.envelope
    }

    pub fn profile(&self) -> VelocityParams {
        self.profile
    }

    /// Whether a handle is currently bound.
    pub fn is_created(&self) -> bool {
        self.handle.is_some()
    }

    fn device(&self) -> Result<&dyn DeviceHandle, StageError> {
        self.handle.as_deref().ok_or_else(|| StageError::NotCreated {
            serial: self.serial.clone(),
        })
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn DeviceHandle>, StageError> {
        self.handle.as_mut().ok_or_else(|| StageError::NotCreated {
            serial: self.serial.clone(),
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Bind a fresh handle for this serial number, replacing any existing one.
    pub fn create(&mut self) -> Result<(), StageError> {
        let handle = self.descriptor.create(&self.serial)?;
        if self.handle.replace(handle).is_some() {
            debug!(serial = %self.serial, "replaced existing device handle");
        }
        info!(serial = %self.serial, family = %self.family(), "device handle created");
        Ok(())
    }

    /// Connect handshake: connect, wait for settings, start polling, enable,
    /// load the persisted motor configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::SettingsTimeout`] when settings are still not
    /// initialized after waiting, or the error of whichever step failed.
    pub fn enable(&mut self) -> Result<(), StageError> {
        let serial = self.serial.clone();
        let timing = self.timing;
        let device = self.device_mut()?;

        device.connect(&serial)?;
        if !device.is_settings_initialized() {
            debug!(serial = %serial, "waiting for device settings");
            device.wait_for_settings_initialized(timing.settings_timeout)?;
            if !device.is_settings_initialized() {
                return Err(StageError::SettingsTimeout {
                    serial,
                    timeout_ms: u64::try_from(timing.settings_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                });
            }
        }
        device.start_polling(timing.polling_interval)?;
        settle(timing.settle_delay);
        device.enable_device()?;
        settle(timing.settle_delay);
        device.load_motor_configuration(&serial)?;

        info!(serial = %serial, "device enabled");
        Ok(())
    }

    /// De-energise the drive.
    pub fn disable(&mut self) -> Result<(), StageError> {
        self.device_mut()?.disable_device()?;
        info!(serial = %self.serial, "device disabled");
        Ok(())
    }

    /// Close the connection and release the handle.
    ///
    /// The handle is released even when the vendor call fails.
    pub fn disconnect(&mut self) -> Result<(), StageError> {
        let mut handle = self.handle.take().ok_or_else(|| StageError::NotCreated {
            serial: self.serial.clone(),
        })?;
        handle.disconnect()?;
        info!(serial = %self.serial, "device disconnected");
        Ok(())
    }

    /// Best-effort recovery: disable and disconnect (failures are logged and
    /// ignored), then create and enable again.
    pub fn reset(&mut self) -> Result<(), StageError> {
        warn!(serial = %self.serial, "resetting device");
        if let Err(error) = self.disable() {
            warn!(serial = %self.serial, %error, "disable failed during reset");
        }
        if let Err(error) = self.disconnect() {
            warn!(serial = %self.serial, %error, "disconnect failed during reset");
        }
        self.create()?;
        self.enable()
    }

    // ────────────────────────────────────────────────────────────────────
    // Reads
    // ────────────────────────────────────────────────────────────────────

    pub fn is_homed(&self) -> Result<bool, StageError> {
        Ok(self.device()?.status()?.is_homed)
    }

    /// Status of the last poll: `true` while the axis is in motion.
    pub fn is_moving(&self) -> Result<bool, StageError> {
        Ok(self.device()?.status()?.is_moving)
    }

    pub fn position(&self) -> Result<f64, StageError> {
        self.device()?.position()
    }

    pub fn velocity_params(&self) -> Result<VelocityParams, StageError> {
        self.device()?.velocity_params()
    }

    pub fn homing_velocity(&self) -> Result<f64, StageError> {
        self.device()?.homing_velocity()
    }

    /// Serial number and model name reported by the controller.
    pub fn device_info(&self) -> Result<DeviceInfo, StageError> {
        self.device()?.device_info()
    }

    // ────────────────────────────────────────────────────────────────────
    // Commands
    // ────────────────────────────────────────────────────────────────────

    /// Update the velocity profile.  Parameters left as `None` keep the value
    /// currently configured on the device.  The written profile is also used
    /// by subsequent moves.
    pub fn set_velocity(
        &mut self,
        max_velocity: Option<f64>,
        acceleration: Option<f64>,
    ) -> Result<VelocityParams, StageError> {
        let current = self.device()?.velocity_params()?;
        let params = VelocityParams {
            max_velocity: max_velocity.unwrap_or(current.max_velocity),
            acceleration: acceleration.unwrap_or(current.acceleration),
        };
        self.device_mut()?.set_velocity_params(params)?;
        self.profile = params;
        debug!(serial = %self.serial, ?params, "velocity profile updated");
        Ok(params)
    }

    /// Start the homing run at the profile velocity.  Returns immediately;
    /// poll [`is_homed`][Self::is_homed] for completion.
    pub fn home(&mut self) -> Result<(), StageError> {
        let velocity = self.profile.max_velocity;
        let device = self.device_mut()?;
        device.set_homing_velocity(velocity)?;
        device.home(CHANNEL)?;
        info!(serial = %self.serial, "homing started");
        Ok(())
    }

    /// Decelerate to a stop.
    pub fn stop(&mut self) -> Result<(), StageError> {
        self.device_mut()?.stop(CHANNEL)
    }

    /// Halt without deceleration.  Valid in any bound state.
    pub fn stop_immediate(&mut self) -> Result<(), StageError> {
        self.device_mut()?.stop_immediate()
    }

    /// Move to `target` if it lies inside the travel envelope.
    pub fn move_absolute(&mut self, target: f64) -> Result<MoveOutcome, StageError> {
        self.device()?;
        if let Err(rejection) = self.envelope.check_target(target) {
            warn!(serial = %self.serial, %rejection, "absolute move rejected");
            return Ok(MoveOutcome::Rejected(rejection));
        }

        let profile = self.profile;
        let device = self.device_mut()?;
        device.stop_immediate()?;
        device.set_velocity_params(profile)?;
        let result = device.move_to(target, CHANNEL);
        Ok(contain(&self.serial, "MoveTo", result))
    }

    /// Move by `delta` if the resulting position lies inside the envelope.
    pub fn move_relative(&mut self, delta: f64) -> Result<MoveOutcome, StageError> {
        let position = self.device()?.position()?;
        if let Err(rejection) = self.envelope.check_target(position + delta) {
            warn!(serial = %self.serial, position, delta, %rejection, "relative move rejected");
            return Ok(MoveOutcome::Rejected(rejection));
        }

        let profile = self.profile;
        let direction = MotorDirection::from_signed(delta);
        let device = self.device_mut()?;
        device.stop_immediate()?;
        device.set_velocity_params(profile)?;
        device.set_move_relative_distance(delta.abs())?;
        let result = device.move_relative(direction);
        Ok(contain(&self.serial, "MoveRelative", result))
    }

    /// Jog continuously at `speed` (sign selects the direction).
    ///
    /// When the axis is already past the envelope edge it is heading for, the
    /// axis is stopped immediately instead and [`MoveOutcome::Halted`] is
    /// returned.
    pub fn jog(&mut self, speed: f64) -> Result<MoveOutcome, StageError> {
        self.device()?;
        if let Err(rejection) = self.envelope.check_speed(speed) {
            warn!(serial = %self.serial, speed, "jog rejected: speed is not finite");
            return Ok(MoveOutcome::Rejected(rejection));
        }

        let position = self.device()?.position()?;
        let direction = MotorDirection::from_signed(speed);

        if let Err(rejection) = self.envelope.check_jog(position, direction) {
            warn!(
                serial = %self.serial,
                ?direction,
                %rejection,
                "reached the edge of the travel envelope, stopping"
            );
            let result = self.device_mut()?.stop_immediate();
            return Ok(match result {
                Ok(()) => MoveOutcome::Halted(rejection),
                Err(error) => contain(&self.serial, "StopImmediate", Err(error)),
            });
        }

        let result = self
            .device_mut()?
            .move_continuous_at_velocity(direction, speed.abs());
        Ok(contain(&self.serial, "MoveContinuousAtVelocity", result))
    }

    // ────────────────────────────────────────────────────────────────────
    // K-Cube front panel
    // ────────────────────────────────────────────────────────────────────

    fn front_panel(&mut self, operation: &str) -> Result<&mut Box<dyn DeviceHandle>, StageError> {
        let family = self.family();
        let device = self.device_mut()?;
        if !family.has_front_panel() {
            return Err(StageError::Unsupported {
                family,
                operation: operation.to_string(),
            });
        }
        Ok(device)
    }

    /// Put the velocity wheel / joystick in velocity mode.
    ///
    /// SDKs before 1.14.6 call the property `WheelMode`, later ones
    /// `JoystickMode`; whichever exists is set.
    ///
    /// # Errors
    ///
    /// [`StageError::ApiDrift`] when neither property exists.
    pub fn set_joystick_mode_velocity(&mut self) -> Result<(), StageError> {
        let device = self.front_panel("set_joystick_mode_velocity")?;
        let mut params = device.mmi_params()?;
        if params.wheel_mode.is_some() {
            params.wheel_mode = Some(JoystickMode::Velocity);
        } else if params.joystick_mode.is_some() {
            params.joystick_mode = Some(JoystickMode::Velocity);
        } else {
            return Err(StageError::ApiDrift {
                primary: "WheelMode".to_string(),
                fallback: "JoystickMode".to_string(),
            });
        }
        device.set_mmi_params(params)
    }

    pub fn set_display_intensity(&mut self, intensity: u8) -> Result<(), StageError> {
        let device = self.front_panel("set_display_intensity")?;
        let mut params = device.mmi_params()?;
        params.display_intensity = intensity;
        device.set_mmi_params(params)
    }

    pub fn set_display_timeout(&mut self, timeout: u16) -> Result<(), StageError> {
        let device = self.front_panel("set_display_timeout")?;
        let mut params = device.mmi_params()?;
        params.display_timeout = timeout;
        device.set_mmi_params(params)
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Turn the result of a move call into an outcome, logging failures.
pub(crate) fn contain(serial: &str, operation: &str, result: Result<(), StageError>) -> MoveOutcome {
    match result {
        Ok(()) => {
            debug!(serial, operation, "move dispatched");
            MoveOutcome::Dispatched
        }
        Err(error) => {
            warn!(serial, operation, %error, "move call failed");
            MoveOutcome::Failed(error)
        }
    }
}
