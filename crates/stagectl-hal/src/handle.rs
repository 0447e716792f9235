//! [`DeviceHandle`] – the vendor controller surface consumed by
//! [`MotorAdapter`][crate::motor::MotorAdapter].
//!
//! A handle is a live connection object supplied by the vendor runtime (one
//! per physical axis).  Implementations forward each method to the matching
//! SDK call; positions and velocities cross this boundary in real-world units,
//! so device-count conversion stays inside the handle.
//!
//! Only K-Cube handles carry front panel (MMI) settings; the default
//! implementations of [`DeviceHandle::mmi_params`] and
//! [`DeviceHandle::set_mmi_params`] report the operation as unsupported.

use std::time::Duration;

use stagectl_types::{
    DeviceFamily, DeviceInfo, MmiParams, MotorDirection, MotorStatus, StageError, VelocityParams,
};

/// Connected vendor controller for a single axis.
///
/// Reads take `&self` and are snapshots of the vendor polling loop; they are
/// not synchronized against it.
pub trait DeviceHandle: Send {
    /// Controller family this handle was created for.
    fn family(&self) -> DeviceFamily;

    /// Open the connection to the controller with the given serial number.
    fn connect(&mut self, serial: &str) -> Result<(), StageError>;

    /// Close the connection.
    fn disconnect(&mut self) -> Result<(), StageError>;

    /// Energise the motor drive.
    fn enable_device(&mut self) -> Result<(), StageError>;

    /// De-energise the motor drive.
    fn disable_device(&mut self) -> Result<(), StageError>;

    /// Whether the controller has finished loading its settings.
    fn is_settings_initialized(&self) -> bool;

    /// Block until settings are initialized or `timeout` elapses.
    ///
    /// Returning `Ok` does not imply success; callers re-check
    /// [`is_settings_initialized`][Self::is_settings_initialized].
    fn wait_for_settings_initialized(&mut self, timeout: Duration) -> Result<(), StageError>;

    /// Start the vendor status polling loop.
    fn start_polling(&mut self, interval: Duration) -> Result<(), StageError>;

    /// Load the persisted motor configuration for `serial`.
    fn load_motor_configuration(&mut self, serial: &str) -> Result<(), StageError>;

    fn device_info(&self) -> Result<DeviceInfo, StageError>;

    /// Current position in real-world units.
    fn position(&self) -> Result<f64, StageError>;

    fn velocity_params(&self) -> Result<VelocityParams, StageError>;

    fn set_velocity_params(&mut self, params: VelocityParams) -> Result<(), StageError>;

    fn homing_velocity(&self) -> Result<f64, StageError>;

    fn set_homing_velocity(&mut self, velocity: f64) -> Result<(), StageError>;

    fn status(&self) -> Result<MotorStatus, StageError>;

    /// Start the homing procedure on `channel`. Returns once the command is issued.
    fn home(&mut self, channel: u32) -> Result<(), StageError>;

    /// Decelerate to a stop on `channel`.
    fn stop(&mut self, channel: u32) -> Result<(), StageError>;

    /// Halt without a deceleration profile.
    fn stop_immediate(&mut self) -> Result<(), StageError>;

    /// Move `channel` to an absolute `position`.
    fn move_to(&mut self, position: f64, channel: u32) -> Result<(), StageError>;

    /// Stage the (unsigned) distance used by the next [`move_relative`][Self::move_relative].
    fn set_move_relative_distance(&mut self, distance: f64) -> Result<(), StageError>;

    /// Move by the staged distance in `direction`.
    fn move_relative(&mut self, direction: MotorDirection) -> Result<(), StageError>;

    /// Move continuously at `speed` until stopped.
    fn move_continuous_at_velocity(
        &mut self,
        direction: MotorDirection,
        speed: f64,
    ) -> Result<(), StageError>;

    /// Read the front panel settings (K-Cube only).
    fn mmi_params(&self) -> Result<MmiParams, StageError> {
        Err(StageError::Unsupported {
            family: self.family(),
            operation: "GetMMIParams".to_string(),
        })
    }

    /// Write the front panel settings (K-Cube only).
    fn set_mmi_params(&mut self, _params: MmiParams) -> Result<(), StageError> {
        Err(StageError::Unsupported {
            family: self.family(),
            operation: "SetMMIParams".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process handle that only tracks position.
    struct MockHandle {
        position: f64,
    }

    impl DeviceHandle for MockHandle {
        fn family(&self) -> DeviceFamily {
            DeviceFamily::TCubeDcServo
        }
        fn connect(&mut self, _serial: &str) -> Result<(), StageError> {
            Ok(())
        }
        fn disconnect(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn enable_device(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn disable_device(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn is_settings_initialized(&self) -> bool {
            true
        }
        fn wait_for_settings_initialized(&mut self, _timeout: Duration) -> Result<(), StageError> {
            Ok(())
        }
        fn start_polling(&mut self, _interval: Duration) -> Result<(), StageError> {
            Ok(())
        }
        fn load_motor_configuration(&mut self, _serial: &str) -> Result<(), StageError> {
            Ok(())
        }
        fn device_info(&self) -> Result<DeviceInfo, StageError> {
            Ok(DeviceInfo {
                serial_number: "83854669".to_string(),
                name: "TDC001".to_string(),
            })
        }
        fn position(&self) -> Result<f64, StageError> {
            Ok(self.position)
        }
        fn velocity_params(&self) -> Result<VelocityParams, StageError> {
            Ok(VelocityParams::default())
        }
        fn set_velocity_params(&mut self, _params: VelocityParams) -> Result<(), StageError> {
            Ok(())
        }
        fn homing_velocity(&self) -> Result<f64, StageError> {
            Ok(1.0)
        }
        fn set_homing_velocity(&mut self, _velocity: f64) -> Result<(), StageError> {
            Ok(())
        }
        fn status(&self) -> Result<MotorStatus, StageError> {
            Ok(MotorStatus::default())
        }
        fn home(&mut self, _channel: u32) -> Result<(), StageError> {
            self.position = 0.0;
            Ok(())
        }
        fn stop(&mut self, _channel: u32) -> Result<(), StageError> {
            Ok(())
        }
        fn stop_immediate(&mut self) -> Result<(), StageError> {
            Ok(())
        }
        fn move_to(&mut self, position: f64, _channel: u32) -> Result<(), StageError> {
            self.position = position;
            Ok(())
        }
        fn set_move_relative_distance(&mut self, _distance: f64) -> Result<(), StageError> {
            Ok(())
        }
        fn move_relative(&mut self, _direction: MotorDirection) -> Result<(), StageError> {
            Ok(())
        }
        fn move_continuous_at_velocity(
            &mut self,
            _direction: MotorDirection,
            _speed: f64,
        ) -> Result<(), StageError> {
            Ok(())
        }
    }

    #[test]
    fn mock_handle_move_and_read_back() {
        let mut handle = MockHandle { position: 4.0 };
        handle.move_to(3.0, 0).unwrap();
        assert!((handle.position().unwrap() - 3.0).abs() < f64::EPSILON);
        handle.home(0).unwrap();
        assert!(handle.position().unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn front_panel_defaults_to_unsupported() {
        let mut handle = MockHandle { position: 0.0 };
        assert!(matches!(
            handle.mmi_params(),
            Err(StageError::Unsupported {
                family: DeviceFamily::TCubeDcServo,
                ..
            })
        ));
        assert!(handle.set_mmi_params(MmiParams::default()).is_err());
    }
}
