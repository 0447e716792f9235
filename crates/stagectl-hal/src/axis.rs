//! [`Axis`] – common surface of Kinesis adapters and legacy APT motors.
//!
//! The [`AxisRegistry`][crate::registry::AxisRegistry] only talks to this
//! trait.  Operations a device family cannot perform (jog and velocity
//! profiles on the legacy ActiveX path, for instance) default to
//! [`StageError::Unsupported`].

use stagectl_types::{DeviceFamily, MoveOutcome, StageError, VelocityParams};

use crate::legacy::LegacyMotor;
use crate::motor::MotorAdapter;

fn unsupported<T>(family: DeviceFamily, operation: &str) -> Result<T, StageError> {
    Err(StageError::Unsupported {
        family,
        operation: operation.to_string(),
    })
}

/// A single motorized axis addressed by its controller serial number.
pub trait Axis: Send {
    fn serial_number(&self) -> &str;

    fn family(&self) -> DeviceFamily;

    /// Bind the vendor object for this axis.
    fn create(&mut self) -> Result<(), StageError>;

    /// Bring the axis to the ready state.
    fn enable(&mut self) -> Result<(), StageError>;

    fn disable(&mut self) -> Result<(), StageError>;

    /// Release the vendor object.
    fn disconnect(&mut self) -> Result<(), StageError>;

    fn is_homed(&self) -> Result<bool, StageError>;

    fn home(&mut self) -> Result<(), StageError>;

    fn position(&self) -> Result<f64, StageError>;

    fn move_absolute(&mut self, target: f64) -> Result<MoveOutcome, StageError>;

    fn move_relative(&mut self, delta: f64) -> Result<MoveOutcome, StageError>;

    fn is_moving(&self) -> Result<bool, StageError> {
        unsupported(self.family(), "is_moving")
    }

    /// Continuous motion at a signed speed.
    fn jog(&mut self, _speed: f64) -> Result<MoveOutcome, StageError> {
        unsupported(self.family(), "jog")
    }

    fn stop(&mut self) -> Result<(), StageError> {
        unsupported(self.family(), "stop")
    }

    fn stop_immediate(&mut self) -> Result<(), StageError> {
        unsupported(self.family(), "stop_immediate")
    }

    fn set_velocity(
        &mut self,
        _max_velocity: Option<f64>,
        _acceleration: Option<f64>,
    ) -> Result<VelocityParams, StageError> {
        unsupported(self.family(), "set_velocity")
    }

    fn reset(&mut self) -> Result<(), StageError> {
        unsupported(self.family(), "reset")
    }
}

impl Axis for MotorAdapter {
    fn serial_number(&self) -> &str {
        MotorAdapter::serial_number(self)
    }

    fn family(&self) -> DeviceFamily {
        MotorAdapter::family(self)
    }

    fn create(&mut self) -> Result<(), StageError> {
        MotorAdapter::create(self)
    }

    fn enable(&mut self) -> Result<(), StageError> {
        MotorAdapter::enable(self)
    }

    fn disable(&mut self) -> Result<(), StageError> {
        MotorAdapter::disable(self)
    }

    fn disconnect(&mut self) -> Result<(), StageError> {
        MotorAdapter::disconnect(self)
    }

    fn is_homed(&self) -> Result<bool, StageError> {
        MotorAdapter::is_homed(self)
    }

    fn home(&mut self) -> Result<(), StageError> {
        MotorAdapter::home(self)
    }

    fn position(&self) -> Result<f64, StageError> {
        MotorAdapter::position(self)
    }

    fn move_absolute(&mut self, target: f64) -> Result<MoveOutcome, StageError> {
        MotorAdapter::move_absolute(self, target)
    }

    fn move_relative(&mut self, delta: f64) -> Result<MoveOutcome, StageError> {
        MotorAdapter::move_relative(self, delta)
    }

    fn is_moving(&self) -> Result<bool, StageError> {
        MotorAdapter::is_moving(self)
    }

    fn jog(&mut self, speed: f64) -> Result<MoveOutcome, StageError> {
        MotorAdapter::jog(self, speed)
    }

    fn stop(&mut self) -> Result<(), StageError> {
        MotorAdapter::stop(self)
    }

    fn stop_immediate(&mut self) -> Result<(), StageError> {
        MotorAdapter::stop_immediate(self)
    }

    fn set_velocity(
        &mut self,
        max_velocity: Option<f64>,
        acceleration: Option<f64>,
    ) -> Result<VelocityParams, StageError> {
        MotorAdapter::set_velocity(self, max_velocity, acceleration)
    }

    fn reset(&mut self) -> Result<(), StageError> {
        MotorAdapter::reset(self)
    }
}

impl Axis for LegacyMotor {
    fn serial_number(&self) -> &str {
        LegacyMotor::serial_number(self)
    }

    fn family(&self) -> DeviceFamily {
        LegacyMotor::family(self)
    }

    fn create(&mut self) -> Result<(), StageError> {
        LegacyMotor::create(self)
    }

    fn enable(&mut self) -> Result<(), StageError> {
        LegacyMotor::enable(self)
    }

    fn disable(&mut self) -> Result<(), StageError> {
        LegacyMotor::disable(self)
    }

    fn disconnect(&mut self) -> Result<(), StageError> {
        LegacyMotor::release(self)
    }

    fn is_homed(&self) -> Result<bool, StageError> {
        LegacyMotor::is_homed(self)
    }

    fn home(&mut self) -> Result<(), StageError> {
        LegacyMotor::home(self)
    }

    fn position(&self) -> Result<f64, StageError> {
        LegacyMotor::position(self)
    }

    fn move_absolute(&mut self, target: f64) -> Result<MoveOutcome, StageError> {
        LegacyMotor::move_absolute(self, target)
    }

    fn move_relative(&mut self, delta: f64) -> Result<MoveOutcome, StageError> {
        LegacyMotor::move_relative(self, delta)
    }
}
