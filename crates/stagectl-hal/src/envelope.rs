//! [`TravelEnvelope`] – range guard for commanded positions.
//!
//! Every absolute move, relative move, and jog is checked here before
//! anything is sent to the device.  The envelope is the axis travel range
//! shrunk by a safety buffer at both ends:
//!
//! ```text
//! buffer ≤ target ≤ max_travel − buffer
//! ```
//!
//! Violations produce a [`Rejection`]; targets are never clamped.
//!
//! # Example
//!
//! ```
//! use stagectl_hal::envelope::TravelEnvelope;
//! use stagectl_types::MotorType;
//!
//! let env = TravelEnvelope::for_motor(MotorType::Translation, 0.5).unwrap();
//! assert!(env.check_target(24.4).is_ok());
//! assert!(env.check_target(24.6).is_err());
//! ```

use stagectl_types::{MotorDirection, MotorType, Rejection, StageError};

/// Margin kept clear at both ends of the travel by default.
pub const DEFAULT_SAFETY_BUFFER: f64 = 0.5;

/// Safe travel range of a single axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelEnvelope {
    max_travel: f64,
    buffer: f64,
}

impl TravelEnvelope {
    /// # Errors
    ///
    /// Returns [`StageError::Config`] unless `buffer` is finite, non-negative
    /// and leaves a non-empty range, i.e. `0 ≤ buffer < max_travel / 2`.
    pub fn new(max_travel: f64, buffer: f64) -> Result<Self, StageError> {
        if !max_travel.is_finite() || max_travel <= 0.0 {
            return Err(StageError::Config(format!(
                "travel must be a positive length, got {max_travel}"
            )));
        }
        if !buffer.is_finite() || buffer < 0.0 || buffer >= max_travel / 2.0 {
            return Err(StageError::Config(format!(
                "safety buffer {buffer} is outside [0, {}) for a travel of {max_travel}",
                max_travel / 2.0
            )));
        }
        Ok(Self { max_travel, buffer })
    }

    /// Envelope for the travel of `motor_type` with the given safety buffer.
    pub fn for_motor(motor_type: MotorType, buffer: f64) -> Result<Self, StageError> {
        Self::new(motor_type.max_travel(), buffer)
    }

    /// Envelope for `motor_type` with [`DEFAULT_SAFETY_BUFFER`].
    pub fn standard(motor_type: MotorType) -> Self {
        Self {
            max_travel: motor_type.max_travel(),
            buffer: DEFAULT_SAFETY_BUFFER,
        }
    }

    /// Full mechanical travel in real-world units.
    pub fn max_travel(&self) -> f64 {
        self.max_travel
    }

    /// Margin kept clear at both ends of the travel.
    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    /// Lowest allowed position (inclusive).
    pub fn min(&self) -> f64 {
        self.buffer
    }

    /// Highest allowed position (inclusive).
    pub fn max(&self) -> f64 {
        self.max_travel - self.buffer
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.min() && position <= self.max()
    }

    /// Validate an absolute target position.
    pub fn check_target(&self, target: f64) -> Result<(), Rejection> {
        if target.is_finite() && self.contains(target) {
            Ok(())
        } else {
            Err(self.reject(target))
        }
    }

    /// Validate a jog speed.  NaN and infinite speeds have no usable
    /// direction or magnitude.
    pub fn check_speed(&self, speed: f64) -> Result<(), Rejection> {
        if speed.is_finite() {
            Ok(())
        } else {
            Err(self.reject(speed))
        }
    }

    /// Validate continuing a jog from `position` in `direction`.
    ///
    /// Only the edge ahead of the axis matters: an axis parked inside the
    /// lower buffer may still jog forward, and vice versa.
    pub fn check_jog(&self, position: f64, direction: MotorDirection) -> Result<(), Rejection> {
        let past_edge = match direction {
            MotorDirection::Backward => position < self.min(),
            MotorDirection::Forward => position > self.max(),
        };
        if past_edge {
            Err(self.reject(position))
        } else {
            Ok(())
        }
    }

    fn reject(&self, target: f64) -> Rejection {
        Rejection {
            target,
            min: self.min(),
            max: self.max(),
        }
    }
}
