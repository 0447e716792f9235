//! [`SimRegistry`] – builds an [`AxisRegistry`] over simulated controllers.
//!
//! Every Kinesis axis is backed by a [`SimHandle`][crate::sim::SimHandle]
//! opened through a shared [`SimBackend`], every legacy axis by a
//! [`SimLegacyControl`].  The resulting registry runs the full command path
//! (envelope checks, enable handshake, dispatch) without hardware.
//!
//! This is a fixture for tests and doc examples: it fails on the first axis
//! that does not come up.  The `stagectl` binary brings up its simulated
//! axes from the config file instead, keeping failed axes registered for
//! `/reset`.
//!
//! # Example
//!
//! ```rust
//! use stagectl_hal::sim_registry::SimRegistry;
//! use stagectl_types::{DeviceFamily, MotionIntent, MotorType};
//!
//! let mut sim = SimRegistry::builder()
//!     .with_kinesis_axis(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
//!     .with_legacy_axis("83000001")
//!     .build()
//!     .unwrap();
//!
//! sim.registry
//!     .dispatch(MotionIntent::MoveAbsolute {
//!         serial: "80864431".to_string(),
//!         target: 10.0,
//!     })
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

use stagectl_types::{DeviceFamily, MotorType, StageError, VelocityParams};

use crate::legacy::LegacyMotor;
use crate::motor::{DEFAULT_SAFETY_BUFFER, EnableTiming};
use crate::registry::AxisRegistry;
use crate::runtime::KinesisRuntime;
use crate::sim::{SimBackend, SimLegacyControl};

struct PlannedAxis {
    family: DeviceFamily,
    serial: String,
    motor_type: MotorType,
}

/// Builder for a fully simulated [`AxisRegistry`].
pub struct SimRegistry {
    kinesis: Vec<PlannedAxis>,
    legacy: Vec<String>,
    profile: VelocityParams,
    safety_buffer: f64,
    timing: EnableTiming,
}

impl Default for SimRegistry {
    fn default() -> Self {
        Self {
            kinesis: Vec::new(),
            legacy: Vec::new(),
            profile: VelocityParams::default(),
            safety_buffer: DEFAULT_SAFETY_BUFFER,
            timing: EnableTiming {
                settle_delay: Duration::ZERO,
                ..EnableTiming::default()
            },
        }
    }
}

/// A built simulation: the registry plus the backend behind it, so callers
/// can inspect or fault the simulated controllers.
pub struct SimRig {
    pub registry: AxisRegistry,
    pub backend: Arc<SimBackend>,
}

impl SimRegistry {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Add a Kinesis axis of `family`.
    pub fn with_kinesis_axis(
        mut self,
        family: DeviceFamily,
        serial: impl Into<String>,
        motor_type: MotorType,
    ) -> Self {
        self.kinesis.push(PlannedAxis {
            family,
            serial: serial.into(),
            motor_type,
        });
        self
    }

    /// Add a legacy APT axis bound to a simulated ActiveX control.
    pub fn with_legacy_axis(mut self, serial: impl Into<String>) -> Self {
        self.legacy.push(serial.into());
        self
    }

    pub fn with_profile(mut self, profile: VelocityParams) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_safety_buffer(mut self, buffer: f64) -> Self {
        self.safety_buffer = buffer;
        self
    }

    pub fn with_timing(mut self, timing: EnableTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Create and enable every axis, then register it.
    ///
    /// # Errors
    ///
    /// Fails on the first axis that cannot be created or enabled, e.g. a
    /// legacy family requested through [`with_kinesis_axis`][Self::with_kinesis_axis],
    /// or with [`StageError::Config`] for an unusable safety buffer.
    pub fn build(self) -> Result<SimRig, StageError> {
        let backend = Arc::new(SimBackend::new());
        let runtime = KinesisRuntime::simulated(backend.clone())?;
        let mut registry = AxisRegistry::new();

        for planned in self.kinesis {
            let mut motor = runtime
                .motor(planned.family, planned.serial, planned.motor_type)?
                .with_profile(self.profile)
                .with_safety_buffer(self.safety_buffer)?
                .with_timing(self.timing);
            motor.create()?;
            motor.enable()?;
            registry.register(Box::new(motor));
        }

        for serial in self.legacy {
            let mut motor = LegacyMotor::new(serial);
            motor.bind_control(Box::new(SimLegacyControl::new()))?;
            motor.create()?;
            motor.enable()?;
            registry.register(Box::new(motor));
        }

        Ok(SimRig { registry, backend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagectl_types::{MotionIntent, MoveOutcome};

    #[test]
    fn built_axes_are_enabled() {
        let rig = SimRegistry::builder()
            .with_kinesis_axis(DeviceFamily::TCubeDcServo, "83854669", MotorType::Translation)
            .with_kinesis_axis(DeviceFamily::KCubeDcServo, "27502878", MotorType::Rotation)
            .build()
            .unwrap();

        assert_eq!(rig.registry.serials(), vec!["27502878", "83854669"]);
        for serial in ["83854669", "27502878"] {
            let probe = rig.backend.handle(serial).unwrap();
            assert!(probe.is_connected());
            assert!(probe.is_enabled());
        }
    }

    #[test]
    fn safety_buffer_applies_to_every_axis() {
        let mut rig = SimRegistry::builder()
            .with_kinesis_axis(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
            .with_safety_buffer(2.0)
            .build()
            .unwrap();

        let outcome = rig
            .registry
            .dispatch(MotionIntent::MoveAbsolute {
                serial: "80864431".to_string(),
                target: 23.5,
            })
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Rejected(r) if (r.max - 23.0).abs() < 1e-9));
    }

    #[test]
    fn negative_safety_buffer_fails_build() {
        let result = SimRegistry::builder()
            .with_kinesis_axis(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
            .with_safety_buffer(-1.0)
            .build();
        assert!(matches!(result, Err(StageError::Config(_))));
    }

    #[test]
    fn legacy_axis_moves_without_envelope() {
        let mut rig = SimRegistry::builder()
            .with_legacy_axis("83000001")
            .build()
            .unwrap();

        let outcome = rig
            .registry
            .dispatch(MotionIntent::MoveAbsolute {
                serial: "83000001".to_string(),
                target: 40.0,
            })
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Dispatched);
    }

    #[test]
    fn legacy_family_cannot_be_built_as_kinesis_axis() {
        let result = SimRegistry::builder()
            .with_kinesis_axis(DeviceFamily::LegacyActiveX, "83000001", MotorType::Translation)
            .build();
        assert!(matches!(result, Err(StageError::Unsupported { .. })));
    }
}
