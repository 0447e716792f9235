//! [`AxisRegistry`] – serial-number keyed axis registry and intent dispatcher.
//!
//! Every configured stage is registered as a boxed [`Axis`].  A
//! [`MotionIntent`] names its target by serial number; the registry resolves
//! it and calls the matching operation.
//!
//! # Emergency stop
//!
//! [`MotionIntent::EmergencyStop`] calls `stop_immediate` on every registered
//! axis, even when some of them fail.  Legacy axes have no immediate stop and
//! are skipped.

use std::collections::HashMap;

use stagectl_types::{MotionIntent, MoveOutcome, StageError};
use tracing::{error, info, warn};

use crate::axis::Axis;

/// Registry of every configured axis.
#[derive(Default)]
pub struct AxisRegistry {
    axes: HashMap<String, Box<dyn Axis>>,
}

impl AxisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an axis.  Any axis previously registered under the same serial
    /// number is replaced.
    pub fn register(&mut self, axis: Box<dyn Axis>) {
        self.axes.insert(axis.serial_number().to_string(), axis);
    }

    pub fn get(&self, serial: &str) -> Option<&dyn Axis> {
        self.axes.get(serial).map(|axis| axis.as_ref())
    }

    pub fn get_mut(&mut self, serial: &str) -> Option<&mut (dyn Axis + 'static)> {
        self.axes.get_mut(serial).map(|axis| axis.as_mut())
    }

    /// Lookup that reports a missing axis as a hardware fault.
    pub fn axis_mut(&mut self, serial: &str) -> Result<&mut (dyn Axis + 'static), StageError> {
        self.get_mut(serial).ok_or_else(|| StageError::HardwareFault {
            component: serial.to_string(),
            details: format!("axis '{serial}' is not registered"),
        })
    }

    /// Registered serial numbers, sorted.
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.axes.keys().cloned().collect();
        serials.sort();
        serials
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Dispatch a [`MotionIntent`] to the addressed axis.
    ///
    /// Commands without a range guard (`Home`, `Stop`, `EmergencyStop`) report
    /// [`MoveOutcome::Dispatched`] on success.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::HardwareFault`] when the target axis is not
    /// registered, or the error of the underlying axis call.
    pub fn dispatch(&mut self, intent: MotionIntent) -> Result<MoveOutcome, StageError> {
        match intent {
            MotionIntent::Home { serial } => {
                self.axis_mut(&serial)?.home()?;
                Ok(MoveOutcome::Dispatched)
            }
            MotionIntent::MoveAbsolute { serial, target } => {
                self.axis_mut(&serial)?.move_absolute(target)
            }
            MotionIntent::MoveRelative { serial, delta } => {
                self.axis_mut(&serial)?.move_relative(delta)
            }
            MotionIntent::Jog { serial, speed } => self.axis_mut(&serial)?.jog(speed),
            MotionIntent::Stop { serial } => {
                self.axis_mut(&serial)?.stop()?;
                Ok(MoveOutcome::Dispatched)
            }
            MotionIntent::EmergencyStop => {
                self.emergency_stop()?;
                Ok(MoveOutcome::Dispatched)
            }
        }
    }

    /// Halt every axis immediately.  Returns the first failure after all axes
    /// have been attempted.
    pub fn emergency_stop(&mut self) -> Result<(), StageError> {
        warn!(axes = self.axes.len(), "emergency stop");
        let mut first_error = None;
        for (serial, axis) in self.axes.iter_mut() {
            match axis.stop_immediate() {
                Ok(()) => {}
                Err(StageError::Unsupported { .. }) => {
                    warn!(serial = %serial, "axis has no immediate stop, skipped");
                }
                Err(err) => {
                    error!(serial = %serial, error = %err, "emergency stop failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Disable and disconnect every axis, logging failures.
    pub fn shutdown(&mut self) {
        for (serial, axis) in self.axes.iter_mut() {
            if let Err(err) = axis.disable() {
                warn!(serial = %serial, error = %err, "disable failed during shutdown");
            }
            if let Err(err) = axis.disconnect() {
                warn!(serial = %serial, error = %err, "disconnect failed during shutdown");
            }
        }
        info!("all axes released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stagectl_types::{DeviceFamily, MotorType};

    use crate::legacy::LegacyMotor;
    use crate::runtime::KinesisRuntime;
    use crate::sim::{HandleCall, SimBackend, SimLegacyControl};

    // ------------------------------------------------------------------
    // Fixture
    // ------------------------------------------------------------------

    struct Rig {
        registry: AxisRegistry,
        backend: Arc<SimBackend>,
    }

    fn rig() -> Rig {
        let backend = Arc::new(SimBackend::new());
        let runtime = KinesisRuntime::simulated(backend.clone()).unwrap();
        let mut registry = AxisRegistry::new();
        for (family, serial, motor_type) in [
            (DeviceFamily::TCubeStepper, "80864431", MotorType::Translation),
            (DeviceFamily::KCubeDcServo, "27502878", MotorType::Rotation),
        ] {
            let mut motor = runtime.motor(family, serial, motor_type).unwrap();
            motor.create().unwrap();
            motor.enable().unwrap();
            registry.register(Box::new(motor));
        }
        Rig { registry, backend }
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn dispatch_move_absolute() {
        let mut rig = rig();
        let outcome = rig
            .registry
            .dispatch(MotionIntent::MoveAbsolute {
                serial: "80864431".to_string(),
                target: 12.0,
            })
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Dispatched);
        let pos = rig.registry.get("80864431").unwrap().position().unwrap();
        assert!((pos - 12.0).abs() < 1e-9);
    }

    #[test]
    fn dispatch_returns_rejection_for_out_of_range_target() {
        let mut rig = rig();
        let outcome = rig
            .registry
            .dispatch(MotionIntent::MoveAbsolute {
                serial: "27502878".to_string(),
                target: 11.9,
            })
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Rejected(_)));
    }

    #[test]
    fn dispatch_rejects_non_finite_jog_speed() {
        let mut rig = rig();
        let handle = rig.backend.handle("80864431").unwrap();
        handle.set_position(5.0);
        handle.clear_calls();

        let outcome = rig
            .registry
            .dispatch(MotionIntent::Jog {
                serial: "80864431".to_string(),
                speed: f64::NAN,
            })
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Rejected(_)));
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn dispatch_home_and_stop() {
        let mut rig = rig();
        rig.registry
            .dispatch(MotionIntent::Home {
                serial: "27502878".to_string(),
            })
            .unwrap();
        assert!(rig.registry.get("27502878").unwrap().is_homed().unwrap());

        rig.registry
            .dispatch(MotionIntent::Stop {
                serial: "27502878".to_string(),
            })
            .unwrap();
        let probe = rig.backend.handle("27502878").unwrap();
        assert!(probe.calls().contains(&HandleCall::Stop(0)));
    }

    #[test]
    fn dispatch_missing_axis_returns_error() {
        let mut rig = rig();
        let result = rig.registry.dispatch(MotionIntent::Jog {
            serial: "00000000".to_string(),
            speed: 1.0,
        });
        assert!(matches!(result, Err(StageError::HardwareFault { .. })));
    }

    #[test]
    fn emergency_stop_halts_every_axis() {
        let mut rig = rig();
        for serial in ["80864431", "27502878"] {
            rig.registry
                .dispatch(MotionIntent::MoveRelative {
                    serial: serial.to_string(),
                    delta: 1.0,
                })
                .unwrap();
            rig.registry
                .dispatch(MotionIntent::Jog {
                    serial: serial.to_string(),
                    speed: 0.5,
                })
                .unwrap();
        }

        rig.registry.dispatch(MotionIntent::EmergencyStop).unwrap();
        for serial in rig.registry.serials() {
            assert!(!rig.registry.get(&serial).unwrap().is_moving().unwrap());
        }
    }

    #[test]
    fn emergency_stop_continues_past_failures() {
        let mut rig = rig();
        rig.backend
            .handle("80864431")
            .unwrap()
            .inject_fault("stop_immediate");

        let result = rig.registry.emergency_stop();
        assert!(matches!(result, Err(StageError::HardwareFault { .. })));
        let other = rig.backend.handle("27502878").unwrap();
        assert!(other.calls().contains(&HandleCall::StopImmediate));
    }

    #[test]
    fn emergency_stop_skips_legacy_axes() {
        let mut rig = rig();
        let mut legacy = LegacyMotor::new("83000001");
        legacy
            .bind_control(Box::new(SimLegacyControl::new()))
            .unwrap();
        rig.registry.register(Box::new(legacy));

        rig.registry.emergency_stop().unwrap();
        assert_eq!(rig.registry.len(), 3);
    }

    #[test]
    fn re_registering_replaces_axis() {
        let mut rig = rig();
        let runtime = KinesisRuntime::simulated(Arc::new(SimBackend::new())).unwrap();
        let motor = runtime
            .motor(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
            .unwrap();
        rig.registry.register(Box::new(motor));

        assert_eq!(rig.registry.len(), 2);
        assert!(matches!(
            rig.registry.get("80864431").unwrap().position(),
            Err(StageError::NotCreated { .. })
        ));
    }

    #[test]
    fn shutdown_releases_every_axis() {
        let mut rig = rig();
        rig.registry.shutdown();
        for serial in ["80864431", "27502878"] {
            let probe = rig.backend.handle(serial).unwrap();
            assert!(!probe.is_connected());
            assert!(!probe.is_enabled());
        }
    }
}
