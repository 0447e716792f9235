//! [`LegacyMotor`] – single-axis APT controller driven through the `MGMotor`
//! ActiveX control.
//!
//! The control object is created by the hosting UI toolkit and handed over
//! with [`LegacyMotor::bind_control`]; this module only programs it.  Legacy
//! axes run in a reduced-capability mode: enable, disable, home, position
//! read, and absolute/relative moves.  There is no velocity profile, no jog,
//! and no travel envelope check.

use stagectl_types::{DeviceFamily, MoveOutcome, StageError};
use tracing::info;

use crate::motor::contain;

/// Programmatic id of the APT motor ActiveX control.
pub const MG_MOTOR_PROG_ID: &str = "MGMOTOR.MGMotorCtrl.1";

/// Bit of the raw status word that reports a completed homing run.
// TODO: verify against a homed controller on the bench.
pub const HOMED_BIT: u32 = 10;

const CHANNEL: u32 = 0;

/// Method surface of the `MGMotor` ActiveX control.
pub trait LegacyControl: Send {
    /// Select the ActiveX control class (`setControl`).
    fn set_control(&mut self, prog_id: &str) -> Result<(), StageError>;

    /// Set the `HWSerialNum` property.
    fn set_hw_serial_num(&mut self, serial: &str) -> Result<(), StageError>;

    fn start_ctrl(&mut self) -> Result<(), StageError>;

    fn stop_ctrl(&mut self) -> Result<(), StageError>;

    /// Raw status word (`GetStatusBits_Bits`).
    fn status_bits(&self, channel: u32) -> Result<u32, StageError>;

    fn move_home(&mut self, channel: u32, wait: bool) -> Result<(), StageError>;

    /// `GetPosition_Position`.
    fn position(&self, channel: u32) -> Result<f64, StageError>;

    fn set_rel_move_dist(&mut self, channel: u32, distance: f64) -> Result<(), StageError>;

    fn move_relative(&mut self, channel: u32, wait: bool) -> Result<(), StageError>;

    fn set_abs_move_pos(&mut self, channel: u32, position: f64) -> Result<(), StageError>;

    fn move_absolute(&mut self, channel: u32, wait: bool) -> Result<(), StageError>;
}

/// Read the homed flag out of a raw status word.
pub fn homed_from_status(bits: u32) -> bool {
    (bits >> HOMED_BIT) & 1 == 1
}

/// The control accepts distances with two decimals.
fn control_units(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// APT axis bound to a host-supplied ActiveX control.
pub struct LegacyMotor {
    serial: String,
    control: Option<Box<dyn LegacyControl>>,
}

impl LegacyMotor {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            control: None,
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    /// Configure `control` as an `MGMotor` for this serial number and bind it.
    pub fn bind_control(&mut self, mut control: Box<dyn LegacyControl>) -> Result<(), StageError> {
        control.set_control(MG_MOTOR_PROG_ID)?;
        control.set_hw_serial_num(&self.serial)?;
        self.control = Some(control);
        info!(serial = %self.serial, "ActiveX control bound");
        Ok(())
    }

    /// Drop the bound control.  The host still owns the ActiveX object.
    pub fn release(&mut self) -> Result<(), StageError> {
        self.control.take().ok_or_else(|| StageError::NotCreated {
            serial: self.serial.clone(),
        })?;
        info!(serial = %self.serial, "ActiveX control released");
        Ok(())
    }

    /// Legacy controls are bound by the host, so this only checks the binding.
    pub fn create(&mut self) -> Result<(), StageError> {
        self.control().map(|_| ())
    }

    fn control(&self) -> Result<&dyn LegacyControl, StageError> {
        self.control
            .as_deref()
            .ok_or_else(|| StageError::NotCreated {
                serial: self.serial.clone(),
            })
    }

    fn control_mut(&mut self) -> Result<&mut Box<dyn LegacyControl>, StageError> {
        self.control.as_mut().ok_or_else(|| StageError::NotCreated {
            serial: self.serial.clone(),
        })
    }

    pub fn enable(&mut self) -> Result<(), StageError> {
        self.control_mut()?.start_ctrl()
    }

    pub fn disable(&mut self) -> Result<(), StageError> {
        self.control_mut()?.stop_ctrl()
    }

    pub fn is_homed(&self) -> Result<bool, StageError> {
        Ok(homed_from_status(self.control()?.status_bits(CHANNEL)?))
    }

    pub fn home(&mut self) -> Result<(), StageError> {
        self.control_mut()?.move_home(CHANNEL, false)
    }

    pub fn position(&self) -> Result<f64, StageError> {
        self.control()?.position(CHANNEL)
    }

    /// Move by `distance` without any envelope check.
    pub fn move_relative(&mut self, distance: f64) -> Result<MoveOutcome, StageError> {
        let serial = self.serial.clone();
        let control = self.control_mut()?;
        control.set_rel_move_dist(CHANNEL, control_units(distance))?;
        Ok(contain(&serial, "MoveRelative", control.move_relative(CHANNEL, false)))
    }

    /// Move to `position` without any envelope check.
    pub fn move_absolute(&mut self, position: f64) -> Result<MoveOutcome, StageError> {
        let serial = self.serial.clone();
        let control = self.control_mut()?;
        control.set_abs_move_pos(CHANNEL, control_units(position))?;
        Ok(contain(&serial, "MoveAbsolute", control.move_absolute(CHANNEL, false)))
    }

    pub fn family(&self) -> DeviceFamily {
        DeviceFamily::LegacyActiveX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{LegacyCall, SimLegacyControl};

    fn bound(serial: &str) -> (LegacyMotor, SimLegacyControl) {
        let probe = SimLegacyControl::new();
        let mut motor = LegacyMotor::new(serial);
        motor.bind_control(Box::new(probe.clone())).unwrap();
        (motor, probe)
    }

    #[test]
    fn unbound_motor_reports_not_created() {
        let mut motor = LegacyMotor::new("83000001");
        assert!(matches!(
            motor.create(),
            Err(StageError::NotCreated { .. })
        ));
        assert!(matches!(
            motor.move_absolute(1.0),
            Err(StageError::NotCreated { .. })
        ));
    }

    #[test]
    fn binding_configures_prog_id_and_serial() {
        let (mut motor, probe) = bound("83000001");
        motor.create().unwrap();
        motor.enable().unwrap();
        assert_eq!(
            probe.calls(),
            vec![
                LegacyCall::SetControl(MG_MOTOR_PROG_ID.to_string()),
                LegacyCall::SetHwSerialNum("83000001".to_string()),
                LegacyCall::StartCtrl,
            ]
        );
    }

    #[test]
    fn homed_flag_is_bit_ten() {
        assert!(homed_from_status(1 << 10));
        assert!(homed_from_status(0xFFFF_FFFF));
        assert!(!homed_from_status(1 << 9));
        assert!(!homed_from_status(1 << 11));
    }

    #[test]
    fn home_then_is_homed() {
        let (mut motor, probe) = bound("83000001");
        assert!(!motor.is_homed().unwrap());
        motor.home().unwrap();
        assert!(motor.is_homed().unwrap());
        assert!(probe.calls().contains(&LegacyCall::MoveHome(0, false)));
    }

    #[test]
    fn moves_are_not_range_checked_and_rounded() {
        let (mut motor, probe) = bound("83000001");
        let outcome = motor.move_absolute(40.123).unwrap();
        assert!(outcome.is_dispatched());
        assert!((motor.position().unwrap() - 40.12).abs() < 1e-9);

        motor.move_relative(-1.3).unwrap();
        assert!((probe.position() - 38.82).abs() < 1e-9);
        assert!(probe.calls().contains(&LegacyCall::SetRelMoveDist(0, -1.3)));
    }
}
