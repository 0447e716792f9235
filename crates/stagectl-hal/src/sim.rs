//! In-process simulation of vendor handles for testing without hardware.
//!
//! - [`SimHandle`] implements [`DeviceHandle`] and records every command in a
//!   call log.  Clones share state, so a test can keep one clone as a probe
//!   while the adapter owns another.
//! - [`SimBackend`] implements [`VendorBackend`] and hands out `SimHandle`s.
//! - [`SimLegacyControl`] implements [`LegacyControl`] for the ActiveX path.
//!
//! Kinematics are instantaneous: `move_to` lands on the target at once,
//! `home` zeroes the position and sets the homed flag, continuous moves set the
//! moving flag until stopped.  Faults are injected by operation name (see
//! [`HandleCall::name`]); a faulted call is still logged before it fails.
//!
//! # Example
//!
//! ```rust
//! use stagectl_hal::handle::DeviceHandle;
//! use stagectl_hal::sim::{HandleCall, SimHandle};
//! use stagectl_types::DeviceFamily;
//!
//! let probe = SimHandle::new(DeviceFamily::TCubeDcServo, "83854669");
//! let mut handle = probe.clone();
//! handle.move_to(3.0, 0).unwrap();
//!
//! assert_eq!(probe.calls(), vec![HandleCall::MoveTo(3.0, 0)]);
//! assert_eq!(probe.position(), 3.0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stagectl_types::{
    DeviceFamily, DeviceInfo, JoystickMode, MmiParams, MotorDirection, MotorStatus, StageError,
    VelocityParams,
};

use crate::handle::DeviceHandle;
use crate::legacy::{HOMED_BIT, LegacyControl};
use crate::runtime::VendorBackend;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Kinesis handle
// ────────────────────────────────────────────────────────────────────────────

/// A command received by a [`SimHandle`].  Reads are not logged.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleCall {
    Connect(String),
    Disconnect,
    EnableDevice,
    DisableDevice,
    WaitForSettingsInitialized(Duration),
    StartPolling(Duration),
    LoadMotorConfiguration(String),
    SetVelocityParams(VelocityParams),
    SetHomingVelocity(f64),
    Home(u32),
    Stop(u32),
    StopImmediate,
    MoveTo(f64, u32),
    SetMoveRelativeDistance(f64),
    MoveRelative(MotorDirection),
    MoveContinuousAtVelocity(MotorDirection, f64),
    SetMmiParams(MmiParams),
}

impl HandleCall {
    /// Operation name used for fault injection.
    pub fn name(&self) -> &'static str {
        match self {
            HandleCall::Connect(_) => "connect",
            HandleCall::Disconnect => "disconnect",
            HandleCall::EnableDevice => "enable_device",
            HandleCall::DisableDevice => "disable_device",
            HandleCall::WaitForSettingsInitialized(_) => "wait_for_settings_initialized",
            HandleCall::StartPolling(_) => "start_polling",
            HandleCall::LoadMotorConfiguration(_) => "load_motor_configuration",
            HandleCall::SetVelocityParams(_) => "set_velocity_params",
            HandleCall::SetHomingVelocity(_) => "set_homing_velocity",
            HandleCall::Home(_) => "home",
            HandleCall::Stop(_) => "stop",
            HandleCall::StopImmediate => "stop_immediate",
            HandleCall::MoveTo(..) => "move_to",
            HandleCall::SetMoveRelativeDistance(_) => "set_move_relative_distance",
            HandleCall::MoveRelative(_) => "move_relative",
            HandleCall::MoveContinuousAtVelocity(..) => "move_continuous_at_velocity",
            HandleCall::SetMmiParams(_) => "set_mmi_params",
        }
    }
}

#[derive(Debug)]
struct SimState {
    family: DeviceFamily,
    serial: String,
    calls: Vec<HandleCall>,
    faults: HashSet<String>,
    position: f64,
    velocity: VelocityParams,
    homing_velocity: f64,
    status: MotorStatus,
    connected: bool,
    enabled: bool,
    polling: Option<Duration>,
    settings_initialized: bool,
    initialize_on_wait: bool,
    relative_distance: f64,
    mmi: Option<MmiParams>,
}

/// Simulated Kinesis controller.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Create a connected-ready simulator parked at position 0.
    ///
    /// K-Cube simulators start with front panel settings that expose the
    /// current `joystick_mode` property name.
    pub fn new(family: DeviceFamily, serial: impl Into<String>) -> Self {
        let mmi = family.has_front_panel().then(|| MmiParams {
            wheel_mode: None,
            joystick_mode: Some(JoystickMode::Jog),
            display_intensity: 60,
            display_timeout: 10,
        });
        Self {
            state: Arc::new(Mutex::new(SimState {
                family,
                serial: serial.into(),
                calls: Vec::new(),
                faults: HashSet::new(),
                position: 0.0,
                velocity: VelocityParams::default(),
                homing_velocity: 1.0,
                status: MotorStatus::default(),
                connected: false,
                enabled: false,
                polling: None,
                settings_initialized: true,
                initialize_on_wait: true,
                relative_distance: 0.0,
                mmi,
            })),
        }
    }

    /// Every command received so far, in order.
    pub fn calls(&self) -> Vec<HandleCall> {
        lock(&self.state).calls.clone()
    }

    /// Names of every command received so far, in order.
    pub fn call_names(&self) -> Vec<&'static str> {
        lock(&self.state).calls.iter().map(HandleCall::name).collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Make every future call named `operation` fail with a hardware fault.
    pub fn inject_fault(&self, operation: &str) {
        lock(&self.state).faults.insert(operation.to_string());
    }

    pub fn clear_faults(&self) {
        lock(&self.state).faults.clear();
    }

    pub fn position(&self) -> f64 {
        lock(&self.state).position
    }

    /// Teleport the stage, e.g. to start a test at a given position.
    pub fn set_position(&self, position: f64) {
        lock(&self.state).position = position;
    }

    pub fn status(&self) -> MotorStatus {
        lock(&self.state).status
    }

    pub fn velocity(&self) -> VelocityParams {
        lock(&self.state).velocity
    }

    pub fn set_velocity(&self, params: VelocityParams) {
        lock(&self.state).velocity = params;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    pub fn polling_interval(&self) -> Option<Duration> {
        lock(&self.state).polling
    }

    /// Control settings initialization: `initialized` is the current flag and
    /// `on_wait` whether a wait call flips it to `true`.
    pub fn set_settings_initialization(&self, initialized: bool, on_wait: bool) {
        let mut state = lock(&self.state);
        state.settings_initialized = initialized;
        state.initialize_on_wait = on_wait;
    }

    /// Replace the front panel settings; `None` removes the front panel.
    pub fn set_mmi(&self, mmi: Option<MmiParams>) {
        lock(&self.state).mmi = mmi;
    }

    pub fn mmi(&self) -> Option<MmiParams> {
        lock(&self.state).mmi.clone()
    }

    /// Log `call`, fail if faulted, otherwise apply `effect` to the state.
    fn record(
        &self,
        call: HandleCall,
        effect: impl FnOnce(&mut SimState) -> Result<(), StageError>,
    ) -> Result<(), StageError> {
        let mut state = lock(&self.state);
        let name = call.name();
        state.calls.push(call);
        if state.faults.contains(name) {
            return Err(StageError::hardware(
                state.serial.clone(),
                format!("simulated fault in {name}"),
            ));
        }
        effect(&mut state)
    }
}

impl DeviceHandle for SimHandle {
    fn family(&self) -> DeviceFamily {
        lock(&self.state).family
    }

    fn connect(&mut self, serial: &str) -> Result<(), StageError> {
        self.record(HandleCall::Connect(serial.to_string()), |s| {
            if s.serial != serial {
                return Err(StageError::hardware(
                    serial,
                    format!("no device with serial {serial} (simulating {})", s.serial),
                ));
            }
            s.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Result<(), StageError> {
        self.record(HandleCall::Disconnect, |s| {
            s.connected = false;
            s.polling = None;
            Ok(())
        })
    }

    fn enable_device(&mut self) -> Result<(), StageError> {
        self.record(HandleCall::EnableDevice, |s| {
            s.enabled = true;
            Ok(())
        })
    }

    fn disable_device(&mut self) -> Result<(), StageError> {
        self.record(HandleCall::DisableDevice, |s| {
            s.enabled = false;
            s.status.is_moving = false;
            Ok(())
        })
    }

    fn is_settings_initialized(&self) -> bool {
        lock(&self.state).settings_initialized
    }

    fn wait_for_settings_initialized(&mut self, timeout: Duration) -> Result<(), StageError> {
        self.record(HandleCall::WaitForSettingsInitialized(timeout), |s| {
            if s.initialize_on_wait {
                s.settings_initialized = true;
            }
            Ok(())
        })
    }

    fn start_polling(&mut self, interval: Duration) -> Result<(), StageError> {
        self.record(HandleCall::StartPolling(interval), |s| {
            s.polling = Some(interval);
            Ok(())
        })
    }

    fn load_motor_configuration(&mut self, serial: &str) -> Result<(), StageError> {
        self.record(HandleCall::LoadMotorConfiguration(serial.to_string()), |_| Ok(()))
    }

    fn device_info(&self) -> Result<DeviceInfo, StageError> {
        let state = lock(&self.state);
        let name = match state.family {
            DeviceFamily::LegacyActiveX => "APT",
            DeviceFamily::KCubeDcServo => "KDC101",
            DeviceFamily::TCubeDcServo => "TDC001",
            DeviceFamily::TCubeStepper => "TST001",
        };
        Ok(DeviceInfo {
            serial_number: state.serial.clone(),
            name: name.to_string(),
        })
    }

    fn position(&self) -> Result<f64, StageError> {
        Ok(lock(&self.state).position)
    }

    fn velocity_params(&self) -> Result<VelocityParams, StageError> {
        Ok(lock(&self.state).velocity)
    }

    fn set_velocity_params(&mut self, params: VelocityParams) -> Result<(), StageError> {
        self.record(HandleCall::SetVelocityParams(params), |s| {
            s.velocity = params;
            Ok(())
        })
    }

    fn homing_velocity(&self) -> Result<f64, StageError> {
        Ok(lock(&self.state).homing_velocity)
    }

    fn set_homing_velocity(&mut self, velocity: f64) -> Result<(), StageError> {
        self.record(HandleCall::SetHomingVelocity(velocity), |s| {
            s.homing_velocity = velocity;
            Ok(())
        })
    }

    fn status(&self) -> Result<MotorStatus, StageError> {
        Ok(lock(&self.state).status)
    }

    fn home(&mut self, channel: u32) -> Result<(), StageError> {
        self.record(HandleCall::Home(channel), |s| {
            s.position = 0.0;
            s.status.is_homed = true;
            s.status.is_moving = false;
            Ok(())
        })
    }

    fn stop(&mut self, channel: u32) -> Result<(), StageError> {
        self.record(HandleCall::Stop(channel), |s| {
            s.status.is_moving = false;
            Ok(())
        })
    }

    fn stop_immediate(&mut self) -> Result<(), StageError> {
        self.record(HandleCall::StopImmediate, |s| {
            s.status.is_moving = false;
            Ok(())
        })
    }

    fn move_to(&mut self, position: f64, channel: u32) -> Result<(), StageError> {
        self.record(HandleCall::MoveTo(position, channel), |s| {
            s.position = position;
            s.status.is_moving = false;
            Ok(())
        })
    }

    fn set_move_relative_distance(&mut self, distance: f64) -> Result<(), StageError> {
        self.record(HandleCall::SetMoveRelativeDistance(distance), |s| {
            s.relative_distance = distance;
            Ok(())
        })
    }

    fn move_relative(&mut self, direction: MotorDirection) -> Result<(), StageError> {
        self.record(HandleCall::MoveRelative(direction), |s| {
            match direction {
                MotorDirection::Forward => s.position += s.relative_distance,
                MotorDirection::Backward => s.position -= s.relative_distance,
            }
            Ok(())
        })
    }

    fn move_continuous_at_velocity(
        &mut self,
        direction: MotorDirection,
        speed: f64,
    ) -> Result<(), StageError> {
        self.record(HandleCall::MoveContinuousAtVelocity(direction, speed), |s| {
            s.status.is_moving = true;
            Ok(())
        })
    }

    fn mmi_params(&self) -> Result<MmiParams, StageError> {
        let state = lock(&self.state);
        state.mmi.clone().ok_or_else(|| StageError::Unsupported {
            family: state.family,
            operation: "GetMMIParams".to_string(),
        })
    }

    fn set_mmi_params(&mut self, params: MmiParams) -> Result<(), StageError> {
        self.record(HandleCall::SetMmiParams(params.clone()), |s| {
            if s.mmi.is_none() {
                return Err(StageError::Unsupported {
                    family: s.family,
                    operation: "SetMMIParams".to_string(),
                });
            }
            s.mmi = Some(params);
            Ok(())
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vendor backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BackendState {
    loaded_modules: Vec<String>,
    device_list_builds: usize,
    handles: HashMap<String, SimHandle>,
    opened: Vec<(DeviceFamily, String)>,
}

/// Simulated vendor runtime.
///
/// Opening a serial number that has been opened (or registered with
/// [`with_device`][Self::with_device]) before returns a clone of the same
/// [`SimHandle`], so the physical state of the simulated stage survives an
/// adapter reset.
#[derive(Debug, Default)]
pub struct SimBackend {
    state: Mutex<BackendState>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a simulator so tests can configure it before it is opened.
    pub fn with_device(self, handle: SimHandle) -> Self {
        let serial = lock(&handle.state).serial.clone();
        lock(&self.state).handles.insert(serial, handle);
        self
    }

    /// The simulator behind `serial`, if it has been registered or opened.
    pub fn handle(&self, serial: &str) -> Option<SimHandle> {
        lock(&self.state).handles.get(serial).cloned()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        lock(&self.state).loaded_modules.clone()
    }

    pub fn device_list_builds(&self) -> usize {
        lock(&self.state).device_list_builds
    }

    /// Every `open_device` request, in order.
    pub fn opened(&self) -> Vec<(DeviceFamily, String)> {
        lock(&self.state).opened.clone()
    }
}

impl VendorBackend for SimBackend {
    fn load_module(&self, module: &str) -> Result<(), StageError> {
        let mut state = lock(&self.state);
        if !state.loaded_modules.iter().any(|m| m == module) {
            state.loaded_modules.push(module.to_string());
        }
        Ok(())
    }

    fn build_device_list(&self) -> Result<(), StageError> {
        lock(&self.state).device_list_builds += 1;
        Ok(())
    }

    fn open_device(
        &self,
        family: DeviceFamily,
        serial: &str,
    ) -> Result<Box<dyn DeviceHandle>, StageError> {
        let mut state = lock(&self.state);
        state.opened.push((family, serial.to_string()));
        let handle = state
            .handles
            .entry(serial.to_string())
            .or_insert_with(|| SimHandle::new(family, serial))
            .clone();
        if handle.family() != family {
            return Err(StageError::hardware(
                serial,
                format!("device {serial} is a {}, not a {family}", handle.family()),
            ));
        }
        Ok(Box::new(handle))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Legacy ActiveX control
// ────────────────────────────────────────────────────────────────────────────

/// A method invoked on a [`SimLegacyControl`].
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyCall {
    SetControl(String),
    SetHwSerialNum(String),
    StartCtrl,
    StopCtrl,
    MoveHome(u32, bool),
    SetRelMoveDist(u32, f64),
    MoveRelative(u32, bool),
    SetAbsMovePos(u32, f64),
    MoveAbsolute(u32, bool),
}

#[derive(Debug, Default)]
struct LegacyState {
    calls: Vec<LegacyCall>,
    status_bits: u32,
    position: f64,
    rel_distance: f64,
    abs_position: f64,
}

/// Simulated `MGMotor` ActiveX control.
#[derive(Debug, Clone, Default)]
pub struct SimLegacyControl {
    state: Arc<Mutex<LegacyState>>,
}

impl SimLegacyControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<LegacyCall> {
        lock(&self.state).calls.clone()
    }

    pub fn position(&self) -> f64 {
        lock(&self.state).position
    }

    /// Overwrite the raw status word returned by `GetStatusBits_Bits`.
    pub fn set_status_bits(&self, bits: u32) {
        lock(&self.state).status_bits = bits;
    }

    fn record(&self, call: LegacyCall, effect: impl FnOnce(&mut LegacyState)) {
        let mut state = lock(&self.state);
        state.calls.push(call);
        effect(&mut state);
    }
}

impl LegacyControl for SimLegacyControl {
    fn set_control(&mut self, prog_id: &str) -> Result<(), StageError> {
        self.record(LegacyCall::SetControl(prog_id.to_string()), |_| {});
        Ok(())
    }

    fn set_hw_serial_num(&mut self, serial: &str) -> Result<(), StageError> {
        self.record(LegacyCall::SetHwSerialNum(serial.to_string()), |_| {});
        Ok(())
    }

    fn start_ctrl(&mut self) -> Result<(), StageError> {
        self.record(LegacyCall::StartCtrl, |_| {});
        Ok(())
    }

    fn stop_ctrl(&mut self) -> Result<(), StageError> {
        self.record(LegacyCall::StopCtrl, |_| {});
        Ok(())
    }

    fn status_bits(&self, _channel: u32) -> Result<u32, StageError> {
        Ok(lock(&self.state).status_bits)
    }

    fn move_home(&mut self, channel: u32, wait: bool) -> Result<(), StageError> {
        self.record(LegacyCall::MoveHome(channel, wait), |s| {
            s.position = 0.0;
            s.status_bits |= 1 << HOMED_BIT;
        });
        Ok(())
    }

    fn position(&self, _channel: u32) -> Result<f64, StageError> {
        Ok(lock(&self.state).position)
    }

    fn set_rel_move_dist(&mut self, channel: u32, distance: f64) -> Result<(), StageError> {
        self.record(LegacyCall::SetRelMoveDist(channel, distance), |s| {
            s.rel_distance = distance;
        });
        Ok(())
    }

    fn move_relative(&mut self, channel: u32, wait: bool) -> Result<(), StageError> {
        self.record(LegacyCall::MoveRelative(channel, wait), |s| {
            s.position += s.rel_distance;
        });
        Ok(())
    }

    fn set_abs_move_pos(&mut self, channel: u32, position: f64) -> Result<(), StageError> {
        self.record(LegacyCall::SetAbsMovePos(channel, position), |s| {
            s.abs_position = position;
        });
        Ok(())
    }

    fn move_absolute(&mut self, channel: u32, wait: bool) -> Result<(), StageError> {
        self.record(LegacyCall::MoveAbsolute(channel, wait), |s| {
            s.position = s.abs_position;
        });
        Ok(())
    }
}
