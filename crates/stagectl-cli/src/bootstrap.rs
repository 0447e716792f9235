//! Bring-up – turns a [`Config`] into a populated [`AxisRegistry`].

use std::sync::Arc;

use colored::Colorize;
use stagectl_hal::{
    Axis, AxisRegistry, KinesisRuntime, LegacyMotor, RuntimeLocation, VendorBackend,
    sim::{SimBackend, SimLegacyControl},
};
use stagectl_types::{DeviceFamily, StageError};
use tracing::{error, info};

use crate::config::{AxisConfig, Config};

/// How to switch to simulated controllers, shown with runtime errors.
pub const SIMULATE_HINT: &str =
    "set simulate = true in config.toml or STAGECTL_SIMULATE=1 to run against simulated controllers";

/// Per-axis bring-up result, for the startup summary.
#[derive(Debug)]
pub struct AxisStatus {
    pub serial: String,
    pub family: DeviceFamily,
    pub error: Option<StageError>,
}

/// Select the vendor backend for `cfg`.
///
/// # Errors
///
/// Returns [`StageError::RuntimeLocation`] when `kinesis_path` is not a
/// Kinesis installation, and [`StageError::Config`] when it is but this
/// build carries no vendor bridge.
pub fn runtime_for(cfg: &Config) -> Result<Arc<KinesisRuntime>, StageError> {
    if cfg.simulate {
        let backend: Arc<dyn VendorBackend> = Arc::new(SimBackend::new());
        return KinesisRuntime::simulated(backend);
    }
    let location = RuntimeLocation::validate(&cfg.kinesis_path)?;
    info!(install_dir = %location.install_dir().display(), "Kinesis installation found");
    Err(StageError::Config(format!(
        "this build has no Kinesis bridge; {SIMULATE_HINT}"
    )))
}

/// Build, create and enable every configured axis.
///
/// An axis that fails to come up is still registered so it can be recovered
/// with `/reset`; its error is reported in the returned status list.
pub fn build_registry(
    cfg: &Config,
    runtime: &Arc<KinesisRuntime>,
) -> Result<(AxisRegistry, Vec<AxisStatus>), StageError> {
    let mut registry = AxisRegistry::new();
    let mut statuses = Vec::with_capacity(cfg.axes.len());

    for axis_cfg in &cfg.axes {
        let mut axis = build_axis(cfg, axis_cfg, runtime)?;
        let error = bring_up(axis.as_mut()).err();
        if let Some(err) = &error {
            error!(serial = %axis_cfg.serial, error = %err, "axis failed to come up");
        }
        statuses.push(AxisStatus {
            serial: axis_cfg.serial.clone(),
            family: axis_cfg.family,
            error,
        });
        registry.register(axis);
    }

    Ok((registry, statuses))
}

fn build_axis(
    cfg: &Config,
    axis_cfg: &AxisConfig,
    runtime: &Arc<KinesisRuntime>,
) -> Result<Box<dyn Axis>, StageError> {
    if axis_cfg.family == DeviceFamily::LegacyActiveX {
        if !cfg.simulate {
            return Err(StageError::Unsupported {
                family: axis_cfg.family,
                operation: "ActiveX host".to_string(),
            });
        }
        let mut motor = LegacyMotor::new(axis_cfg.serial.clone());
        motor.bind_control(Box::new(SimLegacyControl::new()))?;
        return Ok(Box::new(motor));
    }

    let motor = runtime
        .motor(axis_cfg.family, axis_cfg.serial.clone(), axis_cfg.motor_type)?
        .with_profile(cfg.profile())
        .with_safety_buffer(cfg.safety_buffer)?
        .with_timing(cfg.timing());
    Ok(Box::new(motor))
}

fn bring_up(axis: &mut dyn Axis) -> Result<(), StageError> {
    axis.create()?;
    axis.enable()
}

/// Print one line per axis.
pub fn print_statuses(statuses: &[AxisStatus]) {
    for status in statuses {
        match &status.error {
            None => println!(
                "  {} {} ({})",
                "✓".green().bold(),
                status.serial.bold(),
                status.family
            ),
            Some(err) => println!(
                "  {} {} ({}): {}",
                "✗".red().bold(),
                status.serial.bold(),
                status.family,
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagectl_types::MotorType;

    fn sim_config() -> Config {
        Config {
            simulate: true,
            settle_delay_ms: 0,
            axes: vec![
                AxisConfig {
                    serial: "80864431".to_string(),
                    family: DeviceFamily::TCubeStepper,
                    motor_type: MotorType::Translation,
                },
                AxisConfig {
                    serial: "83000001".to_string(),
                    family: DeviceFamily::LegacyActiveX,
                    motor_type: MotorType::Translation,
                },
            ],
            ..Config::default()
        }
    }

    #[test]
    fn simulated_config_brings_up_every_axis() {
        let cfg = sim_config();
        let runtime = runtime_for(&cfg).unwrap();
        let (registry, statuses) = build_registry(&cfg, &runtime).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(statuses.iter().all(|s| s.error.is_none()));
    }

    #[test]
    fn missing_installation_is_fatal() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = Config {
            kinesis_path: dir.path().join("missing").to_string_lossy().into_owned(),
            ..Config::default()
        };
        assert!(matches!(
            runtime_for(&cfg),
            Err(StageError::RuntimeLocation(_))
        ));
    }

    #[test]
    fn valid_installation_without_bridge_points_to_simulation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        std::fs::write(dir.path().join(stagectl_hal::runtime::CONTROLS_LIBRARY), b"")
            .expect("write dll");
        let cfg = Config {
            kinesis_path: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        assert!(matches!(
            runtime_for(&cfg),
            Err(StageError::Config(ref m)) if m.contains("STAGECTL_SIMULATE=1")
        ));
    }

    #[test]
    fn unusable_safety_buffer_fails_bring_up() {
        let mut cfg = sim_config();
        cfg.safety_buffer = 12.5;
        let runtime = runtime_for(&cfg).unwrap();
        assert!(matches!(
            build_registry(&cfg, &runtime),
            Err(StageError::Config(_))
        ));
    }

    #[test]
    fn safety_buffer_from_config_is_applied() {
        let mut cfg = sim_config();
        cfg.safety_buffer = 3.0;
        let runtime = runtime_for(&cfg).unwrap();
        let (mut registry, _) = build_registry(&cfg, &runtime).unwrap();

        let outcome = registry
            .axis_mut("80864431")
            .unwrap()
            .move_absolute(22.5)
            .unwrap();
        assert!(!outcome.is_dispatched());
    }
}
