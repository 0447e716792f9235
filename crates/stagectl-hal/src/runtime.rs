//! [`KinesisRuntime`] – validated vendor runtime and handle factory.
//!
//! The vendor control libraries live in an installation directory chosen by
//! the user.  [`RuntimeLocation::validate`] checks that directory before any
//! module is loaded; [`KinesisRuntime::init`] then loads the base modules
//! through a [`VendorBackend`] and returns the object every device family
//! descriptor is built from.  Nothing is stored in process-wide state, so two
//! runtimes (e.g. a real one and a simulator) can coexist.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stagectl_hal::runtime::KinesisRuntime;
//! use stagectl_hal::sim::SimBackend;
//! use stagectl_types::{DeviceFamily, MotorType};
//!
//! let runtime = KinesisRuntime::simulated(Arc::new(SimBackend::new())).unwrap();
//! let mut motor = runtime
//!     .motor(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
//!     .unwrap();
//! motor.create().unwrap();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stagectl_types::{DeviceFamily, MotorType, StageError};
use tracing::{debug, info};

use crate::family::{DeviceDescriptor, HandleFactory};
use crate::handle::DeviceHandle;
use crate::motor::MotorAdapter;

/// File that marks a directory as a Kinesis installation.
pub const CONTROLS_LIBRARY: &str = "Thorlabs.MotionControl.Controls.dll";

/// Modules every Kinesis device needs, loaded once by [`KinesisRuntime::init`].
pub const BASE_MODULES: [&str; 4] = [
    "System.Collections",
    "Thorlabs.MotionControl.Controls",
    "Thorlabs.MotionControl.DeviceManagerCLI",
    "Thorlabs.MotionControl.GenericMotorCLI",
];

/// Bridge into the vendor runtime.
pub trait VendorBackend: Send + Sync {
    /// Load a vendor capability module by name.
    fn load_module(&self, module: &str) -> Result<(), StageError>;

    /// Refresh the vendor's list of attached devices.
    fn build_device_list(&self) -> Result<(), StageError>;

    /// Construct an unconnected handle of `family` for `serial`.
    fn open_device(
        &self,
        family: DeviceFamily,
        serial: &str,
    ) -> Result<Box<dyn DeviceHandle>, StageError>;
}

/// A directory verified to contain the vendor control library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLocation {
    install_dir: PathBuf,
}

impl RuntimeLocation {
    /// Check that `path` is a directory holding [`CONTROLS_LIBRARY`].
    pub fn validate(path: impl AsRef<Path>) -> Result<Self, StageError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(StageError::RuntimeLocation(format!(
                "path does not exist: {}",
                path.display()
            )));
        }
        if !path.join(CONTROLS_LIBRARY).is_file() {
            return Err(StageError::RuntimeLocation(format!(
                "cannot find {CONTROLS_LIBRARY} in {}",
                path.display()
            )));
        }
        Ok(Self {
            install_dir: path.to_path_buf(),
        })
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn controls_library(&self) -> PathBuf {
        self.install_dir.join(CONTROLS_LIBRARY)
    }
}

/// Initialized vendor runtime.  Creates device handles for every Kinesis family.
pub struct KinesisRuntime {
    location: Option<RuntimeLocation>,
    backend: Arc<dyn VendorBackend>,
}

impl KinesisRuntime {
    /// Load the base modules from a validated installation.
    pub fn init(
        location: RuntimeLocation,
        backend: Arc<dyn VendorBackend>,
    ) -> Result<Arc<Self>, StageError> {
        info!(install_dir = %location.install_dir().display(), "initializing Kinesis runtime");
        Self::load(Some(location), backend)
    }

    /// Runtime over a backend that needs no installation (simulators).
    pub fn simulated(backend: Arc<dyn VendorBackend>) -> Result<Arc<Self>, StageError> {
        info!("initializing simulated Kinesis runtime");
        Self::load(None, backend)
    }

    fn load(
        location: Option<RuntimeLocation>,
        backend: Arc<dyn VendorBackend>,
    ) -> Result<Arc<Self>, StageError> {
        for module in BASE_MODULES {
            backend.load_module(module)?;
        }
        Ok(Arc::new(Self { location, backend }))
    }

    /// `None` for simulated runtimes.
    pub fn location(&self) -> Option<&RuntimeLocation> {
        self.location.as_ref()
    }

    /// Descriptor for a Kinesis device family.  The legacy ActiveX family is
    /// not created through the Kinesis runtime.
    pub fn descriptor(self: &Arc<Self>, family: DeviceFamily) -> Result<DeviceDescriptor, StageError> {
        if family.capability_module().is_none() {
            return Err(StageError::Unsupported {
                family,
                operation: "Kinesis device creation".to_string(),
            });
        }
        let factory: Arc<dyn HandleFactory> = self.clone();
        Ok(DeviceDescriptor::new(family, factory))
    }

    /// Adapter for one axis, with default profile, buffer and timing.
    pub fn motor(
        self: &Arc<Self>,
        family: DeviceFamily,
        serial: impl Into<String>,
        motor_type: MotorType,
    ) -> Result<MotorAdapter, StageError> {
        Ok(MotorAdapter::new(serial, motor_type, self.descriptor(family)?))
    }
}

impl HandleFactory for KinesisRuntime {
    fn create_handle(
        &self,
        family: DeviceFamily,
        serial: &str,
    ) -> Result<Box<dyn DeviceHandle>, StageError> {
        let module = family
            .capability_module()
            .ok_or_else(|| StageError::Unsupported {
                family,
                operation: "Kinesis device creation".to_string(),
            })?;
        self.backend.load_module(module)?;
        self.backend.build_device_list()?;
        debug!(%family, serial, module, "opening device handle");
        self.backend.open_device(family, serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;

    #[test]
    fn validate_rejects_missing_directory() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let missing = dir.path().join("Kinesis");
        let err = RuntimeLocation::validate(&missing).unwrap_err();
        assert!(matches!(err, StageError::RuntimeLocation(ref m) if m.contains("does not exist")));
    }

    #[test]
    fn validate_rejects_directory_without_controls_library() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = RuntimeLocation::validate(dir.path()).unwrap_err();
        assert!(matches!(err, StageError::RuntimeLocation(ref m) if m.contains(CONTROLS_LIBRARY)));
    }

    #[test]
    fn validate_accepts_installation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        std::fs::write(dir.path().join(CONTROLS_LIBRARY), b"").expect("write dll");
        let location = RuntimeLocation::validate(dir.path()).unwrap();
        assert_eq!(location.install_dir(), dir.path());
        assert!(location.controls_library().ends_with(CONTROLS_LIBRARY));
    }

    #[test]
    fn init_loads_base_modules() {
        let dir = tempfile::tempdir().expect("tmp dir");
        std::fs::write(dir.path().join(CONTROLS_LIBRARY), b"").expect("write dll");
        let location = RuntimeLocation::validate(dir.path()).unwrap();

        let backend = Arc::new(SimBackend::new());
        let runtime = KinesisRuntime::init(location, backend.clone()).unwrap();
        assert!(runtime.location().is_some());
        assert_eq!(backend.loaded_modules(), BASE_MODULES.map(String::from).to_vec());
    }

    #[test]
    fn create_handle_loads_family_module_and_rebuilds_list() {
        let backend = Arc::new(SimBackend::new());
        let runtime = KinesisRuntime::simulated(backend.clone()).unwrap();
        let descriptor = runtime.descriptor(DeviceFamily::KCubeDcServo).unwrap();

        let handle = descriptor.create("27502878").unwrap();
        assert_eq!(handle.family(), DeviceFamily::KCubeDcServo);
        assert!(
            backend
                .loaded_modules()
                .contains(&"Thorlabs.MotionControl.KCube.DCServoCLI".to_string())
        );
        assert_eq!(backend.device_list_builds(), 1);
        assert_eq!(
            backend.opened(),
            vec![(DeviceFamily::KCubeDcServo, "27502878".to_string())]
        );
    }

    #[test]
    fn legacy_family_has_no_kinesis_descriptor() {
        let runtime = KinesisRuntime::simulated(Arc::new(SimBackend::new())).unwrap();
        assert!(matches!(
            runtime.descriptor(DeviceFamily::LegacyActiveX),
            Err(StageError::Unsupported { .. })
        ));
    }
}
