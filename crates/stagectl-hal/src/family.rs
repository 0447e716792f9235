//! Device family descriptors.
//!
//! Controller families differ only in how their handle is created: which
//! vendor capability module is loaded and which constructor is invoked.  A
//! [`DeviceDescriptor`] pairs the family tag with a [`HandleFactory`] that
//! knows how to do that; [`MotorAdapter`][crate::motor::MotorAdapter] holds a
//! descriptor and owns every other behavior.

use std::fmt;
use std::sync::Arc;

use stagectl_types::{DeviceFamily, StageError};

use crate::handle::DeviceHandle;

/// Creates vendor handles on demand.
///
/// Implemented by [`KinesisRuntime`][crate::runtime::KinesisRuntime]; tests
/// implement it directly to count or fail creations.
pub trait HandleFactory: Send + Sync {
    /// Create a fresh, unconnected handle for `serial`.
    fn create_handle(
        &self,
        family: DeviceFamily,
        serial: &str,
    ) -> Result<Box<dyn DeviceHandle>, StageError>;
}

/// Family tag plus the factory used to bind handles of that family.
#[derive(Clone)]
pub struct DeviceDescriptor {
    family: DeviceFamily,
    factory: Arc<dyn HandleFactory>,
}

impl DeviceDescriptor {
    pub fn new(family: DeviceFamily, factory: Arc<dyn HandleFactory>) -> Self {
        Self { family, factory }
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Create a handle of this family for `serial`.
    pub fn create(&self, serial: &str) -> Result<Box<dyn DeviceHandle>, StageError> {
        self.factory.create_handle(self.family, serial)
    }
}

impl fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHandle;
    use std::sync::Mutex;

    struct RecordingFactory {
        requests: Mutex<Vec<(DeviceFamily, String)>>,
    }

    impl HandleFactory for RecordingFactory {
        fn create_handle(
            &self,
            family: DeviceFamily,
            serial: &str,
        ) -> Result<Box<dyn DeviceHandle>, StageError> {
            self.requests
                .lock()
                .unwrap()
                .push((family, serial.to_string()));
            Ok(Box::new(SimHandle::new(family, serial)))
        }
    }

    #[test]
    fn descriptor_forwards_its_family() {
        let factory = Arc::new(RecordingFactory {
            requests: Mutex::new(Vec::new()),
        });
        let descriptor = DeviceDescriptor::new(DeviceFamily::TCubeStepper, factory.clone());

        let handle = descriptor.create("80864431").unwrap();
        assert_eq!(handle.family(), DeviceFamily::TCubeStepper);

        let requests = factory.requests.lock().unwrap();
        assert_eq!(
            requests.as_slice(),
            &[(DeviceFamily::TCubeStepper, "80864431".to_string())]
        );
    }

    #[test]
    fn descriptor_debug_shows_family() {
        let factory = Arc::new(RecordingFactory {
            requests: Mutex::new(Vec::new()),
        });
        let descriptor = DeviceDescriptor::new(DeviceFamily::KCubeDcServo, factory);
        assert!(format!("{descriptor:?}").contains("KCubeDcServo"));
    }
}
