//! `stagectl-hal` – Thorlabs stage adapters
//!
//! Drives Thorlabs motorized stages through two vendor stacks: the Kinesis
//! .NET libraries (K-Cube and T-Cube controllers) and the legacy APT ActiveX
//! control.
//!
//! # Modules
//!
//! - [`handle`] – [`DeviceHandle`][handle::DeviceHandle]: the vendor
//!   controller surface an adapter forwards to.
//! - [`runtime`] – [`KinesisRuntime`][runtime::KinesisRuntime]: validates the
//!   installation directory, loads vendor modules, creates handles.
//! - [`family`] – [`DeviceDescriptor`][family::DeviceDescriptor]: per-family
//!   handle construction.
//! - [`motor`] – [`MotorAdapter`][motor::MotorAdapter]: lifecycle, range
//!   guarded motion, velocity profile, front panel settings.
//! - [`envelope`] – [`TravelEnvelope`][envelope::TravelEnvelope]: the safe
//!   travel range of an axis.
//! - [`legacy`] – [`LegacyMotor`][legacy::LegacyMotor]: APT ActiveX axes.
//! - [`axis`] / [`registry`] – the [`Axis`][axis::Axis] trait and the
//!   serial-number keyed [`AxisRegistry`][registry::AxisRegistry].
//! - [`sim`] / [`sim_registry`] – simulated controllers for tests and
//!   hardware-free runs.

pub mod axis;
pub mod envelope;
pub mod family;
pub mod handle;
pub mod legacy;
pub mod motor;
pub mod registry;
pub mod runtime;
pub mod sim;
pub mod sim_registry;

pub use axis::Axis;
pub use envelope::TravelEnvelope;
pub use family::{DeviceDescriptor, HandleFactory};
pub use handle::DeviceHandle;
pub use legacy::{LegacyControl, LegacyMotor};
pub use motor::{EnableTiming, MotorAdapter};
pub use registry::AxisRegistry;
pub use runtime::{KinesisRuntime, RuntimeLocation, VendorBackend};
pub use sim_registry::{SimRegistry, SimRig};
