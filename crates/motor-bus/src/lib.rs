//! motor-bus: register protocol driver for a four-motor BLDC coprocessor
//!
//! The coprocessor sits behind an addressed register bus. This crate encodes commands
//! (rotor speeds, motor start/stop, error clearing, sound, GPIO), decodes and validates
//! telemetry and device info, and sequences the driver lifecycle around a single owning
//! poll worker.

pub mod registers;
pub use registers::{Register, RPM_MAX, RPM_MIN};

mod types;
pub use types::{
    clamp_rpm, DeviceInfo, ErrorCode, EscSpeedCommand, GpioMode, Observation, RotationMapping,
    Sound,
};

mod error;
pub use error::{DriverError, ProtocolError, Result};

pub mod codec;
pub use codec::{checksum, scale_to_rpm};

pub mod telemetry;
pub use telemetry::{read_info, read_observation};

pub mod commands;
pub use commands::Command;

mod sink;
pub use sink::{FnSink, NullSink, ObservationSink};

mod metrics;
pub use metrics::{DriverMetrics, MetricsHub};

pub mod driver;
pub use driver::{DriverState, MotorBus};

mod worker;
pub use worker::{spawn, DriverHandle};

mod config;
pub use config::{load_config_file, BackendKind, DriverConfig};

#[cfg(feature = "mock")]
pub mod sim;
