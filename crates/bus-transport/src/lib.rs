//! bus-transport: addressed register transport abstractions
//!
//! This crate provides the [`BusTransport`] trait used to read and write numbered registers
//! on a device behind an I2C-style bus, with feature-gated backends. The default build enables
//! a `mock` backend that simulates a motor coprocessor so binaries and tests run on any host.

mod types;
pub use types::{
    BusConfig, BusInfo, DEFAULT_CLOCK_KHZ, DEFAULT_SLAVE_ADDRESS, DEFAULT_TIMEOUT_US,
};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::BusTransport;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockState};

#[cfg(feature = "rppal")]
mod i2c;

#[cfg(feature = "rppal")]
pub use i2c::I2cBus;
