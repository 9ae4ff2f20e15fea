//! Driver lifecycle: start-up sequencing, the per-tick poll step and command gating.
//!
//! ```text
//! Uninitialized -> Starting -> Ready -> Polling -> Stopped
//!                     |                    |
//!                     +----> Faulted <-----+ (start-up only)
//! ```
//!
//! `Stopped` is reachable from every state. `Faulted` is terminal for the session.

use crate::commands::{self, Command};
use crate::metrics::DriverMetrics;
use crate::sink::ObservationSink;
use crate::telemetry;
use crate::{DeviceInfo, DriverError, ErrorCode, GpioMode, Observation, ProtocolError, Sound};
use bus_transport::{BusConfig, BusTransport};
use core::fmt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Uninitialized,
    Starting,
    Ready,
    Polling,
    Stopped,
    Faulted,
}

impl DriverState {
    pub fn code(self) -> i64 {
        match self {
            Self::Uninitialized => 0,
            Self::Starting => 1,
            Self::Ready => 2,
            Self::Polling => 3,
            Self::Stopped => 4,
            Self::Faulted => 5,
        }
    }

    /// Commands are only trusted once start-up has cleared device errors.
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Ready | Self::Polling)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Polling => "polling",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Protocol driver for one coprocessor. Owns its transport exclusively.
pub struct MotorBus<B: BusTransport> {
    bus: B,
    bus_config: BusConfig,
    state: DriverState,
    info: Option<DeviceInfo>,
    last_reported: ErrorCode,
    metrics: Option<DriverMetrics>,
    released: bool,
}

impl<B: BusTransport> MotorBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            bus_config: BusConfig::default(),
            state: DriverState::Uninitialized,
            info: None,
            last_reported: ErrorCode::None,
            metrics: None,
            released: false,
        }
    }

    pub fn with_bus_config(mut self, config: BusConfig) -> Self {
        self.bus_config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: DriverMetrics) -> Self {
        metrics.set_state(self.state);
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Device info fetched during start-up.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    fn set_state(&mut self, state: DriverState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "driver state");
        }
        self.state = state;
        if let Some(m) = &self.metrics {
            m.set_state(state);
        }
    }

    fn record_error(&self, e: &ProtocolError) {
        if let Some(m) = &self.metrics {
            match e {
                ProtocolError::ChecksumMismatch { .. } => m.checksum_failures.inc(),
                ProtocolError::Transport(_) => m.transport_errors.inc(),
                ProtocolError::Length { .. } => {}
            }
        }
    }

    fn fault(&mut self, step: &'static str, source: ProtocolError) -> DriverError {
        error!(step, error = %source, "start-up failed; device unreachable");
        self.record_error(&source);
        self.set_state(DriverState::Faulted);
        DriverError::Startup { step, source }
    }

    /// Open and configure the transport, fetch device info and clear device errors.
    ///
    /// Any failure leaves the driver `Faulted`.
    pub fn start(&mut self) -> Result<DeviceInfo, DriverError> {
        if self.state != DriverState::Uninitialized {
            return Err(DriverError::InvalidState {
                state: self.state,
                operation: "start",
            });
        }
        self.set_state(DriverState::Starting);

        if let Err(e) = self.bus.open() {
            return Err(self.fault("open", e.into()));
        }
        if let Err(e) = self.bus.configure(&self.bus_config) {
            // Info read below decides whether the device is reachable.
            warn!(config = %self.bus_config, error = %e, "could not set slave config");
        }

        self.count_read();
        let info = match telemetry::read_info(&mut self.bus) {
            Ok(info) => info,
            Err(e) => return Err(self.fault("read_info", e)),
        };
        info!(
            version = %format!("{}.{}", info.version_major, info.version_minor),
            device_type = info.device_type,
            motors = info.n_motors_controlled,
            flights = info.n_flights,
            last_flight_time = info.last_flight_time,
            total_flight_time = info.total_flight_time,
            last_error = %info.last_error,
            "coprocessor info"
        );
        self.info = Some(info);

        self.count_write();
        if let Err(e) = commands::clear_errors(&mut self.bus) {
            return Err(self.fault("clear_errors", e));
        }

        self.set_state(DriverState::Ready);
        info!("motor bus ready");
        Ok(info)
    }

    /// Enter the steady-state poll cycle.
    pub fn begin_polling(&mut self) -> Result<(), DriverError> {
        match self.state {
            DriverState::Ready => {
                self.set_state(DriverState::Polling);
                Ok(())
            }
            DriverState::Polling => Ok(()),
            state => Err(DriverError::InvalidState {
                state,
                operation: "begin_polling",
            }),
        }
    }

    /// One poll tick: read the observation and hand it to `sink`.
    ///
    /// A failed read is logged and returned but leaves the state untouched; the tick is
    /// simply skipped and nothing is published.
    pub fn poll<S: ObservationSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<Observation, DriverError> {
        if self.state != DriverState::Polling {
            return Err(DriverError::InvalidState {
                state: self.state,
                operation: "poll",
            });
        }
        self.count_read();
        let obs = match telemetry::read_observation(&mut self.bus) {
            Ok(obs) => obs,
            Err(e) => {
                warn!(error = %e, "poll tick skipped");
                self.record_error(&e);
                return Err(e.into());
            }
        };

        if obs.error_code.is_fault() {
            if let Some(m) = &self.metrics {
                m.device_faults.inc();
            }
            if obs.error_code != self.last_reported {
                warn!(code = %obs.error_code, "device reports fault");
            }
        } else if self.last_reported.is_fault() {
            info!(previous = %self.last_reported, "device fault cleared");
        }
        self.last_reported = obs.error_code;

        sink.publish(&obs);
        if let Some(m) = &self.metrics {
            m.observations_published.inc();
        }
        Ok(obs)
    }

    /// Encode and transmit one command. Allowed in `Ready` and `Polling`.
    pub fn execute(&mut self, cmd: &Command) -> Result<(), DriverError> {
        if !self.state.accepts_commands() {
            return Err(DriverError::InvalidState {
                state: self.state,
                operation: cmd.name(),
            });
        }
        self.count_write();
        if let Err(e) = commands::send(&mut self.bus, cmd) {
            error!(command = cmd.name(), error = %e, "command failed");
            self.record_error(&e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Normalized speeds per motor in wire order: front-left, front-right, back-right, back-left.
    pub fn set_esc_speed(&mut self, speeds: [f32; 4]) -> Result<(), DriverError> {
        self.execute(&Command::esc_speed(speeds))
    }

    pub fn start_motors(&mut self) -> Result<(), DriverError> {
        self.execute(&Command::start_motors())
    }

    pub fn stop_motors(&mut self) -> Result<(), DriverError> {
        self.execute(&Command::StopMotors)
    }

    pub fn clear_errors(&mut self) -> Result<(), DriverError> {
        self.execute(&Command::ClearErrors)
    }

    pub fn play_sound(&mut self, sound: Sound) -> Result<(), DriverError> {
        self.execute(&Command::PlaySound(sound))
    }

    pub fn toggle_gpio(&mut self, mode: GpioMode) -> Result<(), DriverError> {
        self.execute(&Command::ToggleGpio(mode))
    }

    /// Release the transport. Valid from every state.
    ///
    /// Commands are refused as soon as this is called. A failed release is retried by the
    /// next call; once released, stopping again is a no-op.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        if self.released {
            return Ok(());
        }
        self.set_state(DriverState::Stopped);
        if let Err(e) = self.bus.close() {
            let e = ProtocolError::from(e);
            self.record_error(&e);
            return Err(e.into());
        }
        self.released = true;
        info!("motor bus stopped");
        Ok(())
    }

    fn count_read(&self) {
        if let Some(m) = &self.metrics {
            m.register_reads.inc();
        }
    }

    fn count_write(&self) {
        if let Some(m) = &self.metrics {
            m.register_writes.inc();
        }
    }
}
