//! Dedicated poll worker: one thread owns the driver and its transport, so every register
//! exchange is serialized. Commands are queued to it and answered over a reply channel.

use crate::commands::Command;
use crate::driver::{DriverState, MotorBus};
use crate::sink::ObservationSink;
use crate::{DeviceInfo, DriverError, GpioMode, Sound};
use bus_transport::BusTransport;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

enum Request {
    Command(Command, mpsc::Sender<Result<(), DriverError>>),
    Stop,
}

/// Handle to a running worker. Dropping it stops the worker and releases the transport.
pub struct DriverHandle {
    tx: mpsc::Sender<Request>,
    state: Arc<Mutex<DriverState>>,
    info: Arc<OnceLock<DeviceInfo>>,
    join: Option<JoinHandle<()>>,
}

/// Start `driver` on its own thread and poll every `period`, publishing into `sink`.
///
/// Blocks until start-up finishes. A failed start-up is returned as the error and leaves
/// no worker running.
pub fn spawn<B, S>(
    mut driver: MotorBus<B>,
    mut sink: S,
    period: Duration,
) -> Result<DriverHandle, DriverError>
where
    B: BusTransport + Send + 'static,
    S: ObservationSink + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Request>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DriverError>>();
    let state = Arc::new(Mutex::new(driver.state()));
    let info: Arc<OnceLock<DeviceInfo>> = Arc::new(OnceLock::new());

    let shared_state = Arc::clone(&state);
    let shared_info = Arc::clone(&info);
    let join = thread::Builder::new()
        .name("motor-bus".to_string())
        .spawn(move || {
            let publish_state = |s: DriverState| {
                if let Ok(mut guard) = shared_state.lock() {
                    *guard = s;
                }
            };

            let started = driver.start().and_then(|dev| {
                let _ = shared_info.set(dev);
                driver.begin_polling()
            });
            publish_state(driver.state());
            if let Err(e) = started {
                let _ = ready_tx.send(Err(e));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            info!(period_ms = period.as_millis() as u64, "poll loop running");

            let mut next_tick = Instant::now() + period;
            loop {
                let now = Instant::now();
                if now >= next_tick {
                    // Failures are logged inside poll; the tick is skipped.
                    let _ = driver.poll(&mut sink);
                    next_tick += period;
                    if next_tick <= now {
                        debug!("poll overran its period; resynchronizing");
                        next_tick = now + period;
                    }
                    continue;
                }
                match rx.recv_timeout(next_tick - now) {
                    Ok(Request::Command(cmd, reply)) => {
                        let _ = reply.send(driver.execute(&cmd));
                    }
                    Ok(Request::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }

            if let Err(e) = driver.stop() {
                warn!(error = %e, "transport release failed");
            }
            publish_state(driver.state());
        })
        .map_err(|_| DriverError::WorkerGone)?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(DriverHandle {
            tx,
            state,
            info,
            join: Some(join),
        }),
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(DriverError::WorkerGone)
        }
    }
}

impl DriverHandle {
    /// Queue `cmd` behind any in-flight poll and wait for its outcome.
    pub fn submit(&self, cmd: Command) -> Result<(), DriverError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Request::Command(cmd, reply_tx))
            .map_err(|_| DriverError::WorkerGone)?;
        reply_rx.recv().map_err(|_| DriverError::WorkerGone)?
    }

    pub fn set_esc_speed(&self, speeds: [f32; 4]) -> Result<(), DriverError> {
        self.submit(Command::esc_speed(speeds))
    }

    pub fn start_motors(&self) -> Result<(), DriverError> {
        self.submit(Command::start_motors())
    }

    pub fn stop_motors(&self) -> Result<(), DriverError> {
        self.submit(Command::StopMotors)
    }

    pub fn clear_errors(&self) -> Result<(), DriverError> {
        self.submit(Command::ClearErrors)
    }

    pub fn play_sound(&self, sound: Sound) -> Result<(), DriverError> {
        self.submit(Command::PlaySound(sound))
    }

    pub fn toggle_gpio(&self, mode: GpioMode) -> Result<(), DriverError> {
        self.submit(Command::ToggleGpio(mode))
    }

    pub fn state(&self) -> DriverState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(DriverState::Faulted)
    }

    /// Device info read at start-up; immutable for the session.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.get()
    }

    /// Stop polling, release the transport and join the worker.
    pub fn stop(mut self) -> Result<(), DriverError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let _ = self.tx.send(Request::Stop);
        join.join().map_err(|_| DriverError::WorkerGone)
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::registers::Register;
    use crate::{sim, ErrorCode, MotorBus, Observation};

    const PERIOD: Duration = Duration::from_millis(5);

    #[test]
    fn test_worker_polls_and_publishes() {
        let (tx, rx) = mpsc::channel::<Observation>();
        let handle = spawn(MotorBus::new(sim::simulated_bus("mock0")), tx, PERIOD).unwrap();
        assert_eq!(handle.state(), DriverState::Polling);
        assert_eq!(handle.info(), Some(&sim::default_info()));
        let obs = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(obs.error_code, ErrorCode::None);
        handle.stop().unwrap();
    }

    #[test]
    fn test_worker_serializes_commands_with_polls() {
        let (tx, rx) = mpsc::channel::<Observation>();
        let bus = sim::simulated_bus("mock0");
        let mock = bus.handle();
        let handle = spawn(MotorBus::new(bus), tx, PERIOD).unwrap();
        handle.start_motors().unwrap();
        handle.set_esc_speed([0.0, 0.5, 1.0, 0.25]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = None;
        while Instant::now() < deadline {
            if let Ok(obs) = rx.recv_timeout(Duration::from_millis(100)) {
                if obs.rpms() == [3000, 7600, 12200, 5300] {
                    seen = Some(obs);
                    break;
                }
            }
        }
        assert!(seen.is_some(), "commanded speeds never observed");
        handle.stop().unwrap();

        let st = mock.lock().unwrap();
        assert!(!st.open);
        assert_eq!(st.writes[0].0, Register::ClearError.addr());
        assert_eq!(st.writes[1], (Register::StartBldc.addr(), vec![0b0000_0101]));
        assert_eq!(st.writes[2].0, Register::SetEscSpeed.addr());
    }

    #[test]
    fn test_worker_start_failure_is_returned() {
        let bus = sim::simulated_bus("mock0");
        bus.handle().lock().unwrap().fail_reads = 1;
        let res = spawn(MotorBus::new(bus), crate::NullSink, PERIOD);
        assert!(matches!(
            res,
            Err(DriverError::Startup {
                step: "read_info",
                ..
            })
        ));
    }

    #[test]
    fn test_worker_keeps_polling_through_bad_ticks() {
        let (tx, rx) = mpsc::channel::<Observation>();
        let bus = sim::simulated_bus("mock0");
        let mock = bus.handle();
        let handle = spawn(MotorBus::new(bus), tx, PERIOD).unwrap();
        mock.lock().unwrap().fail_reads = 3;
        // Good observations resume once the injected failures are used up.
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert_eq!(handle.state(), DriverState::Polling);
        let failed_command = {
            mock.lock()
                .unwrap()
                .fail_writes
                .insert(Register::PlaySound.addr());
            handle.play_sound(Sound::ShortBeep)
        };
        assert!(matches!(failed_command, Err(DriverError::Protocol(_))));
        assert_eq!(handle.state(), DriverState::Polling);
    }

    #[test]
    fn test_handle_forwards_every_command() {
        let bus = sim::simulated_bus("mock0");
        let mock = bus.handle();
        let handle = spawn(MotorBus::new(bus), crate::NullSink, PERIOD).unwrap();
        handle.start_motors().unwrap();
        handle.set_esc_speed([0.5; 4]).unwrap();
        handle.stop_motors().unwrap();
        handle.clear_errors().unwrap();
        handle.play_sound(Sound::BootBeep).unwrap();
        handle.toggle_gpio(GpioMode::Green).unwrap();
        handle.stop().unwrap();

        let st = mock.lock().unwrap();
        let regs: Vec<u8> = st.writes.iter().map(|(reg, _)| *reg).collect();
        assert_eq!(
            regs,
            vec![
                Register::ClearError.addr(),
                Register::StartBldc.addr(),
                Register::SetEscSpeed.addr(),
                Register::StopBldc.addr(),
                Register::ClearError.addr(),
                Register::PlaySound.addr(),
                Register::ToggleGpio.addr(),
            ]
        );
        assert_eq!(st.writes[5].1, vec![Sound::BootBeep.selector()]);
        assert_eq!(st.writes[6].1, vec![GpioMode::Green.selector()]);
    }

    #[test]
    fn test_drop_stops_worker() {
        let bus = sim::simulated_bus("mock0");
        let mock = bus.handle();
        let handle = spawn(MotorBus::new(bus), crate::NullSink, PERIOD).unwrap();
        drop(handle);
        assert!(!mock.lock().unwrap().open);
    }
}
