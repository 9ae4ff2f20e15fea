use crate::registers::Register;
use crate::{EscSpeedCommand, GpioMode, Result, RotationMapping, Sound};
use bus_transport::BusTransport;
use core::fmt;

/// Every outbound command the coprocessor accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    SetEscSpeed(EscSpeedCommand),
    StartMotors(RotationMapping),
    StopMotors,
    ClearErrors,
    PlaySound(Sound),
    ToggleGpio(GpioMode),
}

impl Command {
    /// ESC speed command from normalized per-motor speeds
    /// (front-left, front-right, back-right, back-left).
    pub fn esc_speed(speeds: [f32; 4]) -> Self {
        Self::SetEscSpeed(EscSpeedCommand::from_normalized(speeds))
    }

    /// Start command with the rotation mapping used by the start path.
    pub fn start_motors() -> Self {
        Self::StartMotors(RotationMapping::LrLr)
    }

    pub fn register(&self) -> Register {
        match self {
            Self::SetEscSpeed(_) => Register::SetEscSpeed,
            Self::StartMotors(_) => Register::StartBldc,
            Self::StopMotors => Register::StopBldc,
            Self::ClearErrors => Register::ClearError,
            Self::PlaySound(_) => Register::PlaySound,
            Self::ToggleGpio(_) => Register::ToggleGpio,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::SetEscSpeed(cmd) => cmd.to_bytes().to_vec(),
            Self::StartMotors(mapping) => vec![mapping.bits()],
            Self::StopMotors | Self::ClearErrors => Vec::new(),
            Self::PlaySound(sound) => vec![sound.selector()],
            Self::ToggleGpio(mode) => vec![mode.selector()],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetEscSpeed(_) => "set_esc_speed",
            Self::StartMotors(_) => "start_motors",
            Self::StopMotors => "stop_motors",
            Self::ClearErrors => "clear_errors",
            Self::PlaySound(_) => "play_sound",
            Self::ToggleGpio(_) => "toggle_gpio",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name(), self.register())
    }
}

/// Encode `cmd` and issue exactly one register write. No retry.
pub fn send<B: BusTransport + ?Sized>(bus: &mut B, cmd: &Command) -> Result<()> {
    let payload = cmd.payload();
    tracing::debug!(command = cmd.name(), reg = cmd.register().addr(), bytes = ?payload, "write");
    bus.write_register(cmd.register().addr(), &payload)?;
    Ok(())
}

pub fn set_esc_speed<B: BusTransport + ?Sized>(bus: &mut B, speeds: [f32; 4]) -> Result<()> {
    send(bus, &Command::esc_speed(speeds))
}

pub fn start_motors<B: BusTransport + ?Sized>(bus: &mut B) -> Result<()> {
    send(bus, &Command::start_motors())
}

pub fn stop_motors<B: BusTransport + ?Sized>(bus: &mut B) -> Result<()> {
    send(bus, &Command::StopMotors)
}

pub fn clear_errors<B: BusTransport + ?Sized>(bus: &mut B) -> Result<()> {
    send(bus, &Command::ClearErrors)
}

pub fn play_sound<B: BusTransport + ?Sized>(bus: &mut B, sound: Sound) -> Result<()> {
    send(bus, &Command::PlaySound(sound))
}

pub fn toggle_gpio<B: BusTransport + ?Sized>(bus: &mut B, mode: GpioMode) -> Result<()> {
    send(bus, &Command::ToggleGpio(mode))
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::codec::checksum;
    use crate::ProtocolError;
    use bus_transport::{MockBus, TransportError};

    fn open_bus() -> MockBus {
        let mut bus = MockBus::new("mock0");
        bus.open().unwrap();
        bus
    }

    #[test]
    fn test_start_motors_writes_lrlr() {
        let mut bus = open_bus();
        let handle = bus.handle();
        start_motors(&mut bus).unwrap();
        assert_eq!(handle.lock().unwrap().writes, vec![(0x40, vec![0b0000_0101])]);
    }

    #[test]
    fn test_register_table() {
        let cases = [
            (Command::esc_speed([0.0; 4]), 0x02, 10),
            (Command::start_motors(), 0x40, 1),
            (Command::StopMotors, 0x60, 0),
            (Command::ClearErrors, 0x80, 0),
            (Command::PlaySound(Sound::BootBeep), 0x82, 1),
            (Command::ToggleGpio(GpioMode::Green), 0x4D, 1),
        ];
        for (cmd, reg, len) in cases {
            assert_eq!(cmd.register().addr(), reg, "{cmd}");
            assert_eq!(cmd.payload().len(), len, "{cmd}");
        }
    }

    #[test]
    fn test_selectors_on_wire() {
        let mut bus = open_bus();
        let handle = bus.handle();
        play_sound(&mut bus, Sound::ShortBeep).unwrap();
        toggle_gpio(&mut bus, GpioMode::Red).unwrap();
        stop_motors(&mut bus).unwrap();
        clear_errors(&mut bus).unwrap();
        assert_eq!(
            handle.lock().unwrap().writes,
            vec![
                (0x82, vec![1]),
                (0x4D, vec![0x02]),
                (0x60, vec![]),
                (0x80, vec![]),
            ]
        );
    }

    #[test]
    fn test_esc_speed_single_write_with_seeded_checksum() {
        let mut bus = open_bus();
        let handle = bus.handle();
        set_esc_speed(&mut bus, [0.0, 0.5, 1.0, 0.25]).unwrap();
        let st = handle.lock().unwrap();
        assert_eq!(st.writes.len(), 1);
        let (reg, payload) = &st.writes[0];
        assert_eq!(*reg, 0x02);
        assert_eq!(payload.len(), 10);
        assert_eq!(payload[8], 0x00, "security must be disabled");
        assert_eq!(payload[9], checksum(0x02, &payload[..9]));
    }

    #[test]
    fn test_write_failure_is_command_failure() {
        let mut bus = open_bus();
        let handle = bus.handle();
        handle.lock().unwrap().fail_writes.insert(0x02);
        assert_eq!(
            set_esc_speed(&mut bus, [0.5; 4]),
            Err(ProtocolError::Transport(TransportError::Nack { reg: 0x02 }))
        );
        assert!(handle.lock().unwrap().writes.is_empty());
    }
}
