//! Register map and fixed protocol constants of the motor coprocessor.

use core::fmt;

/// Numbered register endpoints. Each command or telemetry record targets exactly one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Register {
    SetEscSpeed = 0x02,
    GetObservation = 0x20,
    StartBldc = 0x40,
    ToggleGpio = 0x4D,
    StopBldc = 0x60,
    ClearError = 0x80,
    PlaySound = 0x82,
    GetInfo = 0xA0,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }

    pub fn from_addr(addr: u8) -> Option<Self> {
        match addr {
            0x02 => Some(Self::SetEscSpeed),
            0x20 => Some(Self::GetObservation),
            0x40 => Some(Self::StartBldc),
            0x4D => Some(Self::ToggleGpio),
            0x60 => Some(Self::StopBldc),
            0x80 => Some(Self::ClearError),
            0x82 => Some(Self::PlaySound),
            0xA0 => Some(Self::GetInfo),
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}(0x{addr:02X})", addr = self.addr())
    }
}

/// Lowest commandable rotor speed.
pub const RPM_MIN: u16 = 3000;
/// Highest commandable rotor speed.
pub const RPM_MAX: u16 = 12200;

/// High bit of every telemetry RPM field; set while the motor driver is saturated.
pub const SATURATION_BIT: u16 = 1 << 15;

/// Wire length of the info record.
pub const INFO_LEN: usize = 13;
/// Wire length of the observation record, trailing checksum included.
pub const OBSERVATION_LEN: usize = 12;
/// Wire length of the ESC speed command, trailing checksum included.
pub const ESC_SPEED_LEN: usize = 10;

/// Number of motors driven by the coprocessor.
pub const MOTOR_COUNT: usize = 4;
