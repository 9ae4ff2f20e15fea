use crate::registers::{RPM_MAX, RPM_MIN};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Error field reported in both the info and observation records.
///
/// The values are protocol constants, not bit flags.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    Eeprom,
    Stalled,
    PropellerSecurity,
    CommunicationLost,
    LowBattery,
    LipoCells,
    Bldc,
    /// A value outside the documented set, kept verbatim.
    Unknown(u8),
}

impl ErrorCode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::None,
            0x01 => Self::Eeprom,
            0x02 => Self::Stalled,
            0x03 => Self::PropellerSecurity,
            0x04 => Self::CommunicationLost,
            0x09 => Self::LowBattery,
            0x0A => Self::LipoCells,
            0x0B => Self::Bldc,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Eeprom => 0x01,
            Self::Stalled => 0x02,
            Self::PropellerSecurity => 0x03,
            Self::CommunicationLost => 0x04,
            Self::LowBattery => 0x09,
            Self::LipoCells => 0x0A,
            Self::Bldc => 0x0B,
            Self::Unknown(raw) => raw,
        }
    }

    /// True for anything the device reports besides `None`.
    pub fn is_fault(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Eeprom => write!(f, "eeprom-fault"),
            Self::Stalled => write!(f, "stalled"),
            Self::PropellerSecurity => write!(f, "propeller-security"),
            Self::CommunicationLost => write!(f, "communication-lost"),
            Self::LowBattery => write!(f, "low-battery"),
            Self::LipoCells => write!(f, "lipo-cell-fault"),
            Self::Bldc => write!(f, "bldc-fault"),
            Self::Unknown(raw) => write!(f, "unknown(0x{raw:02X})"),
        }
    }
}

/// Which diagonal motor pair spins which way, sent once when the motors start.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RotationMapping {
    /// Front-left and back-right clockwise.
    #[serde(rename = "RL-RL")]
    RlRl,
    /// Front-left and back-right counterclockwise.
    #[default]
    #[serde(rename = "LR-LR")]
    LrLr,
}

impl RotationMapping {
    pub const fn bits(self) -> u8 {
        match self {
            Self::RlRl => 0b0000_1010,
            Self::LrLr => 0b0000_0101,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sound {
    #[default]
    None,
    ShortBeep,
    BootBeep,
    Bebop,
}

impl Sound {
    pub const fn selector(self) -> u8 {
        match self {
            Self::None => 0,
            Self::ShortBeep => 1,
            Self::BootBeep => 2,
            Self::Bebop => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioMode {
    Reset,
    Red,
    Green,
}

impl GpioMode {
    pub const fn selector(self) -> u8 {
        match self {
            Self::Reset => 1 << 0,
            Self::Red => 1 << 1,
            Self::Green => 1 << 2,
        }
    }
}

/// Static device information, read once at start-up.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub version_major: u8,
    pub version_minor: u8,
    #[serde(rename = "type")]
    pub device_type: u8,
    pub n_motors_controlled: u8,
    pub n_flights: u16,
    pub last_flight_time: u16,
    pub total_flight_time: u32,
    pub last_error: ErrorCode,
}

/// One decoded telemetry sample. RPM fields hold the magnitude only.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub rpm_front_left: u16,
    pub rpm_front_right: u16,
    pub rpm_back_right: u16,
    pub rpm_back_left: u16,
    pub battery_voltage_mv: u16,
    pub error_code: ErrorCode,
    pub checksum: u8,
    /// Saturation flags stripped from the RPM fields, in the same motor order.
    pub saturated: [bool; 4],
}

impl Observation {
    /// Rotor speeds in wire order: front-left, front-right, back-right, back-left.
    pub fn rpms(&self) -> [u16; 4] {
        [
            self.rpm_front_left,
            self.rpm_front_right,
            self.rpm_back_right,
            self.rpm_back_left,
        ]
    }

    pub fn battery_voltage_v(&self) -> f32 {
        f32::from(self.battery_voltage_mv) / 1000.0
    }

    pub fn any_saturated(&self) -> bool {
        self.saturated.iter().any(|s| *s)
    }
}

/// Rotor speed targets ready for transmission, already inside `[RPM_MIN, RPM_MAX]`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct EscSpeedCommand {
    pub rpm_front_left: u16,
    pub rpm_front_right: u16,
    pub rpm_back_right: u16,
    pub rpm_back_left: u16,
    pub enable_security: u8,
    pub checksum: u8,
}

impl EscSpeedCommand {
    pub fn rpms(&self) -> [u16; 4] {
        [
            self.rpm_front_left,
            self.rpm_front_right,
            self.rpm_back_right,
            self.rpm_back_left,
        ]
    }
}

/// Clamp a commanded RPM into the range the motor drivers accept.
pub fn clamp_rpm(rpm: u16) -> u16 {
    rpm.clamp(RPM_MIN, RPM_MAX)
}
