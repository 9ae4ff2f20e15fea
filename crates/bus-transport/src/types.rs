use core::fmt;

/// Slave address of the motor coprocessor.
pub const DEFAULT_SLAVE_ADDRESS: u16 = 0x08;
/// Bus clock in kHz.
pub const DEFAULT_CLOCK_KHZ: u32 = 400;
/// Per-transfer timeout in microseconds.
pub const DEFAULT_TIMEOUT_US: u32 = 500;

/// Bus parameters applied once after open.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BusConfig {
    pub address: u16,
    pub clock_khz: u32,
    pub timeout_us: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SLAVE_ADDRESS,
            clock_khz: DEFAULT_CLOCK_KHZ,
            timeout_us: DEFAULT_TIMEOUT_US,
        }
    }
}

impl fmt::Display for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "addr=0x{addr:02X} clock={clk}kHz timeout={to}us",
            addr = self.address,
            clk = self.clock_khz,
            to = self.timeout_us
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BusInfo {
    pub name: String,
    pub driver: String,
}
