use crate::{BusConfig, BusInfo, BusTransport, Result, TransportError};
use rppal::i2c::{self, I2c};
use std::fs;
use std::io;

/// Linux `/dev/i2c-N` adapter accessed through rppal.
pub struct I2cBus {
    bus: u8,
    i2c: Option<I2c>,
}

impl I2cBus {
    pub fn new(bus: u8) -> Self {
        Self { bus, i2c: None }
    }

    /// Accepts `/dev/i2c-1`, `i2c-1` or `1`.
    pub fn from_path(path: &str) -> Result<Self> {
        let idx = path
            .trim()
            .trim_start_matches("/dev/")
            .trim_start_matches("i2c-")
            .parse::<u8>()
            .map_err(|_| TransportError::DeviceNotFound(path.to_string()))?;
        Ok(Self::new(idx))
    }

    fn dev(&mut self) -> Result<&mut I2c> {
        self.i2c.as_mut().ok_or(TransportError::NotOpen)
    }
}

fn to_transport_err(reg: Option<u8>, e: i2c::Error) -> TransportError {
    match e {
        i2c::Error::Io(ioe) if ioe.kind() == io::ErrorKind::TimedOut => TransportError::Timeout,
        // EREMOTEIO: the adapter saw no ACK from the slave
        i2c::Error::Io(ioe) if ioe.raw_os_error() == Some(121) => match reg {
            Some(reg) => TransportError::Nack { reg },
            None => TransportError::Io(ioe.to_string()),
        },
        other => TransportError::Io(other.to_string()),
    }
}

impl BusTransport for I2cBus {
    fn list() -> Result<Vec<BusInfo>> {
        let mut out = Vec::new();
        for entry in fs::read_dir("/dev").map_err(|e| TransportError::Io(e.to_string()))? {
            let entry = entry.map_err(|e| TransportError::Io(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("i2c-") {
                out.push(BusInfo {
                    name: format!("/dev/{name}"),
                    driver: "i2c-dev".to_string(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn open(&mut self) -> Result<()> {
        if self.i2c.is_some() {
            return Ok(());
        }
        let dev = I2c::with_bus(self.bus).map_err(|e| match e {
            i2c::Error::Io(ioe) if ioe.kind() == io::ErrorKind::NotFound => {
                TransportError::DeviceNotFound(format!("/dev/i2c-{}", self.bus))
            }
            other => to_transport_err(None, other),
        })?;
        self.i2c = Some(dev);
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        let dev = self.dev()?;
        dev.set_slave_address(config.address)
            .map_err(|e| to_transport_err(None, e))?;
        // rppal takes milliseconds; round up so short timeouts never become "no timeout"
        let timeout_ms = config.timeout_us.div_ceil(1000).max(1);
        dev.set_timeout(timeout_ms).map_err(|e| to_transport_err(None, e))?;
        // The adapter clock is fixed by the kernel driver; report a mismatch only.
        match dev.clock_speed() {
            Ok(hz) if hz / 1000 != config.clock_khz => tracing::warn!(
                adapter_khz = hz / 1000,
                wanted_khz = config.clock_khz,
                "i2c clock cannot be changed from userspace"
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "i2c clock speed unavailable"),
        }
        Ok(())
    }

    fn read_register(&mut self, reg: u8, len: u16) -> Result<Vec<u8>> {
        let dev = self.dev()?;
        let mut buf = vec![0u8; usize::from(len)];
        dev.write_read(&[reg], &mut buf)
            .map_err(|e| to_transport_err(Some(reg), e))?;
        Ok(buf)
    }

    fn write_register(&mut self, reg: u8, payload: &[u8]) -> Result<()> {
        let dev = self.dev()?;
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(payload);
        let written = dev.write(&frame).map_err(|e| to_transport_err(Some(reg), e))?;
        if written != frame.len() {
            return Err(TransportError::ShortTransfer {
                expected: frame.len(),
                actual: written,
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.i2c = None;
        Ok(())
    }
}
