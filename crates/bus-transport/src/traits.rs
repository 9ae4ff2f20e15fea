use crate::{BusConfig, BusInfo, Result};

/// A minimal blocking register transport.
///
/// Implementations are not reentrant: callers must serialize every read and
/// write on one instance. A transfer may block for at most the configured
/// timeout and reports expiry as [`TransportError::Timeout`](crate::TransportError::Timeout).
pub trait BusTransport {
    /// Attempt to list available interfaces for this backend.
    fn list() -> Result<Vec<BusInfo>>
    where
        Self: Sized;

    /// Acquire the underlying device. Opening an open transport is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Apply slave address, clock and transfer timeout.
    fn configure(&mut self, config: &BusConfig) -> Result<()>;

    /// Read exactly `len` bytes from register `reg`.
    fn read_register(&mut self, reg: u8, len: u16) -> Result<Vec<u8>>;

    /// Write `payload` to register `reg`. An empty payload addresses the register only.
    fn write_register(&mut self, reg: u8, payload: &[u8]) -> Result<()>;

    /// Release the underlying device. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn list() -> Result<Vec<BusInfo>> {
        Err(crate::TransportError::Unsupported(
            "list is not available on a boxed transport",
        ))
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn read_register(&mut self, reg: u8, len: u16) -> Result<Vec<u8>> {
        (**self).read_register(reg, len)
    }

    fn write_register(&mut self, reg: u8, payload: &[u8]) -> Result<()> {
        (**self).write_register(reg, payload)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
