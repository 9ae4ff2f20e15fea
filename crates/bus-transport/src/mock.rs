use crate::{BusConfig, BusInfo, BusTransport, Result, TransportError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type Responder = Box<dyn FnMut(u8, &[u8], &mut HashMap<u8, Vec<u8>>) + Send>;

/// Observable state of a [`MockBus`], shared with every handle.
#[derive(Debug, Default, Clone)]
pub struct MockState {
    pub open: bool,
    pub config: Option<BusConfig>,
    /// Register images returned by reads.
    pub registers: HashMap<u8, Vec<u8>>,
    /// Every accepted write, in order.
    pub writes: Vec<(u8, Vec<u8>)>,
    /// Every attempted read, in order.
    pub reads: Vec<(u8, u16)>,
    /// The next `fail_reads` reads time out.
    pub fail_reads: u32,
    /// Writes to these registers are not acknowledged.
    pub fail_writes: HashSet<u8>,
    pub fail_open: bool,
    pub fail_configure: bool,
    /// The next `fail_close` closes fail and leave the bus open.
    pub fail_close: u32,
}

/// An in-process register-map bus. Reads return the stored register image; writes are
/// recorded and may update images through a responder so a device can be simulated.
pub struct MockBus {
    name: String,
    state: Arc<Mutex<MockState>>,
    responder: Option<Responder>,
}

impl MockBus {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
            responder: None,
        }
    }

    /// Shared view of the bus state; stays valid after the bus is moved elsewhere.
    pub fn handle(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_register(self, reg: u8, image: Vec<u8>) -> Self {
        if let Ok(mut st) = self.state.lock() {
            st.registers.insert(reg, image);
        }
        self
    }

    /// Install a hook run after every accepted write.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(u8, &[u8], &mut HashMap<u8, Vec<u8>>) + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| TransportError::Io("mock state poisoned".to_string()))
    }
}

impl BusTransport for MockBus {
    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn open(&mut self) -> Result<()> {
        let mut st = self.state()?;
        if st.fail_open {
            return Err(TransportError::DeviceNotFound(self.name.clone()));
        }
        st.open = true;
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        let mut st = self.state()?;
        if !st.open {
            return Err(TransportError::NotOpen);
        }
        if st.fail_configure {
            return Err(TransportError::Unsupported("mock configure rejected"));
        }
        st.config = Some(*config);
        Ok(())
    }

    fn read_register(&mut self, reg: u8, len: u16) -> Result<Vec<u8>> {
        let mut st = self.state()?;
        if !st.open {
            return Err(TransportError::NotOpen);
        }
        st.reads.push((reg, len));
        if st.fail_reads > 0 {
            st.fail_reads -= 1;
            return Err(TransportError::Timeout);
        }
        let image = st.registers.get(&reg).ok_or(TransportError::Nack { reg })?;
        let want = usize::from(len);
        if image.len() < want {
            return Err(TransportError::ShortTransfer {
                expected: want,
                actual: image.len(),
            });
        }
        Ok(image[..want].to_vec())
    }

    fn write_register(&mut self, reg: u8, payload: &[u8]) -> Result<()> {
        let state = Arc::clone(&self.state);
        let mut st = state
            .lock()
            .map_err(|_| TransportError::Io("mock state poisoned".to_string()))?;
        if !st.open {
            return Err(TransportError::NotOpen);
        }
        if st.fail_writes.contains(&reg) {
            return Err(TransportError::Nack { reg });
        }
        st.writes.push((reg, payload.to_vec()));
        if let Some(responder) = self.responder.as_mut() {
            responder(reg, payload, &mut st.registers);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut st = self.state()?;
        if st.fail_close > 0 {
            st.fail_close -= 1;
            return Err(TransportError::Io("mock close failed".to_string()));
        }
        st.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_requires_open() {
        let mut bus = MockBus::new("mock0").with_register(0x20, vec![1, 2, 3]);
        assert_eq!(bus.read_register(0x20, 3), Err(TransportError::NotOpen));
        bus.open().unwrap();
        assert_eq!(bus.read_register(0x20, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_short_and_missing_registers() {
        let mut bus = MockBus::new("mock0").with_register(0x20, vec![1, 2]);
        bus.open().unwrap();
        assert_eq!(
            bus.read_register(0x20, 4),
            Err(TransportError::ShortTransfer {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(
            bus.read_register(0xA0, 1),
            Err(TransportError::Nack { reg: 0xA0 })
        );
    }

    #[test]
    fn test_fail_reads_counts_down() -> anyhow::Result<()> {
        let mut bus = MockBus::new("mock0").with_register(0x20, vec![7]);
        let handle = bus.handle();
        bus.open()?;
        handle.lock().unwrap().fail_reads = 1;
        assert_eq!(bus.read_register(0x20, 1), Err(TransportError::Timeout));
        assert_eq!(bus.read_register(0x20, 1)?, vec![7]);
        assert_eq!(handle.lock().unwrap().reads.len(), 2);
        Ok(())
    }

    #[test]
    fn test_writes_recorded_and_responder_runs() -> anyhow::Result<()> {
        let mut bus = MockBus::new("mock0").with_responder(|reg, payload, regs| {
            regs.insert(reg.wrapping_add(1), payload.to_vec());
        });
        let handle = bus.handle();
        bus.open()?;
        bus.write_register(0x40, &[0x05])?;
        bus.write_register(0x60, &[])?;
        let st = handle.lock().unwrap();
        assert_eq!(st.writes, vec![(0x40, vec![0x05]), (0x60, vec![])]);
        assert_eq!(st.registers.get(&0x41), Some(&vec![0x05]));
        Ok(())
    }

    #[test]
    fn test_nack_on_failed_register() -> anyhow::Result<()> {
        let mut bus = MockBus::new("mock0");
        let handle = bus.handle();
        bus.open()?;
        handle.lock().unwrap().fail_writes.insert(0x80);
        assert_eq!(
            bus.write_register(0x80, &[]),
            Err(TransportError::Nack { reg: 0x80 })
        );
        assert!(handle.lock().unwrap().writes.is_empty());
        Ok(())
    }

    #[test]
    fn test_configure_and_close() -> anyhow::Result<()> {
        let mut bus = MockBus::new("mock0");
        let handle = bus.handle();
        assert_eq!(
            bus.configure(&BusConfig::default()),
            Err(TransportError::NotOpen)
        );
        bus.open()?;
        bus.configure(&BusConfig::default())?;
        assert_eq!(handle.lock().unwrap().config, Some(BusConfig::default()));
        bus.close()?;
        assert!(!handle.lock().unwrap().open);
        Ok(())
    }

    #[test]
    fn test_fail_close_keeps_bus_open() -> anyhow::Result<()> {
        let mut bus = MockBus::new("mock0");
        let handle = bus.handle();
        bus.open()?;
        handle.lock().unwrap().fail_close = 1;
        assert!(matches!(bus.close(), Err(TransportError::Io(_))));
        assert!(handle.lock().unwrap().open);
        bus.close()?;
        assert!(!handle.lock().unwrap().open);
        Ok(())
    }
}
