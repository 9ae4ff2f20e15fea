use crate::driver::DriverState;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct DriverMetrics {
    pub register_reads: IntCounter,
    pub register_writes: IntCounter,
    pub checksum_failures: IntCounter,
    pub transport_errors: IntCounter,
    pub observations_published: IntCounter,
    pub device_faults: IntCounter,
    pub driver_state: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: DriverMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let dev = DriverMetrics {
            register_reads: counter("mb_register_reads", "Total register reads issued")?,
            register_writes: counter("mb_register_writes", "Total register writes issued")?,
            checksum_failures: counter(
                "mb_checksum_failures",
                "Observation records discarded for a bad checksum",
            )?,
            transport_errors: counter("mb_transport_errors", "Failed bus transfers")?,
            observations_published: counter(
                "mb_observations_published",
                "Observations handed to the publish sink",
            )?,
            device_faults: counter(
                "mb_device_faults",
                "Observations carrying a device-reported error code",
            )?,
            driver_state: IntGauge::new("mb_driver_state", "Driver lifecycle state")
                .map_err(|e| format!("metrics init error: {e}"))?,
        };
        let _ = registry.register(Box::new(dev.register_reads.clone()));
        let _ = registry.register(Box::new(dev.register_writes.clone()));
        let _ = registry.register(Box::new(dev.checksum_failures.clone()));
        let _ = registry.register(Box::new(dev.transport_errors.clone()));
        let _ = registry.register(Box::new(dev.observations_published.clone()));
        let _ = registry.register(Box::new(dev.device_faults.clone()));
        let _ = registry.register(Box::new(dev.driver_state.clone()));
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl DriverMetrics {
    pub(crate) fn set_state(&self, state: DriverState) {
        self.driver_state.set(state.code());
    }
}
