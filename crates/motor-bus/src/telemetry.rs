use crate::registers::{Register, INFO_LEN, OBSERVATION_LEN};
use crate::{DeviceInfo, Observation, Result};
use bus_transport::BusTransport;

/// Read and unpack the info register.
pub fn read_info<B: BusTransport + ?Sized>(bus: &mut B) -> Result<DeviceInfo> {
    let raw = bus.read_register(Register::GetInfo.addr(), INFO_LEN as u16)?;
    DeviceInfo::from_bytes(&raw)
}

/// Read, verify and unpack the observation register.
pub fn read_observation<B: BusTransport + ?Sized>(bus: &mut B) -> Result<Observation> {
    let raw = bus.read_register(Register::GetObservation.addr(), OBSERVATION_LEN as u16)?;
    tracing::trace!(bytes = ?raw, "observation image");
    Observation::from_bytes(&raw)
}
