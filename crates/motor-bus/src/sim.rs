//! Simulated coprocessor on top of [`MockBus`], used by tests and the CLI mock backend.

use crate::registers::{Register, MOTOR_COUNT};
use crate::{DeviceInfo, ErrorCode, EscSpeedCommand, Observation};
use bus_transport::{MockBus, MockState};
use std::sync::{Arc, Mutex};

pub const DEFAULT_BATTERY_MV: u16 = 12_000;

pub fn default_info() -> DeviceInfo {
    DeviceInfo {
        version_major: 1,
        version_minor: 4,
        device_type: 2,
        n_motors_controlled: MOTOR_COUNT as u8,
        n_flights: 42,
        last_flight_time: 312,
        total_flight_time: 18_640,
        last_error: ErrorCode::None,
    }
}

fn idle_observation() -> Observation {
    Observation {
        battery_voltage_mv: DEFAULT_BATTERY_MV,
        ..Default::default()
    }
}

/// A bus that answers like a healthy coprocessor.
///
/// Speed commands are echoed back as telemetry RPMs while the motors run; stop zeroes them
/// and clear-errors resets the reported error code.
pub fn simulated_bus(name: &str) -> MockBus {
    let obs_reg = Register::GetObservation.addr();
    let mut running = false;
    MockBus::new(name)
        .with_register(Register::GetInfo.addr(), default_info().to_bytes().to_vec())
        .with_register(obs_reg, idle_observation().to_bytes().to_vec())
        .with_responder(move |reg, payload, regs| {
            let mut obs = regs
                .get(&obs_reg)
                .and_then(|img| Observation::from_bytes(img).ok())
                .unwrap_or_else(idle_observation);
            match Register::from_addr(reg) {
                Some(Register::SetEscSpeed) => {
                    let Ok(cmd) = EscSpeedCommand::from_bytes(payload) else {
                        return;
                    };
                    if !running {
                        return;
                    }
                    let [fl, fr, br, bl] = cmd.rpms();
                    obs.rpm_front_left = fl;
                    obs.rpm_front_right = fr;
                    obs.rpm_back_right = br;
                    obs.rpm_back_left = bl;
                }
                Some(Register::StartBldc) => running = true,
                Some(Register::StopBldc) => {
                    running = false;
                    obs.rpm_front_left = 0;
                    obs.rpm_front_right = 0;
                    obs.rpm_back_right = 0;
                    obs.rpm_back_left = 0;
                    obs.saturated = [false; 4];
                }
                Some(Register::ClearError) => obs.error_code = ErrorCode::None,
                _ => return,
            }
            regs.insert(obs_reg, obs.to_bytes().to_vec());
        })
}

fn update_observation(handle: &Arc<Mutex<MockState>>, f: impl FnOnce(&mut Observation)) {
    let Ok(mut st) = handle.lock() else {
        return;
    };
    let reg = Register::GetObservation.addr();
    let mut obs = st
        .registers
        .get(&reg)
        .and_then(|img| Observation::from_bytes(img).ok())
        .unwrap_or_else(idle_observation);
    f(&mut obs);
    st.registers.insert(reg, obs.to_bytes().to_vec());
}

/// Make the simulated device report `code` on subsequent observations.
pub fn set_error_code(handle: &Arc<Mutex<MockState>>, code: ErrorCode) {
    update_observation(handle, |obs| obs.error_code = code);
}

/// Set or clear the saturation flag of each motor.
pub fn set_saturated(handle: &Arc<Mutex<MockState>>, saturated: [bool; 4]) {
    update_observation(handle, |obs| obs.saturated = saturated);
}

/// Replace the observation image with bytes whose checksum is wrong.
pub fn corrupt_observation(handle: &Arc<Mutex<MockState>>) {
    if let Ok(mut st) = handle.lock() {
        if let Some(img) = st.registers.get_mut(&Register::GetObservation.addr()) {
            if let Some(last) = img.last_mut() {
                *last ^= 0xFF;
            }
        }
    }
}
