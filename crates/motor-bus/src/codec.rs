//! Register codec: byte order, checksum and scaling rules for every record on the bus.
//!
//! Multi-byte fields travel big-endian. Received records are checked with a checksum seeded
//! with zero; outbound records carry a checksum seeded with the destination register address.

use crate::registers::{
    Register, ESC_SPEED_LEN, INFO_LEN, OBSERVATION_LEN, RPM_MAX, RPM_MIN, SATURATION_BIT,
};
use crate::types::{clamp_rpm, DeviceInfo, ErrorCode, EscSpeedCommand, Observation};
use crate::{ProtocolError, Result};

/// Running XOR of `seed` with every byte of `bytes`.
pub fn checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc ^ b)
}

pub fn encode_be16(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn decode_be16(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

pub fn encode_be32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_be32(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Linear map of a normalized speed onto `[RPM_MIN, RPM_MAX]`.
///
/// Inputs outside `[0.0, 1.0]` are not clamped here; the float-to-int cast truncates the
/// fraction and saturates at the `u16` bounds.
pub fn scale_to_rpm(normalized: f32) -> u16 {
    (normalized * f32::from(RPM_MAX - RPM_MIN) + f32::from(RPM_MIN)) as u16
}

fn check_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(ProtocolError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn be16_at(bytes: &[u8], at: usize) -> u16 {
    decode_be16([bytes[at], bytes[at + 1]])
}

impl DeviceInfo {
    /// Unpack the info register image. The record carries no checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, INFO_LEN)?;
        Ok(Self {
            version_major: bytes[0],
            version_minor: bytes[1],
            device_type: bytes[2],
            n_motors_controlled: bytes[3],
            n_flights: be16_at(bytes, 4),
            last_flight_time: be16_at(bytes, 6),
            total_flight_time: decode_be32([bytes[8], bytes[9], bytes[10], bytes[11]]),
            last_error: ErrorCode::from_raw(bytes[12]),
        })
    }

    pub fn to_bytes(&self) -> [u8; INFO_LEN] {
        let mut out = [0u8; INFO_LEN];
        out[0] = self.version_major;
        out[1] = self.version_minor;
        out[2] = self.device_type;
        out[3] = self.n_motors_controlled;
        out[4..6].copy_from_slice(&encode_be16(self.n_flights));
        out[6..8].copy_from_slice(&encode_be16(self.last_flight_time));
        out[8..12].copy_from_slice(&encode_be32(self.total_flight_time));
        out[12] = self.last_error.raw();
        out
    }
}

impl Observation {
    /// Validate and unpack the observation register image.
    ///
    /// The record is rejected as a whole when its trailing checksum disagrees with the
    /// zero-seeded XOR of the preceding bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, OBSERVATION_LEN)?;
        let received = bytes[OBSERVATION_LEN - 1];
        let computed = checksum(0, &bytes[..OBSERVATION_LEN - 1]);
        if received != computed {
            return Err(ProtocolError::ChecksumMismatch { received, computed });
        }

        let raw = [
            be16_at(bytes, 0),
            be16_at(bytes, 2),
            be16_at(bytes, 4),
            be16_at(bytes, 6),
        ];
        let saturated = raw.map(|r| r & SATURATION_BIT != 0);
        let rpm = raw.map(|r| r & !SATURATION_BIT);

        Ok(Self {
            rpm_front_left: rpm[0],
            rpm_front_right: rpm[1],
            rpm_back_right: rpm[2],
            rpm_back_left: rpm[3],
            battery_voltage_mv: be16_at(bytes, 8),
            error_code: ErrorCode::from_raw(bytes[10]),
            checksum: received,
            saturated,
        })
    }

    /// Wire image with saturation flags folded back in and a freshly computed checksum.
    pub fn to_bytes(&self) -> [u8; OBSERVATION_LEN] {
        let mut out = [0u8; OBSERVATION_LEN];
        for (i, (rpm, sat)) in self.rpms().iter().zip(self.saturated).enumerate() {
            let mut field = rpm & !SATURATION_BIT;
            if sat {
                field |= SATURATION_BIT;
            }
            out[i * 2..i * 2 + 2].copy_from_slice(&encode_be16(field));
        }
        out[8..10].copy_from_slice(&encode_be16(self.battery_voltage_mv));
        out[10] = self.error_code.raw();
        out[OBSERVATION_LEN - 1] = checksum(0, &out[..OBSERVATION_LEN - 1]);
        out
    }
}

impl EscSpeedCommand {
    /// Build a command from per-motor normalized speeds in wire order
    /// (front-left, front-right, back-right, back-left).
    ///
    /// Speeds are clamped to `[0.0, 1.0]` (NaN counts as 0.0) before scaling, and the
    /// resulting RPMs are clamped to `[RPM_MIN, RPM_MAX]`. The security flag is always off.
    pub fn from_normalized(speeds: [f32; 4]) -> Self {
        let rpm = speeds.map(|s| {
            let s = if s.is_nan() { 0.0 } else { s.clamp(0.0, 1.0) };
            clamp_rpm(scale_to_rpm(s))
        });
        Self::from_rpms(rpm)
    }

    /// Build a command from explicit RPM targets, clamped to `[RPM_MIN, RPM_MAX]`.
    pub fn from_rpms(rpm: [u16; 4]) -> Self {
        let mut cmd = Self {
            rpm_front_left: clamp_rpm(rpm[0]),
            rpm_front_right: clamp_rpm(rpm[1]),
            rpm_back_right: clamp_rpm(rpm[2]),
            rpm_back_left: clamp_rpm(rpm[3]),
            enable_security: 0x00,
            checksum: 0,
        };
        let bytes = cmd.to_bytes();
        cmd.checksum = bytes[ESC_SPEED_LEN - 1];
        cmd
    }

    /// Wire image; the checksum is seeded with the ESC speed register address.
    pub fn to_bytes(&self) -> [u8; ESC_SPEED_LEN] {
        let mut out = [0u8; ESC_SPEED_LEN];
        for (i, rpm) in self.rpms().iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&encode_be16(*rpm));
        }
        out[8] = self.enable_security;
        out[ESC_SPEED_LEN - 1] = checksum(
            Register::SetEscSpeed.addr(),
            &out[..ESC_SPEED_LEN - 1],
        );
        out
    }

    /// Parse a command as the device sees it, verifying the register-seeded checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len(bytes, ESC_SPEED_LEN)?;
        let received = bytes[ESC_SPEED_LEN - 1];
        let computed = checksum(Register::SetEscSpeed.addr(), &bytes[..ESC_SPEED_LEN - 1]);
        if received != computed {
            return Err(ProtocolError::ChecksumMismatch { received, computed });
        }
        Ok(Self {
            rpm_front_left: be16_at(bytes, 0),
            rpm_front_right: be16_at(bytes, 2),
            rpm_back_right: be16_at(bytes, 4),
            rpm_back_left: be16_at(bytes, 6),
            enable_security: bytes[8],
            checksum: received,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation_image(fields: [u16; 5], error: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(OBSERVATION_LEN);
        for f in fields {
            out.extend_from_slice(&f.to_be_bytes());
        }
        out.push(error);
        out.push(checksum(0, &out));
        out
    }

    #[test]
    fn test_checksum_is_running_xor() {
        assert_eq!(checksum(0, &[]), 0);
        assert_eq!(checksum(0x02, &[]), 0x02);
        assert_eq!(checksum(0, &[0x0F, 0xF0]), 0xFF);
        assert_eq!(checksum(0xFF, &[0x0F, 0xF0]), 0x00);
        assert_eq!(checksum(0x02, &[0x01, 0x01, 0x10]), 0x12);
    }

    #[test]
    fn test_big_endian_helpers() {
        assert_eq!(encode_be16(0x1234), [0x12, 0x34]);
        assert_eq!(decode_be16([0x12, 0x34]), 0x1234);
        assert_eq!(encode_be32(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(decode_be32([1, 2, 3, 4]), 0x0102_0304);
    }

    #[test]
    fn test_scale_to_rpm_bounds_and_monotonic() {
        assert_eq!(scale_to_rpm(0.0), RPM_MIN);
        assert_eq!(scale_to_rpm(1.0), RPM_MAX);
        let mut prev = scale_to_rpm(0.0);
        for i in 1..=1000 {
            let s = i as f32 / 1000.0;
            let rpm = scale_to_rpm(s);
            assert!((RPM_MIN..=RPM_MAX).contains(&rpm), "rpm {rpm} for {s}");
            assert!(rpm >= prev, "not monotonic at {s}");
            prev = rpm;
        }
    }

    #[test]
    fn test_scale_truncates_fraction() {
        // 0.0001 * 9200 = 0.92 -> truncated away
        assert_eq!(scale_to_rpm(0.0001), RPM_MIN);
    }

    #[test]
    fn test_observation_decodes_big_endian_fields() {
        let img = observation_image([4000, 4100, 4200, 4300, 12150], 0x00);
        let obs = Observation::from_bytes(&img).unwrap();
        assert_eq!(obs.rpms(), [4000, 4100, 4200, 4300]);
        assert_eq!(obs.battery_voltage_mv, 12150);
        assert_eq!(obs.error_code, ErrorCode::None);
        assert_eq!(obs.checksum, img[OBSERVATION_LEN - 1]);
        assert!(!obs.any_saturated());
    }

    #[test]
    fn test_observation_clears_saturation_bit() {
        let mut img = vec![0x80, 0x64, 0, 0, 0, 0, 0, 0, 0x2E, 0xE0, 0x00];
        img.push(checksum(0, &img));
        let obs = Observation::from_bytes(&img).unwrap();
        assert_eq!(obs.rpm_front_left, 100);
        assert_eq!(obs.saturated, [true, false, false, false]);
        assert_eq!(obs.battery_voltage_mv, 12000);
    }

    #[test]
    fn test_observation_rejects_every_wrong_checksum() {
        let img = observation_image([5000, 5000, 5000, 5000, 11800], 0x0B);
        let good = img[OBSERVATION_LEN - 1];
        for bad in 0..=u8::MAX {
            if bad == good {
                continue;
            }
            let mut corrupt = img.clone();
            corrupt[OBSERVATION_LEN - 1] = bad;
            match Observation::from_bytes(&corrupt) {
                Err(ProtocolError::ChecksumMismatch { received, computed }) => {
                    assert_eq!(received, bad);
                    assert_eq!(computed, good);
                }
                other => panic!("expected checksum mismatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_observation_rejects_payload_corruption() {
        let mut img = observation_image([5000, 5000, 5000, 5000, 11800], 0x00);
        img[3] ^= 0x40;
        assert!(matches!(
            Observation::from_bytes(&img),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_observation_length_checked() {
        assert_eq!(
            Observation::from_bytes(&[0u8; 11]),
            Err(ProtocolError::Length {
                expected: OBSERVATION_LEN,
                actual: 11
            })
        );
    }

    #[test]
    fn test_observation_image_roundtrip_keeps_saturation() {
        let obs = Observation {
            rpm_front_left: 9000,
            rpm_front_right: 32767,
            rpm_back_right: 0,
            rpm_back_left: 7,
            battery_voltage_mv: 11100,
            error_code: ErrorCode::LowBattery,
            checksum: 0,
            saturated: [false, true, false, true],
        };
        let img = obs.to_bytes();
        let back = Observation::from_bytes(&img).unwrap();
        assert_eq!(back.rpms(), obs.rpms());
        assert_eq!(back.saturated, obs.saturated);
        assert_eq!(back.error_code, ErrorCode::LowBattery);
    }

    #[test]
    fn test_device_info_swaps_multibyte_fields() {
        let img = [
            1, 7, 2, 4, 0x01, 0x02, 0x00, 0x3C, 0x00, 0x01, 0x00, 0x00, 0x0B,
        ];
        let info = DeviceInfo::from_bytes(&img).unwrap();
        assert_eq!(info.version_major, 1);
        assert_eq!(info.version_minor, 7);
        assert_eq!(info.device_type, 2);
        assert_eq!(info.n_motors_controlled, 4);
        assert_eq!(info.n_flights, 0x0102);
        assert_eq!(info.last_flight_time, 60);
        assert_eq!(info.total_flight_time, 0x0001_0000);
        assert_eq!(info.last_error, ErrorCode::Bldc);
        assert_eq!(info.to_bytes(), img);
    }

    #[test]
    fn test_device_info_has_no_integrity_check() {
        // Any 13 bytes decode; there is no checksum to fail.
        assert!(DeviceInfo::from_bytes(&[0xFF; INFO_LEN]).is_ok());
        assert!(DeviceInfo::from_bytes(&[0u8; INFO_LEN - 1]).is_err());
    }

    #[test]
    fn test_esc_speed_payload_for_mixed_speeds() {
        let cmd = EscSpeedCommand::from_normalized([0.0, 0.5, 1.0, 0.25]);
        assert_eq!(cmd.rpms(), [3000, 7600, 12200, 5300]);
        let bytes = cmd.to_bytes();
        assert_eq!(
            &bytes[..8],
            &[0x0B, 0xB8, 0x1D, 0xB0, 0x2F, 0xA8, 0x14, 0xB4]
        );
        assert_eq!(bytes[8], 0x00);
        assert_eq!(bytes[9], checksum(0x02, &bytes[..9]));
        assert_eq!(cmd.checksum, bytes[9]);
    }

    #[test]
    fn test_esc_speed_checksum_is_register_seeded() {
        for speeds in [[0.0; 4], [1.0; 4], [0.3, 0.6, 0.9, 0.1]] {
            let bytes = EscSpeedCommand::from_normalized(speeds).to_bytes();
            // XOR across the whole frame leaves only the seed.
            assert_eq!(checksum(0, &bytes), Register::SetEscSpeed.addr());
            assert_eq!(checksum(0, &bytes[..9]) ^ Register::SetEscSpeed.addr(), bytes[9]);
        }
    }

    #[test]
    fn test_esc_speed_clamps_out_of_range_input() {
        let cmd = EscSpeedCommand::from_normalized([-0.5, 1.5, f32::NAN, f32::INFINITY]);
        assert_eq!(cmd.rpms(), [RPM_MIN, RPM_MAX, RPM_MIN, RPM_MAX]);
        let cmd = EscSpeedCommand::from_rpms([0, 20000, 5000, 3000]);
        assert_eq!(cmd.rpms(), [RPM_MIN, RPM_MAX, 5000, 3000]);
    }

    #[test]
    fn test_esc_speed_parse_verifies_checksum() {
        let cmd = EscSpeedCommand::from_normalized([0.1, 0.2, 0.3, 0.4]);
        let mut bytes = cmd.to_bytes();
        assert_eq!(EscSpeedCommand::from_bytes(&bytes).unwrap(), cmd);
        bytes[9] ^= 0x02;
        assert!(EscSpeedCommand::from_bytes(&bytes).is_err());
    }
}
