pub mod bus;
pub mod icm20948;
pub mod ina219;
pub mod lis3mdl;
pub mod lsm6dsox;

pub use bus::SharedBus;
pub use icm20948::Icm20948;
pub use ina219::Ina219;
pub use lis3mdl::Lis3mdl;
pub use lsm6dsox::Lsm6dsox;

use embedded_hal::i2c::ErrorKind;

/// Error shared by the register drivers on the sensor bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Bus(ErrorKind),
    /// Identity register held an unexpected value.
    InvalidDevice(u8),
}

impl Error {
    pub(crate) fn bus<E: embedded_hal::i2c::Error>(e: E) -> Self {
        Self::Bus(e.kind())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn from_raw(raw: [i16; 3], scale: f32) -> Self {
        Self {
            x: raw[0] as f32 * scale,
            y: raw[1] as f32 * scale,
            z: raw[2] as f32 * scale,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// One read of an accel/gyro/mag sensor set. `None` marks a channel whose
/// bus transaction failed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuReading {
    pub accel: Option<Vector3>,
    pub gyro: Option<Vector3>,
    pub mag: Option<Vector3>,
}

impl ImuReading {
    pub fn is_faulted(&self) -> bool {
        self.accel.is_none() || self.gyro.is_none() || self.mag.is_none()
    }

    /// Accel, gyro, mag (x/y/z each), zero-filled where a read failed.
    pub fn to_array(&self) -> [f32; 9] {
        let mut out = [0.0; 9];
        for (chunk, v) in out.chunks_exact_mut(3).zip([self.accel, self.gyro, self.mag]) {
            chunk.copy_from_slice(&v.unwrap_or(Vector3::ZERO).to_array());
        }
        out
    }
}

pub(crate) fn be_triplet(raw: &[u8]) -> [i16; 3] {
    [
        i16::from_be_bytes([raw[0], raw[1]]),
        i16::from_be_bytes([raw[2], raw[3]]),
        i16::from_be_bytes([raw[4], raw[5]]),
    ]
}

pub(crate) fn le_triplet(raw: &[u8]) -> [i16; 3] {
    [
        i16::from_le_bytes([raw[0], raw[1]]),
        i16::from_le_bytes([raw[2], raw[3]]),
        i16::from_le_bytes([raw[4], raw[5]]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twos_complement_pairs() {
        assert_eq!(be_triplet(&[0x80, 0x00, 0x00, 0x01, 0xFF, 0xFF]), [i16::MIN, 1, -1]);
        assert_eq!(le_triplet(&[0x00, 0x80, 0x01, 0x00, 0xFF, 0xFF]), [i16::MIN, 1, -1]);
    }

    #[test]
    fn faulted_channels_read_as_zero() {
        let reading = ImuReading {
            accel: Some(Vector3 { x: 1.0, y: 2.0, z: 3.0 }),
            gyro: None,
            mag: Some(Vector3 { x: 7.0, y: 8.0, z: 9.0 }),
        };
        assert!(reading.is_faulted());
        assert_eq!(
            reading.to_array(),
            [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 7.0, 8.0, 9.0]
        );
    }
}
