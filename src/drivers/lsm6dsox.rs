use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{le_triplet, Error, Vector3};

const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1_XL: u8 = 0x10;
const REG_CTRL2_G: u8 = 0x11;
const REG_CTRL3_C: u8 = 0x12;
const REG_OUTX_L_G: u8 = 0x22;
const REG_OUTX_L_A: u8 = 0x28;

const LSM6DSOX_ID: u8 = 0x6C;

const CTRL3_C_SW_RESET: u8 = 0x01;
const CTRL3_C_IF_INC: u8 = 0x04;
const CTRL3_C_BDU: u8 = 0x40;
const CTRL1_XL_FS_4G: u8 = 0b10 << 2;
const CTRL2_G_FS_250DPS: u8 = 0b00 << 2;

pub const ACCEL_SCALE: f32 = 0.122e-3 * 9.80665; // m/s² per LSB at ±4 g
pub const GYRO_SCALE: f32 = 8.75e-3 * 0.017453293; // rad/s per LSB at ±250 dps

/// Output data rate shared by the accelerometer and gyroscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataRate {
    Hz12_5 = 1,
    Hz26 = 2,
    Hz52 = 3,
    Hz104 = 4,
    Hz208 = 5,
    Hz416 = 6,
    Hz833 = 7,
    Hz1666 = 8,
    Hz3332 = 9,
    Hz6664 = 10,
}

impl DataRate {
    pub const ALL: [DataRate; 10] = [
        DataRate::Hz12_5,
        DataRate::Hz26,
        DataRate::Hz52,
        DataRate::Hz104,
        DataRate::Hz208,
        DataRate::Hz416,
        DataRate::Hz833,
        DataRate::Hz1666,
        DataRate::Hz3332,
        DataRate::Hz6664,
    ];

    pub const fn hz(self) -> f32 {
        match self {
            DataRate::Hz12_5 => 12.5,
            DataRate::Hz26 => 26.0,
            DataRate::Hz52 => 52.0,
            DataRate::Hz104 => 104.0,
            DataRate::Hz208 => 208.0,
            DataRate::Hz416 => 416.0,
            DataRate::Hz833 => 833.0,
            DataRate::Hz1666 => 1666.0,
            DataRate::Hz3332 => 3332.0,
            DataRate::Hz6664 => 6664.0,
        }
    }

    fn odr_bits(self) -> u8 {
        (self as u8) << 4
    }
}

/// LSM6DSOX accelerometer + gyroscope.
pub struct Lsm6dsox<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> Lsm6dsox<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }

    pub fn init<D: DelayNs>(&mut self, delay: &mut D, rate: DataRate) -> Result<(), Error> {
        let id = self.read_register(REG_WHO_AM_I)?;
        if id != LSM6DSOX_ID {
            error!(
                "Invalid LSM6DSOX ID: 0x{:02X}, expected 0x{:02X}",
                id, LSM6DSOX_ID
            );
            return Err(Error::InvalidDevice(id));
        }

        self.write_register(REG_CTRL3_C, CTRL3_C_SW_RESET)?;
        delay.delay_ms(10);
        self.write_register(REG_CTRL3_C, CTRL3_C_BDU | CTRL3_C_IF_INC)?;
        self.set_data_rate(rate)?;
        info!("LSM6DSOX ready at 0x{:02X}", self.addr);
        Ok(())
    }

    pub fn set_data_rate(&mut self, rate: DataRate) -> Result<(), Error> {
        self.write_register(REG_CTRL1_XL, rate.odr_bits() | CTRL1_XL_FS_4G)?;
        self.write_register(REG_CTRL2_G, rate.odr_bits() | CTRL2_G_FS_250DPS)
    }

    pub fn read_acceleration(&mut self) -> Option<Vector3> {
        let raw = self.read_bytes::<6>(REG_OUTX_L_A).ok()?;
        Some(Vector3::from_raw(le_triplet(&raw), ACCEL_SCALE))
    }

    pub fn read_gyro(&mut self) -> Option<Vector3> {
        let raw = self.read_bytes::<6>(REG_OUTX_L_G).ok()?;
        Some(Vector3::from_raw(le_triplet(&raw), GYRO_SCALE))
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        self.i2c.write(self.addr, &[reg, value]).map_err(Error::bus)
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, Error> {
        let [value] = self.read_bytes::<1>(reg)?;
        Ok(value)
    }

    fn read_bytes<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], Error> {
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(Error::bus)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeI2c, NoopDelay};

    const ADDR: u8 = 0x6A;

    #[test]
    fn init_sets_rate_and_ranges() {
        let bus = FakeI2c::new();
        bus.add_device(ADDR);
        bus.set(ADDR, 0, REG_WHO_AM_I, &[LSM6DSOX_ID]);

        let mut imu = Lsm6dsox::new(bus.clone(), ADDR);
        imu.init(&mut NoopDelay, DataRate::Hz104).unwrap();

        assert_eq!(bus.get(ADDR, 0, REG_CTRL1_XL), Some(0x48));
        assert_eq!(bus.get(ADDR, 0, REG_CTRL2_G), Some(0x40));
        assert_eq!(bus.get(ADDR, 0, REG_CTRL3_C), Some(0x44));
    }

    #[test]
    fn wrong_identity_is_rejected() {
        let bus = FakeI2c::new();
        bus.add_device(ADDR);
        bus.set(ADDR, 0, REG_WHO_AM_I, &[0x69]);
        let mut imu = Lsm6dsox::new(bus, ADDR);
        assert_eq!(
            imu.init(&mut NoopDelay, DataRate::Hz52),
            Err(Error::InvalidDevice(0x69))
        );
    }

    #[test]
    fn acceleration_is_little_endian() {
        let bus = FakeI2c::new();
        bus.add_device(ADDR);
        // 8196 LSB ≈ 1 g
        bus.set(ADDR, 0, REG_OUTX_L_A, &[0x00, 0x00, 0x00, 0x00, 0x04, 0x20]);
        let mut imu = Lsm6dsox::new(bus, ADDR);
        let accel = imu.read_acceleration().unwrap();
        assert!((accel.z - 9.80665).abs() < 0.01);
    }

    #[test]
    fn missing_device_reads_nothing() {
        let mut imu = Lsm6dsox::new(FakeI2c::new(), ADDR);
        assert!(imu.read_gyro().is_none());
    }
}
