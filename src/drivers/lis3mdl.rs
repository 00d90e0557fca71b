use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{le_triplet, Error, Vector3};

const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL_REG1: u8 = 0x20;
const REG_CTRL_REG2: u8 = 0x21;
const REG_CTRL_REG3: u8 = 0x22;
const REG_CTRL_REG4: u8 = 0x23;
const REG_CTRL_REG5: u8 = 0x24;
const REG_OUT_X_L: u8 = 0x28;

const LIS3MDL_ID: u8 = 0x3D;

// MSB of the sub-address enables auto-increment on multi-byte reads
const AUTO_INCREMENT: u8 = 0x80;

const CTRL_REG1_FAST_ODR: u8 = 0x02;
const CTRL_REG2_SOFT_RST: u8 = 0x04;
const CTRL_REG2_FS_4GAUSS: u8 = 0x00;
const CTRL_REG3_CONTINUOUS: u8 = 0x00;
const CTRL_REG5_BDU: u8 = 0x40;

pub const MAG_SCALE: f32 = 100.0 / 6842.0; // µT per LSB at ±4 gauss

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
enum OperatingMode {
    LowPower = 0,
    Medium = 1,
    High = 2,
    UltraHigh = 3,
}

/// Magnetometer output rate. The four fastest rates use the FAST_ODR path,
/// where the operating mode selects the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataRate {
    Hz0_625 = 0,
    Hz1_25 = 1,
    Hz2_5 = 2,
    Hz5 = 3,
    Hz10 = 4,
    Hz20 = 5,
    Hz40 = 6,
    Hz80 = 7,
    Hz155 = 8,
    Hz300 = 9,
    Hz560 = 10,
    Hz1000 = 11,
}

impl DataRate {
    pub const ALL: [DataRate; 12] = [
        DataRate::Hz0_625,
        DataRate::Hz1_25,
        DataRate::Hz2_5,
        DataRate::Hz5,
        DataRate::Hz10,
        DataRate::Hz20,
        DataRate::Hz40,
        DataRate::Hz80,
        DataRate::Hz155,
        DataRate::Hz300,
        DataRate::Hz560,
        DataRate::Hz1000,
    ];

    pub const fn hz(self) -> f32 {
        match self {
            DataRate::Hz0_625 => 0.625,
            DataRate::Hz1_25 => 1.25,
            DataRate::Hz2_5 => 2.5,
            DataRate::Hz5 => 5.0,
            DataRate::Hz10 => 10.0,
            DataRate::Hz20 => 20.0,
            DataRate::Hz40 => 40.0,
            DataRate::Hz80 => 80.0,
            DataRate::Hz155 => 155.0,
            DataRate::Hz300 => 300.0,
            DataRate::Hz560 => 560.0,
            DataRate::Hz1000 => 1000.0,
        }
    }

    /// CTRL_REG1 and CTRL_REG4 values for this rate.
    fn control_bits(self) -> (u8, u8) {
        let (mode, odr) = match self {
            DataRate::Hz155 => (OperatingMode::UltraHigh, CTRL_REG1_FAST_ODR),
            DataRate::Hz300 => (OperatingMode::High, CTRL_REG1_FAST_ODR),
            DataRate::Hz560 => (OperatingMode::Medium, CTRL_REG1_FAST_ODR),
            DataRate::Hz1000 => (OperatingMode::LowPower, CTRL_REG1_FAST_ODR),
            slow => (OperatingMode::UltraHigh, (slow as u8) << 2),
        };
        ((mode as u8) << 5 | odr, (mode as u8) << 2)
    }
}

/// LIS3MDL three-axis magnetometer.
pub struct Lis3mdl<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> Lis3mdl<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }

    pub fn init<D: DelayNs>(&mut self, delay: &mut D, rate: DataRate) -> Result<(), Error> {
        let id = self.read_register(REG_WHO_AM_I)?;
        if id != LIS3MDL_ID {
            error!(
                "Invalid LIS3MDL ID: 0x{:02X}, expected 0x{:02X}",
                id, LIS3MDL_ID
            );
            return Err(Error::InvalidDevice(id));
        }

        self.write_register(REG_CTRL_REG2, CTRL_REG2_SOFT_RST)?;
        delay.delay_ms(10);
        self.write_register(REG_CTRL_REG2, CTRL_REG2_FS_4GAUSS)?;
        self.write_register(REG_CTRL_REG5, CTRL_REG5_BDU)?;
        self.set_data_rate(rate)?;
        self.write_register(REG_CTRL_REG3, CTRL_REG3_CONTINUOUS)?;
        info!("LIS3MDL ready at 0x{:02X}", self.addr);
        Ok(())
    }

    pub fn set_data_rate(&mut self, rate: DataRate) -> Result<(), Error> {
        let (ctrl1, ctrl4) = rate.control_bits();
        self.write_register(REG_CTRL_REG1, ctrl1)?;
        self.write_register(REG_CTRL_REG4, ctrl4)
    }

    pub fn read_magnetic(&mut self) -> Option<Vector3> {
        let mut raw = [0u8; 6];
        self.i2c
            .write_read(self.addr, &[REG_OUT_X_L | AUTO_INCREMENT], &mut raw)
            .ok()?;
        Some(Vector3::from_raw(le_triplet(&raw), MAG_SCALE))
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        self.i2c.write(self.addr, &[reg, value]).map_err(Error::bus)
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(Error::bus)?;
        Ok(buf[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeI2c, NoopDelay};

    const ADDR: u8 = 0x1C;

    #[test]
    fn slow_rates_use_the_odr_field() {
        assert_eq!(DataRate::Hz80.control_bits(), (0x60 | 0x1C, 0x0C));
        assert_eq!(DataRate::Hz0_625.control_bits(), (0x60, 0x0C));
    }

    #[test]
    fn fast_rates_are_selected_by_operating_mode() {
        assert_eq!(DataRate::Hz155.control_bits(), (0x62, 0x0C));
        assert_eq!(DataRate::Hz300.control_bits(), (0x42, 0x08));
        assert_eq!(DataRate::Hz560.control_bits(), (0x22, 0x04));
        assert_eq!(DataRate::Hz1000.control_bits(), (0x02, 0x00));
    }

    #[test]
    fn init_enters_continuous_mode() {
        let bus = FakeI2c::new();
        bus.add_device(ADDR);
        bus.set(ADDR, 0, REG_WHO_AM_I, &[LIS3MDL_ID]);
        bus.set(ADDR, 0, REG_CTRL_REG3, &[0x03]);

        let mut mag = Lis3mdl::new(bus.clone(), ADDR);
        mag.init(&mut NoopDelay, DataRate::Hz40).unwrap();

        assert_eq!(bus.get(ADDR, 0, REG_CTRL_REG3), Some(0x00));
        assert_eq!(bus.get(ADDR, 0, REG_CTRL_REG1), Some(0x60 | (6 << 2)));
        assert_eq!(bus.get(ADDR, 0, REG_CTRL_REG5), Some(0x40));
    }

    #[test]
    fn reads_use_auto_increment() {
        let bus = FakeI2c::new();
        bus.add_device(ADDR);
        // 6842 LSB = 1 gauss = 100 µT
        bus.set(ADDR, 0, REG_OUT_X_L, &[0xBA, 0x1A, 0x00, 0x00, 0x00, 0x00]);

        let mut mag = Lis3mdl::new(bus.clone(), ADDR);
        let field = mag.read_magnetic().unwrap();
        assert!((field.x - 100.0).abs() < 1e-3);
        assert!(bus
            .writes()
            .iter()
            .any(|(_, w)| w.as_slice() == [REG_OUT_X_L | AUTO_INCREMENT]));
    }
}
