use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{be_triplet, le_triplet, Error, ImuReading, Vector3};

// Bank 0
const REG_WHO_AM_I: u8 = 0x00;
const REG_USER_CTRL: u8 = 0x03;
const REG_PWR_MGMT_1: u8 = 0x06;
const REG_ACCEL_XOUT_H: u8 = 0x2D;
const REG_GYRO_XOUT_H: u8 = 0x33;
const REG_EXT_SLV_SENS_DATA_00: u8 = 0x3B;

// Bank 2
const REG_GYRO_SMPLRT_DIV: u8 = 0x00;
const REG_GYRO_CONFIG_1: u8 = 0x01;
const REG_ACCEL_SMPLRT_DIV_1: u8 = 0x10;
const REG_ACCEL_SMPLRT_DIV_2: u8 = 0x11;
const REG_ACCEL_CONFIG: u8 = 0x14;

// Bank 3 (auxiliary I²C master)
const REG_I2C_MST_CTRL: u8 = 0x01;
const REG_I2C_SLV0_ADDR: u8 = 0x03;
const REG_I2C_SLV0_REG: u8 = 0x04;
const REG_I2C_SLV0_CTRL: u8 = 0x05;
const REG_I2C_SLV4_ADDR: u8 = 0x13;
const REG_I2C_SLV4_REG: u8 = 0x14;
const REG_I2C_SLV4_CTRL: u8 = 0x15;
const REG_I2C_SLV4_DO: u8 = 0x16;

// Every bank
const REG_BANK_SEL: u8 = 0x7F;

const ICM20948_ID: u8 = 0xEA;

// AK09916, reached through the auxiliary master
const AK09916_ADDRESS: u8 = 0x0C;
const AK09916_HXL: u8 = 0x11;
const AK09916_CNTL2: u8 = 0x31;
const AK09916_CONTINUOUS_100HZ: u8 = 0x08;

const PWR_MGMT_1_CLKSEL_AUTO: u8 = 0x01;
const USER_CTRL_I2C_MST_EN: u8 = 0x20;
const I2C_MST_CTRL_CLK: u8 = 0x17;
const ACCEL_CONFIG_8G: u8 = 0x14; // ±8 g, DLPF bypassed
const GYRO_CONFIG_1: u8 = 0x0E; // DLPF bypassed
const SLV_READ: u8 = 0x80;
const SLV_EN: u8 = 0x80;
// HXL..ST2: six data bytes plus the status byte that latches the next sample
const MAG_READ_LEN: usize = 9;

/// Native output rate with a zero divisor.
pub const ACCEL_NATIVE_HZ: f32 = 1125.0;
pub const GYRO_NATIVE_HZ: f32 = 1100.0;
/// The accelerometer divisor is 12 bits wide, the gyro divisor 8.
pub const ACCEL_DIVISOR_MAX: u16 = 0x0FFF;
pub const GYRO_DIVISOR_MAX: u16 = 0x00FF;

pub const ACCEL_SCALE: f32 = 8.0 / 4096.0 * 9.80665; // m/s² per LSB
pub const GYRO_SCALE: f32 = 500.0 / 65.5 * 0.017453293; // rad/s per LSB
pub const MAG_SCALE: f32 = 0.15; // µT per LSB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Bank {
    B0 = 0,
    B2 = 2,
    B3 = 3,
}

/// Register-level ICM-20948 driver.
///
/// Tracks the selected register bank so the sampling path costs exactly one
/// burst read per channel once configuration has returned to bank 0.
pub struct Icm20948<I2C> {
    i2c: I2C,
    addr: u8,
    bank: Option<Bank>,
}

impl<I2C: I2c> Icm20948<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            bank: None,
        }
    }

    /// Verifies identity, wakes the chip and applies the initial dividers.
    ///
    /// A `WHO_AM_I` mismatch returns [`Error::InvalidDevice`].
    pub fn init<D: DelayNs>(
        &mut self,
        delay: &mut D,
        accel_divisor: u16,
        gyro_divisor: u8,
    ) -> Result<(), Error> {
        info!("Starting ICM-20948 initialization at 0x{:02X}", self.addr);

        let id = self.read_byte_with_retries(Bank::B0, REG_WHO_AM_I, 5, delay)?;
        if id != ICM20948_ID {
            error!(
                "Invalid ICM-20948 ID: 0x{:02X}, expected 0x{:02X}",
                id, ICM20948_ID
            );
            return Err(Error::InvalidDevice(id));
        }
        info!("ICM-20948 chip ID verified: 0x{:02X}", id);

        self.write_register(Bank::B0, REG_PWR_MGMT_1, PWR_MGMT_1_CLKSEL_AUTO)?;
        delay.delay_ms(10);

        self.write_register(Bank::B2, REG_ACCEL_CONFIG, ACCEL_CONFIG_8G)?;
        self.write_register(Bank::B2, REG_GYRO_CONFIG_1, GYRO_CONFIG_1)?;

        self.configure(delay, accel_divisor, gyro_divisor)?;
        info!("ICM-20948 initialization completed");
        Ok(())
    }

    /// Sets both sample-rate dividers and (re)enables the magnetometer
    /// pass-through, leaving bank 0 selected.
    pub fn configure<D: DelayNs>(
        &mut self,
        delay: &mut D,
        accel_divisor: u16,
        gyro_divisor: u8,
    ) -> Result<(), Error> {
        self.set_dividers(accel_divisor, gyro_divisor)?;
        self.enable_magnetometer(delay)?;
        self.select_bank(Bank::B0)
    }

    pub fn set_dividers(&mut self, accel_divisor: u16, gyro_divisor: u8) -> Result<(), Error> {
        let [hi, lo] = accel_divisor.min(ACCEL_DIVISOR_MAX).to_be_bytes();
        self.write_register(Bank::B2, REG_ACCEL_SMPLRT_DIV_1, hi)?;
        self.write_register(Bank::B2, REG_ACCEL_SMPLRT_DIV_2, lo)?;
        self.write_register(Bank::B2, REG_GYRO_SMPLRT_DIV, gyro_divisor)?;
        debug!(
            "ICM-20948 dividers: accel {}, gyro {}",
            accel_divisor, gyro_divisor
        );
        Ok(())
    }

    fn enable_magnetometer<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.write_register(Bank::B0, REG_USER_CTRL, USER_CTRL_I2C_MST_EN)?;
        delay.delay_ms(10);
        self.write_register(Bank::B3, REG_I2C_MST_CTRL, I2C_MST_CTRL_CLK)?;
        delay.delay_ms(10);

        self.write_magnetometer(AK09916_CNTL2, AK09916_CONTINUOUS_100HZ, delay)?;

        // SLV0 mirrors HXL..ST2 into EXT_SLV_SENS_DATA on every sample
        self.write_register(Bank::B3, REG_I2C_SLV0_ADDR, SLV_READ | AK09916_ADDRESS)?;
        self.write_register(Bank::B3, REG_I2C_SLV0_REG, AK09916_HXL)?;
        self.write_register(Bank::B3, REG_I2C_SLV0_CTRL, SLV_EN | MAG_READ_LEN as u8)?;
        delay.delay_ms(10);
        Ok(())
    }

    fn write_magnetometer<D: DelayNs>(
        &mut self,
        reg: u8,
        value: u8,
        delay: &mut D,
    ) -> Result<(), Error> {
        self.write_register(Bank::B3, REG_I2C_SLV4_ADDR, AK09916_ADDRESS)?;
        self.write_register(Bank::B3, REG_I2C_SLV4_REG, reg)?;
        self.write_register(Bank::B3, REG_I2C_SLV4_DO, value)?;
        self.write_register(Bank::B3, REG_I2C_SLV4_CTRL, SLV_EN)?;
        delay.delay_ms(10);
        Ok(())
    }

    pub fn read_acceleration(&mut self) -> Option<Vector3> {
        let raw = self.read_bytes::<6>(Bank::B0, REG_ACCEL_XOUT_H).ok()?;
        Some(Vector3::from_raw(be_triplet(&raw), ACCEL_SCALE))
    }

    pub fn read_gyro(&mut self) -> Option<Vector3> {
        let raw = self.read_bytes::<6>(Bank::B0, REG_GYRO_XOUT_H).ok()?;
        Some(Vector3::from_raw(be_triplet(&raw), GYRO_SCALE))
    }

    pub fn read_magnetic(&mut self) -> Option<Vector3> {
        let raw = self
            .read_bytes::<MAG_READ_LEN>(Bank::B0, REG_EXT_SLV_SENS_DATA_00)
            .ok()?;
        Some(Vector3::from_raw(le_triplet(&raw), MAG_SCALE))
    }

    pub fn read_all(&mut self) -> ImuReading {
        ImuReading {
            accel: self.read_acceleration(),
            gyro: self.read_gyro(),
            mag: self.read_magnetic(),
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn select_bank(&mut self, bank: Bank) -> Result<(), Error> {
        if self.bank == Some(bank) {
            return Ok(());
        }
        if let Err(e) = self.i2c.write(self.addr, &[REG_BANK_SEL, (bank as u8) << 4]) {
            // the chip may or may not have latched the write
            self.bank = None;
            return Err(Error::bus(e));
        }
        self.bank = Some(bank);
        Ok(())
    }

    fn write_register(&mut self, bank: Bank, reg: u8, value: u8) -> Result<(), Error> {
        self.select_bank(bank)?;
        self.i2c.write(self.addr, &[reg, value]).map_err(Error::bus)
    }

    fn read_bytes<const N: usize>(&mut self, bank: Bank, reg: u8) -> Result<[u8; N], Error> {
        self.select_bank(bank)?;
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(Error::bus)?;
        Ok(buf)
    }

    fn read_byte_with_retries<D: DelayNs>(
        &mut self,
        bank: Bank,
        reg: u8,
        retries: u8,
        delay: &mut D,
    ) -> Result<u8, Error> {
        let mut last_error = Error::Bus(embedded_hal::i2c::ErrorKind::Other);

        for attempt in 1..=retries {
            match self.read_bytes::<1>(bank, reg) {
                Ok([value]) => return Ok(value),
                Err(e) => {
                    last_error = e;
                    if attempt < retries {
                        delay.delay_ms(10);
                    }
                }
            }
        }

        Err(last_error)
    }
}
