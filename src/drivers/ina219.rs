use embedded_hal::i2c::I2c;

use super::Error;

const REG_CONFIG: u8 = 0x00;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

// 32 V bus range, ±320 mV shunt, 12-bit 32-sample averaging, continuous
const CONFIG_32V_2A: u16 = 0x3EEF;
const CALIBRATION_32V_2A: u16 = 4096;
const CURRENT_LSB_MA: f32 = 0.1;
const BUS_VOLTAGE_LSB_V: f32 = 0.004;

/// INA219 power monitor on the battery pack.
pub struct Ina219<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> Ina219<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }

    pub fn init(&mut self) -> Result<(), Error> {
        self.write_register(REG_CALIBRATION, CALIBRATION_32V_2A)?;
        self.write_register(REG_CONFIG, CONFIG_32V_2A)?;
        info!("INA219 ready at 0x{:02X}", self.addr);
        Ok(())
    }

    /// Bus voltage in volts.
    pub fn bus_voltage(&mut self) -> Result<f32, Error> {
        let raw = self.read_register(REG_BUS_VOLTAGE)?;
        Ok((raw >> 3) as f32 * BUS_VOLTAGE_LSB_V)
    }

    /// Current in milliamps; negative while charging.
    pub fn current_ma(&mut self) -> Result<f32, Error> {
        // a brown-out resets calibration, which zeroes the current register
        self.write_register(REG_CALIBRATION, CALIBRATION_32V_2A)?;
        let raw = self.read_register(REG_CURRENT)? as i16;
        Ok(raw as f32 * CURRENT_LSB_MA)
    }

    fn write_register(&mut self, reg: u8, value: u16) -> Result<(), Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.addr, &[reg, hi, lo]).map_err(Error::bus)
    }

    fn read_register(&mut self, reg: u8) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(Error::bus)?;
        Ok(u16::from_be_bytes(buf))
    }
}
