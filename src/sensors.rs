//! The sensor rig as the sampler sees it: two IMU sets and a power monitor.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::config::{ICM20948_ADDRESS, INA219_ADDRESS, LIS3MDL_ADDRESS, LSM6DSOX_ADDRESS};
use crate::drivers::{Error, Icm20948, ImuReading, Ina219, Lis3mdl, Lsm6dsox, Vector3};
use crate::rate::RatePlan;

const BATTERY_EMPTY_V: f32 = 3.0;
const BATTERY_SPAN_V: f32 = 1.18;

/// Battery telemetry as reported by `GET`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerReading {
    /// Bus voltage, V.
    pub voltage: f32,
    /// Discharge current, A. Charging reads as zero.
    pub current: f32,
    /// Charge estimate, 0 to 100.
    pub percentage: f32,
}

impl PowerReading {
    pub fn from_measurements(voltage: f32, current_ma: f32) -> Self {
        let percentage = ((voltage - BATTERY_EMPTY_V) / BATTERY_SPAN_V * 100.0).clamp(0.0, 100.0);
        Self {
            voltage,
            current: (current_ma / 1000.0).max(0.0),
            percentage,
        }
    }
}

/// Readers the sampler drives on every tick.
pub trait SensorSuite {
    fn read_primary(&mut self) -> ImuReading;
    fn read_secondary(&mut self) -> ImuReading;
    /// `None` when no power monitor answered.
    fn read_power(&mut self) -> Option<PowerReading>;
    fn apply_rate(&mut self, plan: &RatePlan) -> Result<(), Error>;
}

/// ICM-20948 primary, LSM6DSOX + LIS3MDL secondary, INA219 on the battery.
///
/// The LIS3MDL and INA219 are optional; without a magnetometer the secondary
/// mag channel reads as a zero vector.
pub struct DualImuRig<I2C, D> {
    primary: Icm20948<I2C>,
    motion: Lsm6dsox<I2C>,
    magnetometer: Option<Lis3mdl<I2C>>,
    power: Option<Ina219<I2C>>,
    delay: D,
}

impl<I2C: I2c + Clone, D: DelayNs> DualImuRig<I2C, D> {
    /// Brings every device up at `plan`.
    ///
    /// Only a primary failure aborts; secondary devices that do not answer
    /// are logged and either dropped (magnetometer, power monitor) or left to
    /// count read errors (LSM6DSOX).
    pub fn init(bus: I2C, mut delay: D, plan: &RatePlan) -> Result<Self, Error> {
        let mut primary = Icm20948::new(bus.clone(), ICM20948_ADDRESS);
        primary.init(&mut delay, plan.accel.value, plan.gyro_divisor())?;

        let mut motion = Lsm6dsox::new(bus.clone(), LSM6DSOX_ADDRESS);
        if let Err(e) = motion.init(&mut delay, plan.motion) {
            warn!("LSM6DSOX init failed: {:?}", e);
        }

        let mut magnetometer = Lis3mdl::new(bus.clone(), LIS3MDL_ADDRESS);
        let magnetometer = match magnetometer.init(&mut delay, plan.magnetometer) {
            Ok(()) => Some(magnetometer),
            Err(e) => {
                warn!("LIS3MDL unavailable, secondary mag reads zero: {:?}", e);
                None
            }
        };

        let mut power = Ina219::new(bus, INA219_ADDRESS);
        let power = match power.init() {
            Ok(()) => Some(power),
            Err(e) => {
                warn!("INA219 unavailable, telemetry reads zero: {:?}", e);
                None
            }
        };

        Ok(Self {
            primary,
            motion,
            magnetometer,
            power,
            delay,
        })
    }
}

impl<I2C: I2c, D: DelayNs> SensorSuite for DualImuRig<I2C, D> {
    fn read_primary(&mut self) -> ImuReading {
        self.primary.read_all()
    }

    fn read_secondary(&mut self) -> ImuReading {
        ImuReading {
            accel: self.motion.read_acceleration(),
            gyro: self.motion.read_gyro(),
            mag: match self.magnetometer.as_mut() {
                Some(mag) => mag.read_magnetic(),
                None => Some(Vector3::ZERO),
            },
        }
    }

    fn read_power(&mut self) -> Option<PowerReading> {
        let ina = self.power.as_mut()?;
        let voltage = ina.bus_voltage().ok()?;
        let current = ina.current_ma().ok()?;
        Some(PowerReading::from_measurements(voltage, current))
    }

    fn apply_rate(&mut self, plan: &RatePlan) -> Result<(), Error> {
        self.primary
            .configure(&mut self.delay, plan.accel.value, plan.gyro_divisor())?;
        self.motion.set_data_rate(plan.motion)?;
        if let Some(mag) = self.magnetometer.as_mut() {
            mag.set_data_rate(plan.magnetometer)?;
        }
        info!(
            "Rate {} Hz: ICM accel {} Hz gyro {} Hz, LSM6DSOX {} Hz, LIS3MDL {} Hz",
            plan.rate.hz(),
            plan.accel.actual_hz,
            plan.gyro.actual_hz,
            plan.motion.hz(),
            plan.magnetometer.hz()
        );
        Ok(())
    }
}
