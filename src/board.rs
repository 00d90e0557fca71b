use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, I2C1, PIO0};
use embassy_rp::pio::{self, Pio};
use embassy_rp::{bind_interrupts, i2c};

use crate::config::I2C_FREQUENCY_HZ;

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    PIO0_IRQ_0 => pio::InterruptHandler<PIO0>;
});

pub type SensorI2c = i2c::I2c<'static, I2C1, i2c::Blocking>;
pub type WifiSpi = PioSpi<'static, PIO0, 0, DMA_CH0>;

// ── Board struct (Raspberry Pi Pico 2 W) ──────────────────
pub struct Board {
    /// Sensor bus: GP7 SCL, GP6 SDA.
    pub i2c1: SensorI2c,
    /// CYW43439 power enable (GP23).
    pub wifi_pwr: Output<'static>,
    /// CYW43439 gSPI over PIO0 (GP24 data, GP25 CS, GP29 clock).
    pub wifi_spi: WifiSpi,
}

impl Board {
    pub fn init() -> Self {
        let p = embassy_rp::init(Default::default());

        // I²C1, blocking: only the sampling task touches it
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.frequency = I2C_FREQUENCY_HZ;
        let i2c1 = i2c::I2c::new_blocking(p.I2C1, p.PIN_7, p.PIN_6, i2c_cfg);

        let wifi_pwr = Output::new(p.PIN_23, Level::Low);
        let cs = Output::new(p.PIN_25, Level::High);
        let mut pio = Pio::new(p.PIO0, Irqs);
        let wifi_spi = PioSpi::new(
            &mut pio.common,
            pio.sm0,
            DEFAULT_CLOCK_DIVIDER,
            pio.irq0,
            cs,
            p.PIN_24,
            p.PIN_29,
            p.DMA_CH0,
        );

        Self {
            i2c1,
            wifi_pwr,
            wifi_spi,
        }
    }
}
