// Centralize all configuration constants
use crate::rate::SampleRate;

// network
pub const UDP_PORT: u16 = 12345;
pub const RX_DATAGRAM_MAX: usize = 64;

// sampling
pub const DEFAULT_RATE: SampleRate = SampleRate::Hz50;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 16;

// lifecycle settle delays
pub const START_SETTLE_MS: u32 = 20;
pub const STOP_SETTLE_MS: u32 = 50;
pub const DISARM_RETRIES: u8 = 3;
pub const DISARM_RETRY_DELAY_MS: u32 = 5;

// channel sizes
pub const OUTBOX_DEPTH: usize = 4;

// sensor bus
pub const I2C_FREQUENCY_HZ: u32 = 400_000;
pub const ICM20948_ADDRESS: u8 = 0x68;
pub const LSM6DSOX_ADDRESS: u8 = 0x6A;
pub const LIS3MDL_ADDRESS: u8 = 0x1C;
pub const INA219_ADDRESS: u8 = 0x43;

// access point
pub const AP_SSID: &str = match option_env!("MOCAP_AP_SSID") {
    Some(ssid) => ssid,
    None => "mocap-node",
};
pub const AP_PASSPHRASE: &str = match option_env!("MOCAP_AP_PASSPHRASE") {
    Some(pass) => pass,
    None => "mocap-node-2w",
};
pub const AP_CHANNEL: u8 = 6;
pub const AP_ADDRESS: [u8; 4] = [192, 168, 4, 1];
pub const AP_PREFIX_LEN: u8 = 24;

/// Runtime sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplerConfig {
    pub rate: SampleRate,
    pub batch_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SamplerConfig {
    pub fn with_rate(mut self, rate: SampleRate) -> Self {
        self.rate = rate;
        self
    }

    /// Batch size, clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(SamplerConfig::default().with_batch_size(0).batch_size, 1);
        assert_eq!(
            SamplerConfig::default().with_batch_size(100).batch_size,
            MAX_BATCH_SIZE
        );
        assert_eq!(SamplerConfig::default().batch_size, DEFAULT_BATCH_SIZE);
    }
}
