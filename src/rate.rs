//! Maps a logical sampling rate onto each sensor's native rate primitive.

use crate::drivers::icm20948::{
    ACCEL_DIVISOR_MAX, ACCEL_NATIVE_HZ, GYRO_DIVISOR_MAX, GYRO_NATIVE_HZ,
};
use crate::drivers::{lis3mdl, lsm6dsox};

/// Sampling rates the node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleRate {
    Hz25,
    #[default]
    Hz50,
    Hz100,
    Hz200,
}

impl SampleRate {
    pub const ALL: [SampleRate; 4] = [
        SampleRate::Hz25,
        SampleRate::Hz50,
        SampleRate::Hz100,
        SampleRate::Hz200,
    ];

    pub const fn hz(self) -> u32 {
        match self {
            SampleRate::Hz25 => 25,
            SampleRate::Hz50 => 50,
            SampleRate::Hz100 => 100,
            SampleRate::Hz200 => 200,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.hz() == hz)
    }

    /// Timer period for this rate.
    pub const fn period_ms(self) -> u32 {
        1000 / self.hz()
    }
}

/// A divisor setting and the rate it actually produces.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Divisor {
    pub value: u16,
    pub actual_hz: f32,
}

impl Divisor {
    /// `round(native_hz / target_hz) - 1`, clamped to `0..=max`.
    pub fn for_target(native_hz: f32, target_hz: f32, max: u16) -> Self {
        let ratio = (native_hz / target_hz + 0.5) as u32;
        let value = ratio.saturating_sub(1).min(max as u32) as u16;
        Self {
            value,
            actual_hz: native_hz / (1 + value as u32) as f32,
        }
    }
}

/// Everything the sensors need to run at one logical rate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RatePlan {
    pub rate: SampleRate,
    pub accel: Divisor,
    pub gyro: Divisor,
    pub motion: lsm6dsox::DataRate,
    pub magnetometer: lis3mdl::DataRate,
}

impl RatePlan {
    pub fn new(rate: SampleRate) -> Self {
        let target = rate.hz() as f32;
        Self {
            rate,
            accel: Divisor::for_target(ACCEL_NATIVE_HZ, target, ACCEL_DIVISOR_MAX),
            gyro: Divisor::for_target(GYRO_NATIVE_HZ, target, GYRO_DIVISOR_MAX),
            motion: nearest(&lsm6dsox::DataRate::ALL, |r| r.hz(), target),
            magnetometer: nearest(&lis3mdl::DataRate::ALL, |r| r.hz(), target),
        }
    }

    pub fn gyro_divisor(&self) -> u8 {
        self.gyro.value as u8
    }
}

/// Entry of `table` whose rate is closest to `target_hz`; ties keep the
/// slower entry. `table` must not be empty.
pub fn nearest<R: Copy>(table: &[R], hz: impl Fn(R) -> f32, target_hz: f32) -> R {
    let distance = |r: R| {
        let d = hz(r) - target_hz;
        if d < 0.0 {
            -d
        } else {
            d
        }
    };
    let mut best = table[0];
    for &candidate in &table[1..] {
        if distance(candidate) < distance(best) {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_four_rates_are_supported() {
        for hz in [25, 50, 100, 200] {
            assert_eq!(SampleRate::from_hz(hz).map(SampleRate::hz), Some(hz));
        }
        for hz in [0, 1, 10, 60, 400, 1000] {
            assert_eq!(SampleRate::from_hz(hz), None);
        }
    }

    #[test]
    fn periods_match_rates() {
        assert_eq!(SampleRate::Hz25.period_ms(), 40);
        assert_eq!(SampleRate::Hz50.period_ms(), 20);
        assert_eq!(SampleRate::Hz100.period_ms(), 10);
        assert_eq!(SampleRate::Hz200.period_ms(), 5);
    }

    #[test]
    fn primary_divisors() {
        let expected = [
            (SampleRate::Hz25, 44, 43),
            (SampleRate::Hz50, 22, 21),
            (SampleRate::Hz100, 10, 10),
            (SampleRate::Hz200, 5, 5),
        ];
        for (rate, accel, gyro) in expected {
            let plan = RatePlan::new(rate);
            assert_eq!(plan.accel.value, accel, "{rate:?} accel");
            assert_eq!(plan.gyro.value, gyro, "{rate:?} gyro");
        }
        let plan = RatePlan::new(SampleRate::Hz50);
        assert!((plan.gyro.actual_hz - 50.0).abs() < 1e-3);
        assert!((plan.accel.actual_hz - 1125.0 / 23.0).abs() < 1e-3);
    }

    #[test]
    fn divisor_never_underflows_or_overflows() {
        assert_eq!(Divisor::for_target(1100.0, 5000.0, 255).value, 0);
        assert_eq!(Divisor::for_target(1125.0, 0.1, ACCEL_DIVISOR_MAX).value, 4095);
        assert_eq!(Divisor::for_target(1100.0, 1.0, GYRO_DIVISOR_MAX).value, 255);
    }

    #[test]
    fn secondary_rates_are_nearest() {
        use lis3mdl::DataRate as Mag;
        use lsm6dsox::DataRate as Xl;

        let expected = [
            (SampleRate::Hz25, Xl::Hz26, Mag::Hz20),
            (SampleRate::Hz50, Xl::Hz52, Mag::Hz40),
            (SampleRate::Hz100, Xl::Hz104, Mag::Hz80),
            (SampleRate::Hz200, Xl::Hz208, Mag::Hz155),
        ];
        for (rate, motion, magnetometer) in expected {
            let plan = RatePlan::new(rate);
            assert_eq!(plan.motion, motion);
            assert_eq!(plan.magnetometer, magnetometer);
        }
    }
}
