use core::cell::RefCell;

use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_time::{Delay, Duration, Instant, Ticker};

use super::{CONTROL_LOCK, SAMPLER_LINK};
use crate::board::SensorI2c;
use crate::config::SamplerConfig;
use crate::drivers::SharedBus;
use crate::rate::RatePlan;
use crate::sampler::{PeriodicTimer, Sampler, TimerError};
use crate::sensors::DualImuRig;

const STATS_PERIOD: Duration = Duration::from_secs(5);

/// Sample clock backed by an embassy [`Ticker`].
pub struct TickTimer {
    ticker: Option<Ticker>,
}

impl TickTimer {
    pub const fn new() -> Self {
        Self { ticker: None }
    }

    /// Resolves on the next tick; never resolves while disarmed.
    pub async fn next(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.next().await,
            None => core::future::pending().await,
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicTimer for TickTimer {
    fn arm(&mut self, period_ms: u32) -> Result<(), TimerError> {
        if period_ms == 0 {
            return Err(TimerError);
        }
        self.ticker = Some(Ticker::every(Duration::from_millis(period_ms as u64)));
        Ok(())
    }

    fn disarm(&mut self) -> bool {
        self.ticker = None;
        true
    }

    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}

/// Owns the sensor bus and the sampler. Runs on the interrupt executor so
/// ticks preempt the network stack.
#[task]
pub async fn sampling_task(i2c: SensorI2c, config: SamplerConfig) {
    let bus = RefCell::new(i2c);
    let plan = RatePlan::new(config.rate);
    let rig = match DualImuRig::init(SharedBus::new(&bus), Delay, &plan) {
        Ok(rig) => rig,
        Err(e) => defmt::panic!("Primary IMU initialization failed: {:?}", e),
    };
    let mut sampler = Sampler::new(rig, TickTimer::new(), Delay, &CONTROL_LOCK, config);
    info!(
        "Sampling task ready - {} Hz, batches of {}",
        sampler.rate().hz(),
        sampler.batch_size()
    );

    let mut last_report = Instant::now();
    let mut last_generated = 0u32;

    loop {
        let event = select(sampler.timer_mut().next(), SAMPLER_LINK.receive()).await;
        match event {
            Either::First(()) => sampler.tick(),
            Either::Second(request) => {
                let reply = sampler.serve(request);
                SAMPLER_LINK.reply(reply).await;
                // counters restart with every session
                last_generated = sampler.counters().generated;
            }
        }

        if sampler.is_active() && last_report.elapsed() >= STATS_PERIOD {
            let counters = sampler.counters();
            let samples = counters.generated.wrapping_sub(last_generated);
            info!(
                "Sampling: {} Hz, {} batches sent, {} errors",
                samples / STATS_PERIOD.as_secs() as u32,
                counters.sent,
                counters.errors
            );
            last_generated = counters.generated;
            last_report = Instant::now();
        }
    }
}
