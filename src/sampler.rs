//! Timer-driven sampler: one record per tick, handed off a batch at a time.
//!
//! The sampler lives in the sampling context. `tick` never blocks and never
//! allocates; a full batch is moved out with `mem::take` and handed to the
//! [`BatchSink`], leaving an empty buffer behind.

use embedded_hal::delay::DelayNs;

use crate::config::{SamplerConfig, DISARM_RETRIES, DISARM_RETRY_DELAY_MS};
use crate::ipc::{ControlLock, SamplerReply, SamplerRequest};
use crate::protocol::{Batch, DirectReading, SampleRecord};
use crate::rate::{RatePlan, SampleRate};
use crate::sensors::SensorSuite;

/// Periodic tick source owned by the sampler.
pub trait PeriodicTimer {
    fn arm(&mut self, period_ms: u32) -> Result<(), TimerError>;
    /// Stops further ticks. `false` if the stop was not acknowledged.
    fn disarm(&mut self) -> bool;
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerError;

/// Receiver of full batches. Must not block.
pub trait BatchSink {
    /// `false` if the batch could not be queued; it is dropped.
    fn send(&mut self, batch: Batch) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    pub generated: u32,
    /// Full batches accepted by the sink. The partial batch flushed by
    /// `stop` is sent but not counted.
    pub sent: u32,
    /// Ticks with a failed read, plus batches the sink refused.
    pub errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplerStatus {
    pub active: bool,
    pub rate: SampleRate,
    pub counters: Counters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    NoSink,
    TimerArm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    Configuring,
    Active,
}

/// Sampler operations as seen from the control loop, whether the sampler
/// is owned directly or reached over a [`crate::ipc::SamplerLink`].
#[allow(async_fn_in_trait)]
pub trait SamplerControl {
    type Sink;

    async fn configure(&mut self, plan: RatePlan) -> bool;
    async fn start(&mut self, sink: Self::Sink) -> bool;
    async fn stop(&mut self) -> Counters;
    async fn status(&mut self) -> SamplerStatus;
    async fn read_direct(&mut self) -> DirectReading;
}

pub struct Sampler<'a, S, T, K, D> {
    sensors: S,
    timer: T,
    delay: D,
    lock: &'a ControlLock,
    sink: Option<K>,
    state: State,
    rate: SampleRate,
    batch_size: usize,
    batch: Batch,
    counters: Counters,
}

impl<'a, S, T, K, D> Sampler<'a, S, T, K, D>
where
    S: SensorSuite,
    T: PeriodicTimer,
    K: BatchSink,
    D: DelayNs,
{
    pub fn new(sensors: S, timer: T, delay: D, lock: &'a ControlLock, config: SamplerConfig) -> Self {
        let config = config.with_batch_size(config.batch_size);
        Self {
            sensors,
            timer,
            delay,
            lock,
            sink: None,
            state: State::Idle,
            rate: config.rate,
            batch_size: config.batch_size,
            batch: Batch::new(),
            counters: Counters::default(),
        }
    }

    pub fn bind_sink(&mut self, sink: K) {
        self.sink = Some(sink);
    }

    pub fn unbind_sink(&mut self) -> Option<K> {
        self.sink.take()
    }

    /// Switches to `rate_hz`. Unsupported rates return `false` and change
    /// nothing.
    pub fn configure(&mut self, rate_hz: u32) -> bool {
        match SampleRate::from_hz(rate_hz) {
            Some(rate) => self.configure_plan(&RatePlan::new(rate)),
            None => {
                warn!("Unsupported sample rate {} Hz", rate_hz);
                false
            }
        }
    }

    /// Applies `plan`. An active sampler is stopped, drained and restarted
    /// at the new rate, which resets its counters.
    pub fn configure_plan(&mut self, plan: &RatePlan) -> bool {
        let was_active = self.state == State::Active;
        if was_active {
            self.stop();
        }

        self.state = State::Configuring;
        if let Err(e) = self.sensors.apply_rate(plan) {
            // the timer still sets the sample rate; sensors keep their old ODR
            warn!("Sensor rate change failed: {:?}", e);
        }
        self.rate = plan.rate;
        self.state = State::Idle;

        if was_active {
            return self.start().is_ok();
        }
        true
    }

    pub fn start(&mut self) -> Result<(), StartError> {
        if self.sink.is_none() {
            warn!("Start rejected: no sink bound");
            return Err(StartError::NoSink);
        }

        self.force_cleanup();
        self.counters = Counters::default();

        let period_ms = self.rate.period_ms();
        self.state = State::Active;
        if let Err(e) = self.timer.arm(period_ms) {
            error!("Failed to arm sample timer: {:?}", e);
            self.state = State::Idle;
            return Err(StartError::TimerArm);
        }

        info!(
            "Sampling started at {} Hz ({} ms period, batch {})",
            self.rate.hz(),
            period_ms,
            self.batch_size
        );
        Ok(())
    }

    /// Body of the periodic timer callback.
    pub fn tick(&mut self) {
        if self.state != State::Active || self.sink.is_none() || self.lock.is_held() {
            return;
        }

        let primary = self.sensors.read_primary();
        let secondary = self.sensors.read_secondary();
        if primary.is_faulted() || secondary.is_faulted() {
            self.counters.errors = self.counters.errors.wrapping_add(1);
        }

        let record = SampleRecord::new(self.timer.now_ms(), &primary, &secondary);
        if self.batch.push(record).is_err() {
            self.counters.errors = self.counters.errors.wrapping_add(1);
            return;
        }
        self.counters.generated = self.counters.generated.wrapping_add(1);

        if self.batch.len() >= self.batch_size {
            self.flush(true);
        }
    }

    /// Disarms the timer, flushes any partial batch and returns the final
    /// counters. Safe to call when already stopped.
    pub fn stop(&mut self) -> Counters {
        if self.state != State::Active {
            debug!("Stop while not sampling");
            return self.counters;
        }

        self.state = State::Idle;
        self.disarm_timer();
        self.flush(false);

        let c = self.counters;
        info!(
            "Sampling stopped: generated {}, sent {}, errors {}",
            c.generated, c.sent, c.errors
        );
        c
    }

    pub fn status(&self) -> SamplerStatus {
        SamplerStatus {
            active: self.state == State::Active,
            rate: self.rate,
            counters: self.counters,
        }
    }

    /// Reads every sensor once, outside the batch and counters.
    pub fn read_direct(&mut self) -> DirectReading {
        let primary = self.sensors.read_primary();
        let secondary = self.sensors.read_secondary();
        let power = self.sensors.read_power().unwrap_or_default();
        DirectReading::new(&primary, &secondary, power)
    }

    /// Executes one request from the control link.
    pub fn serve(&mut self, request: SamplerRequest<K>) -> SamplerReply {
        match request {
            SamplerRequest::Configure(plan) => SamplerReply::Configured(self.configure_plan(&plan)),
            SamplerRequest::Start(sink) => {
                self.bind_sink(sink);
                SamplerReply::Started(self.start().is_ok())
            }
            SamplerRequest::Stop => SamplerReply::Stopped(self.stop()),
            SamplerRequest::Status => SamplerReply::Status(Sampler::status(self)),
            SamplerRequest::ReadDirect => SamplerReply::Reading(self.read_direct()),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    pub fn rate(&self) -> SampleRate {
        self.rate
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    fn force_cleanup(&mut self) {
        self.state = State::Idle;
        self.disarm_timer();
        self.batch.clear();
    }

    fn disarm_timer(&mut self) -> bool {
        for attempt in 1..=DISARM_RETRIES {
            if self.timer.disarm() {
                return true;
            }
            warn!(
                "Timer disarm not acknowledged (attempt {}/{})",
                attempt, DISARM_RETRIES
            );
            if attempt < DISARM_RETRIES {
                self.delay.delay_ms(DISARM_RETRY_DELAY_MS);
            }
        }
        error!(
            "Timer disarm failed after {} attempts, treating as stopped",
            DISARM_RETRIES
        );
        false
    }

    fn flush(&mut self, full: bool) {
        if self.batch.is_empty() {
            return;
        }
        let batch = core::mem::take(&mut self.batch);
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if sink.send(batch) {
            if full {
                self.counters.sent = self.counters.sent.wrapping_add(1);
            }
        } else {
            self.counters.errors = self.counters.errors.wrapping_add(1);
        }
    }
}

impl<'a, S, T, K, D> SamplerControl for Sampler<'a, S, T, K, D>
where
    S: SensorSuite,
    T: PeriodicTimer,
    K: BatchSink,
    D: DelayNs,
{
    type Sink = K;

    async fn configure(&mut self, plan: RatePlan) -> bool {
        self.configure_plan(&plan)
    }

    async fn start(&mut self, sink: K) -> bool {
        self.bind_sink(sink);
        Sampler::start(self).is_ok()
    }

    async fn stop(&mut self) -> Counters {
        Sampler::stop(self)
    }

    async fn status(&mut self) -> SamplerStatus {
        Sampler::status(self)
    }

    async fn read_direct(&mut self) -> DirectReading {
        Sampler::read_direct(self)
    }
}
