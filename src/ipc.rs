//! Hand-off between the sampling context and the network loop.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender};
use portable_atomic::{AtomicBool, Ordering};

use crate::protocol::{Batch, DirectReading};
use crate::rate::RatePlan;
use crate::sampler::{BatchSink, Counters, SamplerControl, SamplerStatus};

/// Advisory flag that keeps the tick handler from emitting while a
/// start/stop transition is in progress.
pub struct ControlLock {
    held: AtomicBool,
}

impl ControlLock {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    pub fn acquire(&self) {
        self.held.store(true, Ordering::Release);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Default for ControlLock {
    fn default() -> Self {
        Self::new()
    }
}

/* Data path: full batches, sampling context -> network loop */
pub struct Outbox<M: RawMutex, const N: usize> {
    ch: Channel<M, Batch, N>,
}

impl<M: RawMutex, const N: usize> Outbox<M, N> {
    pub const fn new() -> Self {
        Self { ch: Channel::new() }
    }

    pub fn sink(&self) -> OutboxSink<'_, M, N> {
        OutboxSink {
            tx: self.ch.sender(),
        }
    }

    pub async fn receive(&self) -> Batch {
        self.ch.receive().await
    }

    pub fn try_receive(&self) -> Option<Batch> {
        self.ch.try_receive().ok()
    }

    /// Drops every queued batch, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.ch.try_receive().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.ch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ch.is_empty()
    }
}

impl<M: RawMutex, const N: usize> Default for Outbox<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`BatchSink`] that queues into an [`Outbox`] without waiting.
pub struct OutboxSink<'a, M: RawMutex, const N: usize> {
    tx: Sender<'a, M, Batch, N>,
}

impl<M: RawMutex, const N: usize> Clone for OutboxSink<'_, M, N> {
    fn clone(&self) -> Self {
        Self { tx: self.tx }
    }
}

impl<M: RawMutex, const N: usize> BatchSink for OutboxSink<'_, M, N> {
    fn send(&mut self, batch: Batch) -> bool {
        self.tx.try_send(batch).is_ok()
    }
}

/* Control path: request/reply with the sampler */
pub enum SamplerRequest<K> {
    Configure(RatePlan),
    Start(K),
    Stop,
    Status,
    ReadDirect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplerReply {
    Configured(bool),
    Started(bool),
    Stopped(Counters),
    Status(SamplerStatus),
    Reading(DirectReading),
}

/// One-deep request and reply channels; the client awaits each reply
/// before sending the next request.
pub struct SamplerLink<M: RawMutex, K> {
    requests: Channel<M, SamplerRequest<K>, 1>,
    replies: Channel<M, SamplerReply, 1>,
}

impl<M: RawMutex, K> SamplerLink<M, K> {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            replies: Channel::new(),
        }
    }

    pub fn client(&self) -> SamplerClient<'_, M, K> {
        SamplerClient { link: self }
    }

    /* sampler side */
    pub async fn receive(&self) -> SamplerRequest<K> {
        self.requests.receive().await
    }

    pub fn try_receive(&self) -> Option<SamplerRequest<K>> {
        self.requests.try_receive().ok()
    }

    pub async fn reply(&self, reply: SamplerReply) {
        self.replies.send(reply).await
    }

    async fn call(&self, request: SamplerRequest<K>) -> SamplerReply {
        self.requests.send(request).await;
        self.replies.receive().await
    }
}

impl<M: RawMutex, K> Default for SamplerLink<M, K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-loop handle onto a sampler running in another context.
pub struct SamplerClient<'a, M: RawMutex, K> {
    link: &'a SamplerLink<M, K>,
}

impl<M: RawMutex, K> SamplerControl for SamplerClient<'_, M, K> {
    type Sink = K;

    async fn configure(&mut self, plan: RatePlan) -> bool {
        match self.link.call(SamplerRequest::Configure(plan)).await {
            SamplerReply::Configured(ok) => ok,
            other => unexpected(other, false),
        }
    }

    async fn start(&mut self, sink: K) -> bool {
        match self.link.call(SamplerRequest::Start(sink)).await {
            SamplerReply::Started(ok) => ok,
            other => unexpected(other, false),
        }
    }

    async fn stop(&mut self) -> Counters {
        match self.link.call(SamplerRequest::Stop).await {
            SamplerReply::Stopped(counters) => counters,
            other => unexpected(other, Counters::default()),
        }
    }

    async fn status(&mut self) -> SamplerStatus {
        match self.link.call(SamplerRequest::Status).await {
            SamplerReply::Status(status) => status,
            other => unexpected(
                other,
                SamplerStatus {
                    active: false,
                    rate: Default::default(),
                    counters: Counters::default(),
                },
            ),
        }
    }

    async fn read_direct(&mut self) -> DirectReading {
        match self.link.call(SamplerRequest::ReadDirect).await {
            SamplerReply::Reading(reading) => reading,
            other => unexpected(other, DirectReading::default()),
        }
    }
}

fn unexpected<T>(reply: SamplerReply, fallback: T) -> T {
    error!("Sampler link out of step, got {:?}", reply);
    fallback
}
