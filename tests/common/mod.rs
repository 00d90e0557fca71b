#![allow(dead_code)]

use std::collections::VecDeque;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use mocap_node::drivers::{Error, ImuReading, Vector3};
use mocap_node::ipc::{ControlLock, Outbox, OutboxSink};
use mocap_node::protocol::{decode_packet, Batch};
use mocap_node::rate::RatePlan;
use mocap_node::sampler::{PeriodicTimer, Sampler, TimerError};
use mocap_node::sensors::{PowerReading, SensorSuite};
use mocap_node::transport::{DatagramSocket, ProtocolHandler, SocketError};
use mocap_node::config::SamplerConfig;

pub const OUTBOX: usize = 16;

pub type Peer = u16;
pub type TestOutbox = Outbox<NoopRawMutex, OUTBOX>;
pub type TestSampler<'a> =
    Sampler<'a, FakeSensors, FakeTimer, OutboxSink<'a, NoopRawMutex, OUTBOX>, NoopDelay>;
pub type TestHandler<'a> = ProtocolHandler<'a, TestSampler<'a>, NoopDelay, NoopRawMutex, OUTBOX, Peer>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic readings; optionally fails the primary read every n-th tick.
#[derive(Default)]
pub struct FakeSensors {
    pub reads: u32,
    pub fail_primary_every: Option<u32>,
    pub rates: Vec<RatePlan>,
}

impl SensorSuite for FakeSensors {
    fn read_primary(&mut self) -> ImuReading {
        self.reads += 1;
        let failed = matches!(self.fail_primary_every, Some(n) if self.reads % n == 0);
        let accel = Vector3 {
            x: 0.1 * self.reads as f32,
            y: -0.2,
            z: 9.81,
        };
        ImuReading {
            accel: (!failed).then_some(accel),
            gyro: Some(Vector3 { x: 0.01, y: 0.02, z: 0.03 }),
            mag: Some(Vector3 { x: 20.0, y: -5.0, z: 42.0 }),
        }
    }

    fn read_secondary(&mut self) -> ImuReading {
        ImuReading {
            accel: Some(Vector3 { x: 0.0, y: 0.0, z: 9.79 }),
            gyro: Some(Vector3::ZERO),
            mag: Some(Vector3 { x: 19.5, y: -4.5, z: 41.0 }),
        }
    }

    fn read_power(&mut self) -> Option<PowerReading> {
        Some(PowerReading::from_measurements(3.95, 180.0))
    }

    fn apply_rate(&mut self, plan: &RatePlan) -> Result<(), Error> {
        self.rates.push(*plan);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTimer {
    pub period_ms: Option<u32>,
    pub now_ms: u32,
}

impl PeriodicTimer for FakeTimer {
    fn arm(&mut self, period_ms: u32) -> Result<(), TimerError> {
        self.period_ms = Some(period_ms);
        Ok(())
    }

    fn disarm(&mut self) -> bool {
        self.period_ms = None;
        true
    }

    fn now_ms(&self) -> u32 {
        self.now_ms
    }
}

#[derive(Clone, Copy, Default)]
pub struct NoopDelay;

impl embedded_hal::delay::DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// In-memory socket; everything sent is recorded.
#[derive(Default)]
pub struct FakeSocket {
    pub inbound: VecDeque<(Vec<u8>, Peer)>,
    pub sent: Vec<(Vec<u8>, Peer)>,
    /// Fail every data packet send; replies still go out.
    pub refuse_data: bool,
}

impl FakeSocket {
    /// Data packets (by magic) delivered to `peer`, decoded.
    pub fn packets_to(&self, peer: Peer) -> Vec<Batch> {
        self.sent
            .iter()
            .filter(|(bytes, to)| *to == peer && bytes.starts_with(&[0xEF, 0xBE]))
            .map(|(bytes, _)| decode_packet(bytes).expect("valid packet"))
            .collect()
    }

    pub fn last_reply_to(&self, peer: Peer) -> Vec<u8> {
        self.sent
            .iter()
            .rev()
            .find(|(bytes, to)| *to == peer && !bytes.starts_with(&[0xEF, 0xBE]))
            .map(|(bytes, _)| bytes.clone())
            .expect("a reply")
    }
}

impl DatagramSocket for FakeSocket {
    type Endpoint = Peer;

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Peer), SocketError> {
        match self.inbound.pop_front() {
            Some((bytes, peer)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok((bytes.len(), peer))
            }
            None => core::future::pending().await,
        }
    }

    async fn send_to(&mut self, data: &[u8], to: Peer) -> Result<(), SocketError> {
        if self.refuse_data && data.starts_with(&[0xEF, 0xBE]) {
            return Err(SocketError::Send);
        }
        self.sent.push((data.to_vec(), to));
        Ok(())
    }

    async fn discard_pending(&mut self) -> usize {
        let n = self.inbound.len();
        self.inbound.clear();
        n
    }
}

pub fn sampler<'a>(lock: &'a ControlLock, config: SamplerConfig) -> TestSampler<'a> {
    Sampler::new(FakeSensors::default(), FakeTimer::default(), NoopDelay, lock, config)
}

pub fn handler<'a>(
    lock: &'a ControlLock,
    outbox: &'a TestOutbox,
    config: SamplerConfig,
) -> TestHandler<'a> {
    ProtocolHandler::new(sampler(lock, config), NoopDelay, lock, outbox)
}

/// Sends `command` from `peer` and returns the reply bytes.
pub fn command(handler: &mut TestHandler<'_>, socket: &mut FakeSocket, command: &[u8], peer: Peer) -> Vec<u8> {
    let before = socket.sent.len();
    embassy_futures::block_on(handler.handle_datagram(socket, command, peer));
    assert!(socket.sent.len() > before, "no reply to {:?}", String::from_utf8_lossy(command));
    socket.last_reply_to(peer)
}

/// Fires `n` timer ticks, forwarding whatever the sampler hands off.
pub fn ticks(handler: &mut TestHandler<'_>, socket: &mut FakeSocket, n: u32) {
    for _ in 0..n {
        let sampler = handler.control_mut();
        let period = sampler.timer().period_ms.unwrap_or(1);
        sampler.timer_mut().now_ms += period;
        sampler.tick();
        embassy_futures::block_on(handler.forward_pending(socket));
    }
}

pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// (generated, sent, errors) from a STOP reply.
pub fn stop_counters(reply: &[u8]) -> (u32, u32, u32) {
    assert_eq!(reply.len(), 12);
    (u32_at(reply, 0), u32_at(reply, 4), u32_at(reply, 8))
}
