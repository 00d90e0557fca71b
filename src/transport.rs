//! UDP command dispatcher and data forwarder.
//!
//! Runs in the cooperative network loop. It owns the socket and the client
//! binding, drives the sampler through [`SamplerControl`] and drains the
//! [`Outbox`] into data packets for the bound client.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::config::{RX_DATAGRAM_MAX, START_SETTLE_MS, STOP_SETTLE_MS};
use crate::ipc::{ControlLock, Outbox, OutboxSink};
use crate::protocol::{encode_packet, Batch, Command, PacketBuf, Response};
use crate::rate::RatePlan;
use crate::sampler::{Counters, SamplerControl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketError {
    Receive,
    Send,
}

/// Connectionless socket bound to the node's port.
#[allow(async_fn_in_trait)]
pub trait DatagramSocket {
    type Endpoint: Copy + PartialEq;

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Self::Endpoint), SocketError>;
    async fn send_to(&mut self, data: &[u8], to: Self::Endpoint) -> Result<(), SocketError>;
    /// Drops datagrams already queued for receive; returns how many.
    async fn discard_pending(&mut self) -> usize;
}

pub struct ProtocolHandler<'a, C, D, M: RawMutex, const N: usize, E> {
    control: C,
    delay: D,
    lock: &'a ControlLock,
    outbox: &'a Outbox<M, N>,
    client: Option<E>,
    send_failures: u32,
}

impl<'a, C, D, M, const N: usize, E> ProtocolHandler<'a, C, D, M, N, E>
where
    C: SamplerControl<Sink = OutboxSink<'a, M, N>>,
    D: DelayNs,
    M: RawMutex,
    E: Copy + PartialEq,
{
    pub fn new(control: C, delay: D, lock: &'a ControlLock, outbox: &'a Outbox<M, N>) -> Self {
        Self {
            control,
            delay,
            lock,
            outbox,
            client: None,
            send_failures: 0,
        }
    }

    /// Peer currently receiving data packets.
    pub fn client(&self) -> Option<E> {
        self.client
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Data packets the socket refused since the last START. Included in
    /// the error count of STOP and STATUS replies.
    pub fn send_failures(&self) -> u32 {
        self.send_failures
    }

    fn with_send_failures(&self, mut counters: Counters) -> Counters {
        counters.errors = counters.errors.wrapping_add(self.send_failures);
        counters
    }

    pub async fn run<S>(&mut self, socket: &mut S)
    where
        S: DatagramSocket<Endpoint = E>,
    {
        let outbox = self.outbox;
        let mut rx = [0u8; RX_DATAGRAM_MAX];
        info!("Protocol handler running");

        loop {
            let event = select(socket.recv_from(&mut rx), outbox.receive()).await;
            match event {
                Either::First(Ok((len, peer))) => {
                    self.handle_datagram(socket, &rx[..len], peer).await;
                }
                Either::First(Err(e)) => warn!("Receive failed: {:?}", e),
                Either::Second(batch) => self.forward(socket, &batch).await,
            }
        }
    }

    /// Dispatches one control datagram and sends its reply to `peer`.
    /// Anything that is not a command is ignored.
    pub async fn handle_datagram<S>(&mut self, socket: &mut S, datagram: &[u8], peer: E)
    where
        S: DatagramSocket<Endpoint = E>,
    {
        let Some(command) = Command::parse(datagram) else {
            debug!("Ignoring unknown datagram ({} bytes)", datagram.len());
            return;
        };
        debug!("Command {:?}", command);

        let response = match command {
            Command::SetRate(rate) => {
                Response::RateSet(self.control.configure(RatePlan::new(rate)).await)
            }
            Command::Start => Response::StartAck(self.start(socket, peer).await),
            Command::Stop => self.stop(socket).await,
            Command::Status => {
                let mut status = self.control.status().await;
                status.counters = self.with_send_failures(status.counters);
                Response::Status(status)
            }
            Command::Get => Response::Direct(self.control.read_direct().await),
        };

        if let Err(e) = socket.send_to(&response.encode(), peer).await {
            warn!("Failed to reply to {:?}: {:?}", command, e);
        }
    }

    async fn start<S>(&mut self, socket: &mut S, peer: E) -> bool
    where
        S: DatagramSocket<Endpoint = E>,
    {
        match self.client {
            Some(previous) if previous != peer => {
                info!("START from a new client, displacing the bound one")
            }
            Some(_) => debug!("START from the bound client"),
            None => info!("Client bound"),
        }
        self.client = Some(peer);

        self.lock.acquire();
        let stale_datagrams = socket.discard_pending().await;
        // batches left over belong to the previous session
        let stale_batches = self.outbox.clear();
        if stale_datagrams + stale_batches > 0 {
            debug!(
                "Drained {} datagrams and {} batches before start",
                stale_datagrams, stale_batches
            );
        }

        self.send_failures = 0;
        let started = self.control.start(self.outbox.sink()).await;
        self.delay.delay_ms(START_SETTLE_MS).await;
        self.lock.release();

        if !started {
            warn!("Sampler failed to start");
            self.client = None;
        }
        started
    }

    async fn stop<S>(&mut self, socket: &mut S) -> Response
    where
        S: DatagramSocket<Endpoint = E>,
    {
        self.lock.acquire();
        let counters = self.control.stop().await;
        self.delay.delay_ms(STOP_SETTLE_MS).await;
        // the flushed partial batch still goes to the client that asked for it
        self.forward_pending(socket).await;
        if self.client.take().is_some() {
            info!("Client unbound");
        }
        self.lock.release();
        Response::Stopped(self.with_send_failures(counters))
    }

    /// Forwards every batch already queued in the outbox.
    pub async fn forward_pending<S>(&mut self, socket: &mut S)
    where
        S: DatagramSocket<Endpoint = E>,
    {
        while let Some(batch) = self.outbox.try_receive() {
            self.forward(socket, &batch).await;
        }
    }

    async fn forward<S>(&mut self, socket: &mut S, batch: &Batch)
    where
        S: DatagramSocket<Endpoint = E>,
    {
        let Some(client) = self.client else {
            trace!("Dropping batch of {} records: no client bound", batch.len());
            return;
        };

        let mut packet = PacketBuf::new();
        if let Err(e) = encode_packet(batch, &mut packet) {
            error!("Failed to encode batch: {:?}", e);
            return;
        }
        if socket.send_to(&packet, client).await.is_err() {
            self.send_failures = self.send_failures.wrapping_add(1);
            if self.send_failures % 100 == 1 {
                warn!("Data send failure #{}", self.send_failures);
            }
        }
    }
}
