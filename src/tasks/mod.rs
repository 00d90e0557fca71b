use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::OUTBOX_DEPTH;
use crate::ipc::{ControlLock, Outbox, OutboxSink, SamplerLink};

pub mod network;
pub mod sampling;

pub use network::{cyw43_task, net_task, start_access_point, udp_task, NetSocket};
pub use sampling::{sampling_task, TickTimer};

pub type FirmwareSink = OutboxSink<'static, CriticalSectionRawMutex, OUTBOX_DEPTH>;

/// Held by the network loop across start/stop transitions.
pub static CONTROL_LOCK: ControlLock = ControlLock::new();

/// Full batches on their way from the sampling task to the UDP task.
pub static OUTBOX: Outbox<CriticalSectionRawMutex, OUTBOX_DEPTH> = Outbox::new();

pub static SAMPLER_LINK: SamplerLink<CriticalSectionRawMutex, FirmwareSink> =
    SamplerLink::new();
