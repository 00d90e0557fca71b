#![cfg_attr(not(test), no_std)]

// must come first so every module sees the logging macros
#[macro_use]
mod fmt;

pub mod config;
pub mod drivers;
pub mod ipc;
pub mod protocol;
pub mod rate;
pub mod sampler;
pub mod sensors;
pub mod transport;

#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod tasks;

#[cfg(test)]
mod testing;

pub use config::SamplerConfig;
pub use drivers::{ImuReading, Vector3};
pub use protocol::{Batch, Command, Response, SampleRecord};
pub use rate::{RatePlan, SampleRate};
pub use sampler::{Counters, Sampler, SamplerControl, SamplerStatus};
pub use sensors::{DualImuRig, SensorSuite};
pub use transport::{DatagramSocket, ProtocolHandler};
