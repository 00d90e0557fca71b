//! Wire protocol: data packets, control commands and their replies.
//!
//! Everything on the wire is little-endian. Records and reply frames are
//! `Pod` structs whose in-memory layout is the wire layout, so encoding is a
//! byte copy.

use bytemuck::{Pod, Zeroable};
use heapless::Vec;

use crate::config::MAX_BATCH_SIZE;
use crate::drivers::ImuReading;
use crate::rate::SampleRate;
use crate::sampler::{Counters, SamplerStatus};
use crate::sensors::PowerReading;

const _: () = assert!(cfg!(target_endian = "little"), "wire structs assume little-endian");

/* ───── Data packets ───── */
pub const PACKET_MAGIC: u16 = 0xBEEF;
pub const PACKET_HEADER_LEN: usize = 4;
pub const RECORD_LEN: usize = 76;
pub const MAX_PACKET_LEN: usize = PACKET_HEADER_LEN + MAX_BATCH_SIZE * RECORD_LEN;

/* ───── Control replies ───── */
pub const START_ACK_OK: u16 = 0x0ACE;
pub const START_ACK_FAILED: u16 = 0xFFFF;
pub const RATE_REPLY_LEN: usize = 1;
pub const START_REPLY_LEN: usize = 2;
pub const STOP_REPLY_LEN: usize = 12;
pub const STATUS_REPLY_LEN: usize = 17;
pub const DIRECT_REPLY_LEN: usize = 88;

/* ───── Control requests ───── */
const CMD_SET_RATE_25: &[u8] = b"SET_RATE_25";
const CMD_SET_RATE_50: &[u8] = b"SET_RATE_50";
const CMD_SET_RATE_100: &[u8] = b"SET_RATE_100";
const CMD_SET_RATE_200: &[u8] = b"SET_RATE_200";
const CMD_START: &[u8] = b"START";
const CMD_STOP: &[u8] = b"STOP";
const CMD_STATUS: &[u8] = b"STATUS";
const CMD_GET: &[u8] = b"GET";

/// One synchronized sample of both sensor sets.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Zeroable, Pod)]
pub struct SampleRecord {
    pub timestamp_ms: u32,
    /// accel, gyro, mag (x/y/z each) of the primary IMU
    pub primary: [f32; 9],
    /// same order, secondary sensors
    pub secondary: [f32; 9],
}

const _: () = assert!(core::mem::size_of::<SampleRecord>() == RECORD_LEN);

impl SampleRecord {
    pub fn new(timestamp_ms: u32, primary: &ImuReading, secondary: &ImuReading) -> Self {
        Self {
            timestamp_ms,
            primary: primary.to_array(),
            secondary: secondary.to_array(),
        }
    }
}

pub type Batch = Vec<SampleRecord, MAX_BATCH_SIZE>;
pub type PacketBuf = Vec<u8, MAX_PACKET_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    TooShort,
    BadMagic(u16),
    CountMismatch { declared: u16, present: usize },
    TooManyRecords,
}

/// Serializes `records` as `magic, count, records…`.
pub fn encode_packet(records: &[SampleRecord], out: &mut PacketBuf) -> Result<(), WireError> {
    if records.len() > MAX_BATCH_SIZE {
        return Err(WireError::TooManyRecords);
    }
    out.clear();
    // capacity covers MAX_BATCH_SIZE records, checked above
    let _ = out.extend_from_slice(&PACKET_MAGIC.to_le_bytes());
    let _ = out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    let _ = out.extend_from_slice(bytemuck::cast_slice(records));
    Ok(())
}

pub fn decode_packet(bytes: &[u8]) -> Result<Batch, WireError> {
    if bytes.len() < PACKET_HEADER_LEN {
        return Err(WireError::TooShort);
    }
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if magic != PACKET_MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    let declared = u16::from_le_bytes([bytes[2], bytes[3]]);
    let body = &bytes[PACKET_HEADER_LEN..];
    if body.len() != declared as usize * RECORD_LEN {
        return Err(WireError::CountMismatch {
            declared,
            present: body.len() / RECORD_LEN,
        });
    }

    let mut batch = Batch::new();
    for chunk in body.chunks_exact(RECORD_LEN) {
        batch
            .push(bytemuck::pod_read_unaligned(chunk))
            .map_err(|_| WireError::TooManyRecords)?;
    }
    Ok(batch)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetRate(SampleRate),
    Start,
    Stop,
    Status,
    Get,
}

impl Command {
    /// Exact ASCII match; anything else is not a command.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        Some(match datagram {
            CMD_SET_RATE_25 => Command::SetRate(SampleRate::Hz25),
            CMD_SET_RATE_50 => Command::SetRate(SampleRate::Hz50),
            CMD_SET_RATE_100 => Command::SetRate(SampleRate::Hz100),
            CMD_SET_RATE_200 => Command::SetRate(SampleRate::Hz200),
            CMD_START => Command::Start,
            CMD_STOP => Command::Stop,
            CMD_STATUS => Command::Status,
            CMD_GET => Command::Get,
            _ => return None,
        })
    }
}

/// Sensors and power telemetry from one `GET`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectReading {
    pub primary: [f32; 9],
    pub secondary: [f32; 9],
    pub power: PowerReading,
}

impl DirectReading {
    pub fn new(primary: &ImuReading, secondary: &ImuReading, power: PowerReading) -> Self {
        Self {
            primary: primary.to_array(),
            secondary: secondary.to_array(),
            power,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct StopFrame {
    generated: u32,
    sent: u32,
    errors: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct StatusFrame {
    active: u8,
    rate: u32,
    generated: u32,
    sent: u32,
    errors: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct DirectFrame {
    timestamp: f32,
    primary: [f32; 9],
    secondary: [f32; 9],
    voltage: f32,
    current: f32,
    percentage: f32,
}

const _: () = assert!(core::mem::size_of::<StopFrame>() == STOP_REPLY_LEN);
const _: () = assert!(core::mem::size_of::<StatusFrame>() == STATUS_REPLY_LEN);
const _: () = assert!(core::mem::size_of::<DirectFrame>() == DIRECT_REPLY_LEN);

pub type ReplyBuf = Vec<u8, DIRECT_REPLY_LEN>;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    RateSet(bool),
    StartAck(bool),
    Stopped(Counters),
    Status(SamplerStatus),
    Direct(DirectReading),
}

impl Response {
    pub fn encode(&self) -> ReplyBuf {
        let frame = match *self {
            Response::RateSet(ok) => ReplyBuf::from_slice(&[ok as u8]),
            Response::StartAck(ok) => {
                let ack = if ok { START_ACK_OK } else { START_ACK_FAILED };
                ReplyBuf::from_slice(&ack.to_le_bytes())
            }
            Response::Stopped(c) => ReplyBuf::from_slice(bytemuck::bytes_of(&StopFrame {
                generated: c.generated,
                sent: c.sent,
                errors: c.errors,
            })),
            Response::Status(s) => ReplyBuf::from_slice(bytemuck::bytes_of(&StatusFrame {
                active: s.active as u8,
                rate: s.rate.hz(),
                generated: s.counters.generated,
                sent: s.counters.sent,
                errors: s.counters.errors,
            })),
            Response::Direct(d) => ReplyBuf::from_slice(bytemuck::bytes_of(&DirectFrame {
                timestamp: 0.0,
                primary: d.primary,
                secondary: d.secondary,
                voltage: d.power.voltage,
                current: d.power.current,
                percentage: d.power.percentage,
            })),
        };
        // DIRECT_REPLY_LEN is the largest frame
        frame.unwrap_or_default()
    }
}
