//! Register-map fake of the sensor bus for driver unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

const BANK_SEL: u8 = 0x7F;

#[derive(Default)]
struct Device {
    /// ICM-20948 style `REG_BANK_SEL` at 0x7F.
    banked: bool,
    /// INA219 style 16-bit big-endian registers.
    word: bool,
    bank: u8,
    regs: HashMap<(u8, u8), u8>,
    words: HashMap<u8, u16>,
    pointer: u8,
}

#[derive(Default)]
struct State {
    devices: HashMap<u8, Device>,
    failing_reads: HashSet<(u8, u8, u8)>,
    writes: Vec<(u8, Vec<u8>)>,
    reads: Vec<(u8, u8, usize)>,
}

/// Cloneable handle; clones share the same register maps.
#[derive(Clone, Default)]
pub struct FakeI2c {
    state: Rc<RefCell<State>>,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, addr: u8) -> &Self {
        self.state.borrow_mut().devices.insert(addr, Device::default());
        self
    }

    pub fn add_banked_device(&self, addr: u8) -> &Self {
        self.state.borrow_mut().devices.insert(
            addr,
            Device {
                banked: true,
                ..Device::default()
            },
        );
        self
    }

    pub fn add_word_device(&self, addr: u8) -> &Self {
        self.state.borrow_mut().devices.insert(
            addr,
            Device {
                word: true,
                ..Device::default()
            },
        );
        self
    }

    pub fn set(&self, addr: u8, bank: u8, reg: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let dev = state.devices.get_mut(&addr).expect("unknown device");
        for (i, b) in bytes.iter().enumerate() {
            dev.regs.insert((bank, reg + i as u8), *b);
        }
    }

    pub fn set_word(&self, addr: u8, reg: u8, value: u16) {
        let mut state = self.state.borrow_mut();
        let dev = state.devices.get_mut(&addr).expect("unknown device");
        dev.words.insert(reg, value);
    }

    pub fn get(&self, addr: u8, bank: u8, reg: u8) -> Option<u8> {
        let state = self.state.borrow();
        state.devices.get(&addr)?.regs.get(&(bank, reg)).copied()
    }

    pub fn get_word(&self, addr: u8, reg: u8) -> Option<u16> {
        let state = self.state.borrow();
        state.devices.get(&addr)?.words.get(&reg).copied()
    }

    pub fn fail_reads(&self, addr: u8, bank: u8, reg: u8, failing: bool) {
        let mut state = self.state.borrow_mut();
        if failing {
            state.failing_reads.insert((addr, bank, reg));
        } else {
            state.failing_reads.remove(&(addr, bank, reg));
        }
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.borrow().writes.clone()
    }

    /// `(address, register, length)` of every read since the last clear.
    pub fn reads(&self) -> Vec<(u8, u8, usize)> {
        self.state.borrow().reads.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.writes.clear();
        state.reads.clear();
    }
}

impl ErrorType for FakeI2c {
    type Error = ErrorKind;
}

impl I2c for FakeI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let State {
            devices,
            failing_reads,
            writes,
            reads,
        } = &mut *state;
        let dev = devices
            .get_mut(&address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;

        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    writes.push((address, bytes.to_vec()));
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    dev.pointer = if dev.banked { reg } else { reg & 0x7F };
                    if dev.word {
                        if let [hi, lo] = data {
                            dev.words.insert(dev.pointer, u16::from_be_bytes([*hi, *lo]));
                        }
                        continue;
                    }
                    for (i, b) in data.iter().enumerate() {
                        dev.regs.insert((dev.bank, dev.pointer + i as u8), *b);
                    }
                    if dev.banked && reg == BANK_SEL {
                        if let Some(b) = data.first() {
                            dev.bank = b >> 4;
                        }
                    }
                }
                Operation::Read(buf) => {
                    reads.push((address, dev.pointer, buf.len()));
                    if failing_reads.contains(&(address, dev.bank, dev.pointer)) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }
                    if dev.word {
                        let w = dev.words.get(&dev.pointer).copied().unwrap_or(0);
                        buf.copy_from_slice(&w.to_be_bytes()[..buf.len()]);
                        continue;
                    }
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = dev
                            .regs
                            .get(&(dev.bank, dev.pointer + i as u8))
                            .copied()
                            .unwrap_or(0);
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
