use core::cell::RefCell;

use embedded_hal::i2c::{ErrorType, I2c, Operation};

/// Per-driver handle onto one I²C peripheral.
///
/// All handles live in the sampling context and never hold the borrow
/// across calls, so a `RefCell` is sufficient.
pub struct SharedBus<'a, I2C> {
    bus: &'a RefCell<I2C>,
}

impl<I2C> Clone for SharedBus<'_, I2C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I2C> Copy for SharedBus<'_, I2C> {}

impl<'a, I2C> SharedBus<'a, I2C> {
    pub fn new(bus: &'a RefCell<I2C>) -> Self {
        Self { bus }
    }
}

impl<I2C: ErrorType> ErrorType for SharedBus<'_, I2C> {
    type Error = I2C::Error;
}

impl<I2C: I2c> I2c for SharedBus<'_, I2C> {
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.borrow_mut().read(address, read)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.borrow_mut().write(address, write)
    }

    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.borrow_mut().write_read(address, write, read)
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.borrow_mut().transaction(address, operations)
    }
}
