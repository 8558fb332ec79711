//! Blocking bus handle
//!
//! Drives the async adapter to completion on the calling thread, for
//! callers that cannot await. Implements `embedded_hal::i2c::I2c` and
//! mirrors the [`SmbusBus`] operation set.

use embassy_futures::block_on;
use embedded_hal::i2c::{ErrorType, I2c, Operation};
use embedded_hal_async::i2c::I2c as _;
use i2cdriver_hal::i2c::DeviceId;
use i2cdriver_hal::{AddressList, I2cFuncs, SmbusBus, Transport};
use i2cdriver_protocol::DeviceStatus;

use crate::bus::BusAdapter;
use crate::error::Error;

type BlockingResult<R, T> = Result<R, Error<<T as embedded_io_async::ErrorType>::Error>>;

/// Blocking view of a [`BusAdapter`]
///
/// Every call busy-polls its future; do not use it from inside an async
/// executor that also drives the adapter.
pub struct BlockingBus<'a, T> {
    adapter: &'a BusAdapter<T>,
}

impl<T> Clone for BlockingBus<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BlockingBus<'_, T> {}

impl<'a, T: Transport> BlockingBus<'a, T> {
    pub(crate) fn new(adapter: &'a BusAdapter<T>) -> Self {
        Self { adapter }
    }

    /// Capabilities reported by the adapter
    pub fn i2c_funcs(&self) -> I2cFuncs {
        self.adapter.i2c_funcs()
    }

    /// Addresses strictly between `low` and `high` that acknowledged
    pub fn scan(&self, low: u8, high: u8) -> BlockingResult<AddressList, T> {
        block_on(self.adapter.scan(low, high))
    }

    /// Scan the usual 0x03..0x77 window
    pub fn scan_default(&self) -> BlockingResult<AddressList, T> {
        block_on(self.adapter.scan_default())
    }

    /// Plain read of up to `length` bytes
    pub fn i2c_read(
        &self,
        address: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> BlockingResult<usize, T> {
        block_on(self.adapter.i2c_read(address, length, buffer))
    }

    /// Plain write of up to `length` bytes
    pub fn i2c_write(&self, address: u8, length: usize, buffer: &[u8]) -> BlockingResult<usize, T> {
        block_on(self.adapter.i2c_write(address, length, buffer))
    }

    /// Read one byte from register `command`
    pub fn read_byte(&self, address: u8, command: u8) -> BlockingResult<u8, T> {
        block_on(self.adapter.read_byte(address, command))
    }

    /// Read a big-endian word from register `command`
    pub fn read_word(&self, address: u8, command: u8) -> BlockingResult<u16, T> {
        block_on(self.adapter.read_word(address, command))
    }

    /// Read `length` bytes starting at register `command`
    pub fn read_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> BlockingResult<usize, T> {
        block_on(
            self.adapter
                .read_i2c_block(address, command, length, buffer),
        )
    }

    /// Read one byte without a register address
    pub fn receive_byte(&self, address: u8) -> BlockingResult<u8, T> {
        block_on(self.adapter.receive_byte(address))
    }

    /// Write one byte without a register address
    pub fn send_byte(&self, address: u8, byte: u8) -> BlockingResult<(), T> {
        block_on(self.adapter.send_byte(address, byte))
    }

    /// Write one byte to register `command`
    pub fn write_byte(&self, address: u8, command: u8, byte: u8) -> BlockingResult<(), T> {
        block_on(self.adapter.write_byte(address, command, byte))
    }

    /// Write a big-endian word to register `command`
    pub fn write_word(&self, address: u8, command: u8, word: u16) -> BlockingResult<(), T> {
        block_on(self.adapter.write_word(address, command, word))
    }

    /// Always fails with [`Error::NotImplemented`]
    pub fn write_quick(&self, address: u8, bit: bool) -> BlockingResult<(), T> {
        block_on(self.adapter.write_quick(address, bit))
    }

    /// Write `length` bytes starting at register `command`
    pub fn write_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &[u8],
    ) -> BlockingResult<usize, T> {
        block_on(
            self.adapter
                .write_i2c_block(address, command, length, buffer),
        )
    }

    /// Always fails with [`Error::NotImplemented`]
    pub fn device_id(&self, address: u8) -> BlockingResult<DeviceId, T> {
        block_on(self.adapter.device_id(address))
    }

    /// Read the adapter's status record
    pub fn status(&self) -> BlockingResult<DeviceStatus, T> {
        block_on(self.adapter.status())
    }

    /// Release the transport; `None` if already closed
    pub fn close(&self) -> BlockingResult<Option<T>, T> {
        block_on(self.adapter.close())
    }
}

impl<T: Transport> ErrorType for BlockingBus<'_, T> {
    type Error = Error<T::Error>;
}

impl<T: Transport> I2c for BlockingBus<'_, T> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut device = self.adapter.device();
        block_on(device.transaction(address, operations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::sim::SimAdapter;

    fn open(sim: &SimAdapter) -> BusAdapter<SimAdapter> {
        let adapter = block_on(BusAdapter::open(sim.clone(), DriverConfig::default()))
            .ok()
            .unwrap();
        sim.clear();
        adapter
    }

    #[test]
    fn test_blocking_smbus_calls() {
        let mut memory = [0u8; 8];
        memory[2] = 0xAB;
        memory[3] = 0xCD;
        let sim = SimAdapter::new().with_device(0x40, 1, &memory);
        let adapter = open(&sim);
        let bus = adapter.blocking();

        assert_eq!(&bus.scan_default().unwrap()[..], &[0x40]);
        assert_eq!(bus.read_word(0x40, 0x02).unwrap(), 0xABCD);
        bus.write_byte(0x40, 0x05, 0x11).unwrap();
        assert_eq!(bus.read_byte(0x40, 0x05).unwrap(), 0x11);
        assert_eq!(bus.write_quick(0x40, false), Err(Error::NotImplemented));
        assert_eq!(bus.status().unwrap().identifier.as_str(), "i2cdriver1");
        assert!(bus.i2c_funcs().smbus_read_i2c_block);
    }

    #[test]
    fn test_blocking_embedded_hal() {
        let sim = SimAdapter::new().with_device(0x40, 1, &[0x00, 0x5A]);
        let adapter = open(&sim);
        let mut bus = adapter.blocking();

        let mut value = [0u8; 1];
        bus.write_read(0x40, &[0x01], &mut value).unwrap();
        assert_eq!(value, [0x5A]);
    }

    #[test]
    fn test_blocking_close() {
        let sim = SimAdapter::new();
        let adapter = open(&sim);
        let bus = adapter.blocking();

        assert!(bus.close().ok().unwrap().is_some());
        assert!(bus.close().ok().unwrap().is_none());
        assert_eq!(bus.read_byte(0x40, 0x00), Err(Error::TransportClosed));
    }
}
