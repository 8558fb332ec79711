//! Bus adapter
//!
//! Presents the adapter through the SMBus-style [`SmbusBus`] client API.
//! Every operation takes one turn of the operation queue, so concurrent
//! callers never interleave their START...STOP brackets.

use embedded_io_async::ErrorType;
use i2cdriver_hal::i2c::DeviceId;
use i2cdriver_hal::{AddressList, I2cFuncs, SmbusBus, Transport};
use i2cdriver_protocol::{DeviceStatus, Direction};

use crate::blocking::BlockingBus;
use crate::config::DriverConfig;
use crate::device::I2cDevice;
use crate::error::Error;
use crate::fmt::{debug, error};
use crate::queue::{OperationQueue, Turn};
use crate::session::ProtocolSession;

/// Capabilities reported by the adapter
pub const ADAPTER_FUNCS: I2cFuncs = I2cFuncs {
    i2c: true,
    ten_bit_addr: false,
    protocol_mangling: false,
    smbus_pec: false,
    smbus_block_proc_call: true,
    smbus_quick: false,
    smbus_receive_byte: true,
    smbus_send_byte: true,
    smbus_read_byte: true,
    smbus_write_byte: true,
    smbus_read_word: true,
    smbus_write_word: true,
    smbus_proc_call: false,
    smbus_read_block: true,
    smbus_write_block: true,
    smbus_read_i2c_block: true,
    smbus_write_i2c_block: true,
};

type BusError<T> = Error<<T as ErrorType>::Error>;

/// An open adapter
///
/// Word operations transfer the high byte first.
pub struct BusAdapter<T> {
    queue: OperationQueue<ProtocolSession<T>>,
}

impl<T: Transport> BusAdapter<T> {
    /// Run the startup handshake on `transport` and return the ready adapter
    pub async fn open(transport: T, config: DriverConfig) -> Result<Self, BusError<T>> {
        let mut session = ProtocolSession::new(transport);
        if let Err(e) = session.initialize(&config).await {
            error!("adapter handshake failed");
            return Err(e);
        }
        debug!("adapter open");
        Ok(Self {
            queue: OperationQueue::new(session),
        })
    }

    /// Wait for exclusive access to the protocol session
    ///
    /// Use this to compose a custom bracket; the next queued operation runs
    /// once the returned turn is dropped.
    pub async fn session(&self) -> Turn<'_, ProtocolSession<T>> {
        self.queue.turn().await
    }

    /// embedded-hal async device handle
    pub fn device(&self) -> I2cDevice<'_, T> {
        I2cDevice::new(self)
    }

    /// Blocking handle
    pub fn blocking(&self) -> BlockingBus<'_, T> {
        BlockingBus::new(self)
    }

    /// Read the adapter's status record
    pub async fn status(&self) -> Result<DeviceStatus, BusError<T>> {
        self.session().await.status().await
    }

    /// Select the bus clock in kHz (100 or 400)
    pub async fn set_speed(&self, khz: u32) -> Result<(), BusError<T>> {
        self.session().await.set_speed(khz).await
    }

    /// Set the pullup control lines
    pub async fn set_pullups(&self, mask: u8) -> Result<(), BusError<T>> {
        self.session().await.set_pullups(mask).await
    }

    /// Reset the bus
    pub async fn reset(&self) -> Result<(), BusError<T>> {
        self.session().await.reset().await
    }

    /// Round-trip a byte through the adapter
    pub async fn echo(&self, byte: u8) -> Result<u8, BusError<T>> {
        self.session().await.echo(byte).await
    }

    /// Release the transport once every earlier operation has finished
    ///
    /// Returns `None` if it was already closed. Later operations fail with
    /// [`Error::TransportClosed`].
    pub async fn close(&self) -> Result<Option<T>, BusError<T>> {
        let transport = self.session().await.release();
        if transport.is_some() {
            debug!("adapter closed");
        }
        Ok(transport)
    }

    /// Consume the adapter and return the transport, if still attached
    pub fn into_transport(self) -> Option<T> {
        self.queue.into_inner().release()
    }
}

impl<T: Transport> SmbusBus for BusAdapter<T> {
    type Error = BusError<T>;

    fn i2c_funcs(&self) -> I2cFuncs {
        ADAPTER_FUNCS
    }

    async fn scan(&self, low: u8, high: u8) -> Result<AddressList, Self::Error> {
        let result = self.session().await.scan().await?;
        Ok(result.between(low, high).collect())
    }

    async fn i2c_read(
        &self,
        address: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let length = length.min(buffer.len());
        let mut session = self.session().await;
        session.start(address, Direction::Read).await?;
        session.read_chunked(&mut buffer[..length]).await?;
        session.stop().await?;
        Ok(length)
    }

    async fn i2c_write(
        &self,
        address: u8,
        length: usize,
        buffer: &[u8],
    ) -> Result<usize, Self::Error> {
        let length = length.min(buffer.len());
        let mut session = self.session().await;
        session.start(address, Direction::Write).await?;
        session.write_chunked(&buffer[..length]).await?;
        session.stop().await?;
        Ok(length)
    }

    async fn read_byte(&self, address: u8, command: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];
        self.session()
            .await
            .register_read(address, &[command], &mut value)
            .await?;
        Ok(value[0])
    }

    async fn read_word(&self, address: u8, command: u8) -> Result<u16, Self::Error> {
        let mut value = [0u8; 2];
        self.session()
            .await
            .register_read(address, &[command], &mut value)
            .await?;
        Ok(u16::from_be_bytes(value))
    }

    async fn read_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let length = length.min(buffer.len());
        self.session()
            .await
            .register_read(address, &[command], &mut buffer[..length])
            .await?;
        Ok(length)
    }

    async fn write_byte(&self, address: u8, command: u8, byte: u8) -> Result<(), Self::Error> {
        self.session()
            .await
            .register_write(address, &[command], &[byte])
            .await
    }

    async fn write_word(&self, address: u8, command: u8, word: u16) -> Result<(), Self::Error> {
        self.session()
            .await
            .register_write(address, &[command], &word.to_be_bytes())
            .await
    }

    async fn write_quick(&self, _address: u8, _bit: bool) -> Result<(), Self::Error> {
        Err(Error::NotImplemented)
    }

    async fn write_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &[u8],
    ) -> Result<usize, Self::Error> {
        let length = length.min(buffer.len());
        self.session()
            .await
            .register_write(address, &[command], &buffer[..length])
            .await?;
        Ok(length)
    }

    async fn device_id(&self, _address: u8) -> Result<DeviceId, Self::Error> {
        Err(Error::NotImplemented)
    }
}
