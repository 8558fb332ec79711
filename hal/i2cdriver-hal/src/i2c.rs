//! I2C bus client abstractions
//!
//! Provides an SMBus-shaped client trait modelled on the operation set that
//! userspace I2C bus libraries expose, so code written against a kernel
//! `i2c-dev` style bus can run over any adapter that implements it.

use heapless::Vec;

/// Lowest address reported by a default scan (exclusive)
pub const DEFAULT_SCAN_LOW: u8 = 0x03;

/// Highest address reported by a default scan (exclusive)
pub const DEFAULT_SCAN_HIGH: u8 = 0x77;

/// Addresses found by a scan
pub type AddressList = Vec<u8, 128>;

/// Adapter functionality flags
///
/// Mirrors the `I2C_FUNC_*` capability bits reported by I2C bus drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cFuncs {
    /// Plain I2C transfers
    pub i2c: bool,
    /// 10-bit addressing
    pub ten_bit_addr: bool,
    /// Protocol mangling (ignore NAK, no start, ...)
    pub protocol_mangling: bool,
    /// SMBus packet error checking
    pub smbus_pec: bool,
    /// SMBus block process call
    pub smbus_block_proc_call: bool,
    /// SMBus quick command
    pub smbus_quick: bool,
    /// SMBus receive byte
    pub smbus_receive_byte: bool,
    /// SMBus send byte
    pub smbus_send_byte: bool,
    /// SMBus read byte data
    pub smbus_read_byte: bool,
    /// SMBus write byte data
    pub smbus_write_byte: bool,
    /// SMBus read word data
    pub smbus_read_word: bool,
    /// SMBus write word data
    pub smbus_write_word: bool,
    /// SMBus process call
    pub smbus_proc_call: bool,
    /// SMBus block read
    pub smbus_read_block: bool,
    /// SMBus block write
    pub smbus_write_block: bool,
    /// I2C block read
    pub smbus_read_i2c_block: bool,
    /// I2C block write
    pub smbus_write_i2c_block: bool,
}

/// Manufacturer and part identification read with the I2C device-ID command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId {
    /// 12-bit manufacturer code
    pub manufacturer: u16,
    /// 9-bit part identification
    pub product: u16,
    /// 3-bit die revision
    pub revision: u8,
}

/// SMBus-style I2C bus client
///
/// All methods take `&self` so a single bus can be shared by several
/// concurrent callers; implementations are responsible for keeping each
/// operation's START...STOP sequence from interleaving with others.
///
/// Word operations use the byte order documented by the implementation.
pub trait SmbusBus {
    /// Error type for bus operations
    type Error;

    /// Capabilities of this bus (no I/O)
    fn i2c_funcs(&self) -> I2cFuncs;

    /// Scan for devices and return those strictly between `low` and `high`
    async fn scan(&self, low: u8, high: u8) -> Result<AddressList, Self::Error>;

    /// Scan using the conventional address window (0x03, 0x77)
    async fn scan_default(&self) -> Result<AddressList, Self::Error> {
        self.scan(DEFAULT_SCAN_LOW, DEFAULT_SCAN_HIGH).await
    }

    /// Plain I2C read of up to `length` bytes into `buffer`
    ///
    /// Returns the number of bytes read.
    async fn i2c_read(
        &self,
        address: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> Result<usize, Self::Error>;

    /// Plain I2C write of up to `length` bytes from `buffer`
    ///
    /// Returns the number of bytes written.
    async fn i2c_write(
        &self,
        address: u8,
        length: usize,
        buffer: &[u8],
    ) -> Result<usize, Self::Error>;

    /// Read a byte from register `command`
    async fn read_byte(&self, address: u8, command: u8) -> Result<u8, Self::Error>;

    /// Read a word from register `command`
    async fn read_word(&self, address: u8, command: u8) -> Result<u16, Self::Error>;

    /// Read up to `length` bytes starting at register `command`
    async fn read_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &mut [u8],
    ) -> Result<usize, Self::Error>;

    /// Read a single byte without selecting a register
    async fn receive_byte(&self, address: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c_read(address, 1, &mut buf).await?;
        Ok(buf[0])
    }

    /// Write a single byte without selecting a register
    async fn send_byte(&self, address: u8, byte: u8) -> Result<(), Self::Error> {
        self.i2c_write(address, 1, &[byte]).await?;
        Ok(())
    }

    /// Write a byte to register `command`
    async fn write_byte(&self, address: u8, command: u8, byte: u8) -> Result<(), Self::Error>;

    /// Write a word to register `command`
    async fn write_word(&self, address: u8, command: u8, word: u16) -> Result<(), Self::Error>;

    /// Send a single bit in place of the R/W bit
    async fn write_quick(&self, address: u8, bit: bool) -> Result<(), Self::Error>;

    /// Write up to `length` bytes starting at register `command`
    async fn write_i2c_block(
        &self,
        address: u8,
        command: u8,
        length: usize,
        buffer: &[u8],
    ) -> Result<usize, Self::Error>;

    /// Read the device-ID of the device at `address`
    async fn device_id(&self, address: u8) -> Result<DeviceId, Self::Error>;
}
