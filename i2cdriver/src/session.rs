//! Protocol session
//!
//! Owns the transport and turns I2C primitives into adapter command frames
//! plus acknowledgement checks. A bracket looks like:
//!
//! ```text
//! Idle ──start(addr, W)──▶ Open(Write) ──write*──┐
//!  ▲                                             │ start(addr, R)
//!  │                                             ▼
//!  └───────────────stop─────────────────── Open(Read) ──read*
//! ```
//!
//! The session does not serialize callers itself; it is meant to be owned
//! by an [`OperationQueue`](crate::queue::OperationQueue).

use embedded_io_async::ErrorType;
use i2cdriver_hal::Transport;
use i2cdriver_protocol::command::RESYNC_BYTE;
use i2cdriver_protocol::{
    decode_ack, BusSpeed, Command, DeviceStatus, Direction, ScanResult, MAX_COMMAND_SIZE,
    MAX_TRANSFER, SCAN_RESPONSE_SIZE, STATUS_RESPONSE_SIZE,
};

use crate::config::DriverConfig;
use crate::error::Error;
use crate::fmt::{debug, trace, warn};

/// Number of resync bytes sent during the handshake
const RESYNC_RUN: usize = 64;

/// Widest register address accepted by register reads and writes
pub const MAX_REGISTER_WIDTH: usize = 4;

/// Session-level view of the current bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionState {
    /// No START outstanding
    Idle,
    /// START acknowledged in this direction
    Open(Direction),
}

type SessionError<T> = Error<<T as ErrorType>::Error>;

/// Command/response session with one adapter
pub struct ProtocolSession<T> {
    transport: Option<T>,
    state: TransactionState,
}

/// Check a register address width and return it as a number
fn register_base<E>(register: &[u8]) -> Result<u32, Error<E>> {
    if register.is_empty() || register.len() > MAX_REGISTER_WIDTH {
        return Err(Error::InvalidCommand);
    }
    Ok(register
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32))
}

impl<T: Transport> ProtocolSession<T> {
    /// Wrap a transport; no bytes are exchanged until [`initialize`](Self::initialize)
    pub const fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            state: TransactionState::Idle,
        }
    }

    /// Current bracket state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// True until the transport has been released
    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// Hand back the transport
    ///
    /// Every later operation fails with [`Error::TransportClosed`].
    pub fn release(&mut self) -> Option<T> {
        self.state = TransactionState::Idle;
        self.transport.take()
    }

    fn transport(&mut self) -> Result<&mut T, SessionError<T>> {
        self.transport.as_mut().ok_or(Error::TransportClosed)
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), SessionError<T>> {
        let transport = self.transport()?;
        transport.write_all(bytes).await.map_err(Error::Transport)?;
        transport.flush().await.map_err(Error::Transport)
    }

    async fn send(&mut self, command: Command<'_>) -> Result<(), SessionError<T>> {
        let mut frame = [0u8; MAX_COMMAND_SIZE];
        let len = command.encode(&mut frame)?;
        trace!("tx {:?}", command);
        self.send_raw(&frame[..len]).await
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(), SessionError<T>> {
        self.transport()?.read_exact(buffer).await?;
        Ok(())
    }

    async fn receive_ack(&mut self) -> Result<bool, SessionError<T>> {
        let mut byte = [0u8; 1];
        self.receive(&mut byte).await?;
        Ok(decode_ack(byte[0]))
    }

    /// Bring the adapter to a known state
    ///
    /// Flushes any half-received command, resets the bus, runs a throwaway
    /// scan, then applies the configured speed and pullups. The pullup mask
    /// is checked before anything is sent.
    pub async fn initialize(&mut self, config: &DriverConfig) -> Result<(), SessionError<T>> {
        if let Some(mask) = config.pullups {
            Command::pullups(mask)?;
        }
        debug!("handshake: resync");

        self.send_raw(&[RESYNC_BYTE]).await?;
        self.reset().await?;
        self.send_raw(&[RESYNC_BYTE; RESYNC_RUN]).await?;
        self.reset().await?;
        self.scan().await?;

        self.select_speed(config.speed).await?;
        if let Some(mask) = config.pullups {
            self.set_pullups(mask).await?;
        }
        debug!("handshake: done at {} kHz", config.speed.khz());
        Ok(())
    }

    /// Select the bus clock in kHz (100 or 400)
    pub async fn set_speed(&mut self, khz: u32) -> Result<(), SessionError<T>> {
        let speed = BusSpeed::from_khz(khz).ok_or(Error::UnsupportedSpeed(khz))?;
        self.select_speed(speed).await
    }

    /// Select the bus clock
    pub async fn select_speed(&mut self, speed: BusSpeed) -> Result<(), SessionError<T>> {
        self.send(Command::Speed(speed)).await
    }

    /// Set the pullup control lines (mask 0..=0b111111)
    pub async fn set_pullups(&mut self, mask: u8) -> Result<(), SessionError<T>> {
        self.send(Command::pullups(mask)?).await
    }

    /// Probe 0x08..=0x77 and report which addresses acknowledged
    pub async fn scan(&mut self) -> Result<ScanResult, SessionError<T>> {
        self.send(Command::Scan).await?;
        let mut response = [0u8; SCAN_RESPONSE_SIZE];
        self.receive(&mut response).await?;
        Ok(ScanResult::decode(&response)?)
    }

    /// Reset the bus
    pub async fn reset(&mut self) -> Result<(), SessionError<T>> {
        self.send(Command::Reset).await?;
        self.state = TransactionState::Idle;
        Ok(())
    }

    /// Send a byte and return what the adapter echoed
    pub async fn echo(&mut self, byte: u8) -> Result<u8, SessionError<T>> {
        self.send(Command::Echo(byte)).await?;
        let mut reply = [0u8; 1];
        self.receive(&mut reply).await?;
        Ok(reply[0])
    }

    /// Read and decode the status record
    pub async fn status(&mut self) -> Result<DeviceStatus, SessionError<T>> {
        self.send(Command::Status).await?;
        let mut response = [0u8; STATUS_RESPONSE_SIZE];
        self.receive(&mut response).await?;
        Ok(DeviceStatus::decode(&response)?)
    }

    /// Send START for `address` in `direction`
    ///
    /// On success the bracket is open until [`stop`](Self::stop).
    pub async fn start(
        &mut self,
        address: u8,
        direction: Direction,
    ) -> Result<(), SessionError<T>> {
        self.send(Command::start(address, direction)?).await?;
        if !self.receive_ack().await? {
            warn!("start {:#x} {:?}: nack", address, direction);
            return Err(Error::StartFailed(address));
        }
        self.state = TransactionState::Open(direction);
        Ok(())
    }

    /// Fill `buffer` from the open read bracket, 64 bytes per command
    ///
    /// Reads past the first window rely on the device keeping its own read
    /// cursor between commands.
    pub async fn read_chunked(&mut self, buffer: &mut [u8]) -> Result<(), SessionError<T>> {
        debug_assert_eq!(self.state, TransactionState::Open(Direction::Read));
        for chunk in buffer.chunks_mut(MAX_TRANSFER) {
            self.send(Command::read(chunk.len())?).await?;
            self.receive(chunk).await?;
        }
        Ok(())
    }

    /// Write `data` to the open write bracket, 64 bytes per command
    ///
    /// Stops at the first slice the adapter does not acknowledge.
    pub async fn write_chunked(&mut self, data: &[u8]) -> Result<(), SessionError<T>> {
        self.write_gathered(&[data]).await
    }

    /// Write several buffers as one contiguous byte stream
    async fn write_gathered(&mut self, parts: &[&[u8]]) -> Result<(), SessionError<T>> {
        debug_assert_eq!(self.state, TransactionState::Open(Direction::Write));
        let mut window = [0u8; MAX_TRANSFER];
        let mut filled = 0;

        for &byte in parts.iter().flat_map(|part| part.iter()) {
            window[filled] = byte;
            filled += 1;
            if filled == MAX_TRANSFER {
                self.write_slice(&window).await?;
                filled = 0;
            }
        }
        if filled > 0 {
            self.write_slice(&window[..filled]).await?;
        }
        Ok(())
    }

    async fn write_slice(&mut self, slice: &[u8]) -> Result<(), SessionError<T>> {
        self.send(Command::write(slice)?).await?;
        if !self.receive_ack().await? {
            warn!("write of {} bytes: nack", slice.len());
            return Err(Error::WriteFailed);
        }
        Ok(())
    }

    /// Send STOP, closing any open bracket
    ///
    /// Safe to call when nothing is open.
    pub async fn stop(&mut self) -> Result<(), SessionError<T>> {
        self.send(Command::Stop).await?;
        self.state = TransactionState::Idle;
        Ok(())
    }

    /// Read `buffer.len()` bytes starting at a register
    ///
    /// `register` is the big-endian register address (1 to 4 bytes). Up to
    /// 64 bytes are read in one bracket; longer reads re-address the device
    /// for each 64-byte window with the register advanced by the bytes
    /// already read, encoded at the same width.
    pub async fn register_read(
        &mut self,
        address: u8,
        register: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), SessionError<T>> {
        let base = register_base(register)?;
        if buffer.len() <= MAX_TRANSFER {
            return self.register_bracket(address, register, buffer).await;
        }

        let width = register.len();
        let last = base as u64 + ((buffer.len() - 1) / MAX_TRANSFER * MAX_TRANSFER) as u64;
        if last >> (8 * width) != 0 {
            return Err(Error::InvalidCommand);
        }

        for (index, window) in buffer.chunks_mut(MAX_TRANSFER).enumerate() {
            let cursor = base + (index * MAX_TRANSFER) as u32;
            let encoded = cursor.to_be_bytes();
            self.register_bracket(address, &encoded[MAX_REGISTER_WIDTH - width..], window)
                .await?;
        }
        Ok(())
    }

    async fn register_bracket(
        &mut self,
        address: u8,
        register: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), SessionError<T>> {
        self.start(address, Direction::Write).await?;
        self.write_chunked(register).await?;
        self.start(address, Direction::Read).await?;
        self.read_chunked(buffer).await?;
        self.stop().await
    }

    /// Write `value` starting at a register, in one bracket
    ///
    /// Register and value bytes go out as a single chunked write.
    pub async fn register_write(
        &mut self,
        address: u8,
        register: &[u8],
        value: &[u8],
    ) -> Result<(), SessionError<T>> {
        register_base::<<T as ErrorType>::Error>(register)?;
        self.start(address, Direction::Write).await?;
        self.write_gathered(&[register, value]).await?;
        self.stop().await
    }
}
