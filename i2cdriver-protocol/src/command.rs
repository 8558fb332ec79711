//! Command encoding and decoding for the I2CDriver adapter.
//!
//! Command format:
//! - OPCODE (1 byte): ASCII command letter, or a synthesized transfer opcode
//! - PAYLOAD (0, 1 or 1-64 bytes): fixed by the opcode
//!
//! | Opcode        | Payload      | Response            |
//! |---------------|--------------|---------------------|
//! | `?`           | -            | 80-byte status      |
//! | `e`           | 1 byte       | the same byte       |
//! | `1` / `4`     | -            | -                   |
//! | `s`           | address byte | ack                 |
//! | `0x80..=0xBF` | -            | N bytes             |
//! | `0xC0..=0xFF` | N bytes      | ack                 |
//! | `P`           | -            | -                   |
//! | `x`           | -            | -                   |
//! | `d`           | -            | 112-byte scan       |
//! | `u`           | pullup mask  | -                   |

use heapless::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Adapter opcodes
pub mod op {
    /// Transmit status record
    pub const STATUS: u8 = b'?';
    /// Echo one byte back
    pub const ECHO: u8 = b'e';
    /// Select 100 kHz bus speed
    pub const SPEED_100: u8 = b'1';
    /// Select 400 kHz bus speed
    pub const SPEED_400: u8 = b'4';
    /// Send START and address byte, respond with ack
    pub const START: u8 = b's';
    /// Read N bytes, ACK every byte
    pub const ACK_READ: u8 = b'a';
    /// Send STOP
    pub const STOP: u8 = b'P';
    /// Reset the I2C bus
    pub const RESET: u8 = b'x';
    /// Scan the bus, respond with 112 status digits
    pub const SCAN: u8 = b'd';
    /// Set pullup control lines
    pub const PULLUPS: u8 = b'u';
    /// Read 1 byte; `READ_BASE + N - 1` reads N bytes, NACKing the last
    pub const READ_BASE: u8 = 0x80;
    /// Write 1 byte; `WRITE_BASE + N - 1` writes N bytes
    pub const WRITE_BASE: u8 = 0xC0;
}

/// Largest transfer a single read or write opcode can carry
pub const MAX_TRANSFER: usize = 64;

/// Largest encoded command (opcode + full write payload)
pub const MAX_COMMAND_SIZE: usize = 1 + MAX_TRANSFER;

/// Highest valid 7-bit device address
pub const MAX_ADDRESS: u8 = 0x7F;

/// Six pullup control lines
pub const MAX_PULLUP_MASK: u8 = 0b11_1111;

/// Byte used to flush a half-received command out of the adapter.
///
/// `@` is also the "exit monitor mode" command, so a run of them brings the
/// adapter back to its command loop from any state.
pub const RESYNC_BYTE: u8 = b'@';

/// Errors that can occur while encoding or decoding a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Transfer commands need at least one byte
    EmptyPayload,
    /// Transfer exceeds [`MAX_TRANSFER`]
    PayloadTooLarge,
    /// Address does not fit in 7 bits
    InvalidAddress(u8),
    /// Pullup mask uses more than six lines
    InvalidPullupMask(u8),
    /// Output buffer too small for encoding
    BufferTooSmall,
    /// More bytes are needed to decode the command
    Incomplete,
    /// Opcode is not part of the command set
    UnknownOpcode(u8),
}

/// Transfer direction, sent as the low bit of the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master writes to the device
    Write,
    /// Master reads from the device
    Read,
}

impl Direction {
    /// R/W bit value
    pub const fn bit(self) -> u8 {
        match self {
            Direction::Write => 0,
            Direction::Read => 1,
        }
    }
}

/// Bus clock selections supported by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BusSpeed {
    /// Standard mode (100 kHz)
    Standard,
    /// Fast mode (400 kHz)
    #[default]
    Fast,
}

impl BusSpeed {
    /// Clock frequency in kHz
    pub const fn khz(self) -> u32 {
        match self {
            BusSpeed::Standard => 100,
            BusSpeed::Fast => 400,
        }
    }

    /// Look up a speed by its frequency in kHz
    pub const fn from_khz(khz: u32) -> Option<Self> {
        match khz {
            100 => Some(BusSpeed::Standard),
            400 => Some(BusSpeed::Fast),
            _ => None,
        }
    }

    const fn opcode(self) -> u8 {
        match self {
            BusSpeed::Standard => op::SPEED_100,
            BusSpeed::Fast => op::SPEED_400,
        }
    }
}

/// Address byte for a START command: `(address << 1) | rw`
pub const fn start_byte(address: u8, direction: Direction) -> u8 {
    (address << 1) | direction.bit()
}

/// Check an acknowledgement byte
///
/// The adapter reports success in the least-significant bit.
pub const fn decode_ack(byte: u8) -> bool {
    byte & 1 == 1
}

/// A single adapter command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    /// Request the 80-byte status record
    Status,
    /// Echo a byte back
    Echo(u8),
    /// Select the bus clock
    Speed(BusSpeed),
    /// Send START with the given address and direction
    Start { address: u8, direction: Direction },
    /// Read 1-64 bytes from the open transaction
    Read(u8),
    /// Write 1-64 bytes to the open transaction
    Write(&'a [u8]),
    /// Send STOP
    Stop,
    /// Reset the bus
    Reset,
    /// Scan all addresses
    Scan,
    /// Set the pullup control lines
    Pullups(u8),
}

impl<'a> Command<'a> {
    /// Create a START command, validating the address
    pub fn start(address: u8, direction: Direction) -> Result<Self, CommandError> {
        if address > MAX_ADDRESS {
            return Err(CommandError::InvalidAddress(address));
        }
        Ok(Command::Start { address, direction })
    }

    /// Create a read command for `len` bytes
    pub fn read(len: usize) -> Result<Self, CommandError> {
        match len {
            0 => Err(CommandError::EmptyPayload),
            1..=MAX_TRANSFER => Ok(Command::Read(len as u8)),
            _ => Err(CommandError::PayloadTooLarge),
        }
    }

    /// Create a write command carrying `data`
    pub fn write(data: &'a [u8]) -> Result<Self, CommandError> {
        match data.len() {
            0 => Err(CommandError::EmptyPayload),
            1..=MAX_TRANSFER => Ok(Command::Write(data)),
            _ => Err(CommandError::PayloadTooLarge),
        }
    }

    /// Create a pullup command, validating the mask
    pub fn pullups(mask: u8) -> Result<Self, CommandError> {
        if mask > MAX_PULLUP_MASK {
            return Err(CommandError::InvalidPullupMask(mask));
        }
        Ok(Command::Pullups(mask))
    }

    /// Opcode byte for this command
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Status => op::STATUS,
            Command::Echo(_) => op::ECHO,
            Command::Speed(speed) => speed.opcode(),
            Command::Start { .. } => op::START,
            Command::Read(n) => op::READ_BASE + n.saturating_sub(1),
            Command::Write(data) => op::WRITE_BASE + (data.len() as u8).saturating_sub(1),
            Command::Stop => op::STOP,
            Command::Reset => op::RESET,
            Command::Scan => op::SCAN,
            Command::Pullups(_) => op::PULLUPS,
        }
    }

    /// Number of response bytes the adapter sends for this command
    pub fn response_len(&self) -> usize {
        match self {
            Command::Status => crate::status::STATUS_RESPONSE_SIZE,
            Command::Scan => crate::scan::SCAN_RESPONSE_SIZE,
            Command::Echo(_) | Command::Start { .. } | Command::Write(_) => 1,
            Command::Read(n) => *n as usize,
            Command::Speed(_) | Command::Stop | Command::Reset | Command::Pullups(_) => 0,
        }
    }

    fn validate(&self) -> Result<(), CommandError> {
        match *self {
            Command::Start { address, .. } if address > MAX_ADDRESS => {
                Err(CommandError::InvalidAddress(address))
            }
            Command::Read(0) => Err(CommandError::EmptyPayload),
            Command::Read(n) if n as usize > MAX_TRANSFER => Err(CommandError::PayloadTooLarge),
            Command::Write(data) if data.is_empty() => Err(CommandError::EmptyPayload),
            Command::Write(data) if data.len() > MAX_TRANSFER => Err(CommandError::PayloadTooLarge),
            Command::Pullups(mask) if mask > MAX_PULLUP_MASK => {
                Err(CommandError::InvalidPullupMask(mask))
            }
            _ => Ok(()),
        }
    }

    /// Encode this command into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, CommandError> {
        self.validate()?;

        let payload: &[u8] = match self {
            Command::Echo(byte) | Command::Pullups(byte) => core::slice::from_ref(byte),
            Command::Start { .. } => &[],
            Command::Write(data) => *data,
            _ => &[],
        };
        let len = match self {
            Command::Start { .. } => 2,
            _ => 1 + payload.len(),
        };
        if buffer.len() < len {
            return Err(CommandError::BufferTooSmall);
        }

        buffer[0] = self.opcode();
        if let Command::Start { address, direction } = *self {
            buffer[1] = start_byte(address, direction);
        } else {
            buffer[1..len].copy_from_slice(payload);
        }

        Ok(len)
    }

    /// Encode this command into a heapless Vec
    pub fn to_vec(&self) -> Result<Vec<u8, MAX_COMMAND_SIZE>, CommandError> {
        let mut buffer = [0u8; MAX_COMMAND_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| CommandError::BufferTooSmall)?;
        Ok(vec)
    }

    /// Decode the command at the front of `bytes`
    ///
    /// Returns the command and the number of bytes it occupied, or
    /// `Err(Incomplete)` when the payload has not fully arrived yet.
    pub fn decode(bytes: &'a [u8]) -> Result<(Self, usize), CommandError> {
        let (&opcode, rest) = bytes.split_first().ok_or(CommandError::Incomplete)?;
        let arg = || rest.first().copied().ok_or(CommandError::Incomplete);

        let command = match opcode {
            op::STATUS => Command::Status,
            op::SPEED_100 => Command::Speed(BusSpeed::Standard),
            op::SPEED_400 => Command::Speed(BusSpeed::Fast),
            op::STOP => Command::Stop,
            op::RESET => Command::Reset,
            op::SCAN => Command::Scan,
            op::ECHO => Command::Echo(arg()?),
            op::PULLUPS => Command::Pullups(arg()?),
            op::START => {
                let byte = arg()?;
                let direction = if byte & 1 == 1 {
                    Direction::Read
                } else {
                    Direction::Write
                };
                Command::Start {
                    address: byte >> 1,
                    direction,
                }
            }
            op::READ_BASE..=0xBF => Command::Read(opcode - op::READ_BASE + 1),
            op::WRITE_BASE..=0xFF => {
                let n = (opcode - op::WRITE_BASE + 1) as usize;
                let data = rest.get(..n).ok_or(CommandError::Incomplete)?;
                Command::Write(data)
            }
            other => return Err(CommandError::UnknownOpcode(other)),
        };

        let len = match command {
            Command::Echo(_) | Command::Pullups(_) | Command::Start { .. } => 2,
            Command::Write(data) => 1 + data.len(),
            _ => 1,
        };
        Ok((command, len))
    }
}
