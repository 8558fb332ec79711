//! Driver error type

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_io_async::ReadExactError;
use i2cdriver_protocol::{CommandError, DecodeError};

/// Errors returned by adapter operations
///
/// `E` is the error type of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The transport reported an I/O error
    Transport(E),
    /// I/O was attempted on a closed or released transport
    TransportClosed,
    /// Status or scan response had the wrong length or did not parse
    MalformedResponse(DecodeError),
    /// START was not acknowledged by the device at this address
    StartFailed(u8),
    /// A written slice was not acknowledged
    WriteFailed,
    /// Bus speed other than 100 or 400 kHz
    UnsupportedSpeed(u32),
    /// Pullup mask outside 0..=0b111111
    InvalidPullupMask(u8),
    /// Command or register encoding cannot be sent
    InvalidCommand,
    /// Address does not fit in 7 bits
    InvalidAddress(u8),
    /// Operation the adapter cannot perform
    NotImplemented,
}

impl<E> Error<E> {
    /// True for negative acknowledgements from the bus
    ///
    /// After a NACK the adapter may still hold the bus; callers should issue
    /// a STOP before retrying the whole bracket.
    pub fn is_nack(&self) -> bool {
        matches!(self, Error::StartFailed(_) | Error::WriteFailed)
    }
}

impl<E> From<DecodeError> for Error<E> {
    fn from(e: DecodeError) -> Self {
        Error::MalformedResponse(e)
    }
}

impl<E> From<CommandError> for Error<E> {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::InvalidAddress(address) => Error::InvalidAddress(address),
            CommandError::InvalidPullupMask(mask) => Error::InvalidPullupMask(mask),
            _ => Error::InvalidCommand,
        }
    }
}

impl<E> From<ReadExactError<E>> for Error<E> {
    fn from(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => Error::TransportClosed,
            ReadExactError::Other(e) => Error::Transport(e),
        }
    }
}

impl<E: core::fmt::Debug> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::StartFailed(_) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Error::WriteFailed => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            _ => ErrorKind::Other,
        }
    }
}
