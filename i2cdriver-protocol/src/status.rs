//! Status record decoding
//!
//! The adapter answers the `?` command with a fixed 80-byte ASCII record:
//!
//! ```text
//! [i2cdriver1 DO01JUOO 000002340 4.976 040 +25.2 I 1 1 100 24 dc7c       ]
//!  │          │        │         │     │   │     │ │ │ │   │  └ crc (hex)
//!  │          │        │         │     │   │     │ │ │ │   └ pullups (hex)
//!  │          │        │         │     │   │     │ │ │ └ speed (kHz)
//!  │          │        │         │     │   │     │ │ └ SCL level
//!  │          │        │         │     │   │     │ └ SDA level
//!  │          │        │         │     │   │     └ mode
//!  │          │        │         │     │   └ temperature (°C)
//!  │          │        │         │     └ current (mA)
//!  │          │        │         └ voltage (V)
//!  │          │        └ uptime (s)
//!  │          └ serial
//!  └ identifier
//! ```
//!
//! The record is padded with spaces up to the closing `]`.

use core::fmt::Write;
use core::str::FromStr;

use heapless::{String, Vec};

/// Size of the status response in bytes
pub const STATUS_RESPONSE_SIZE: usize = 80;

/// Number of space-separated fields in the status record
pub const STATUS_FIELD_COUNT: usize = 12;

/// Maximum length of the identifier and serial fields
pub const MAX_LABEL_LEN: usize = 16;

const CLOSE_MARKER: u8 = b']';

/// Errors from decoding fixed-format adapter responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Response has the wrong number of bytes
    WrongLength { expected: usize, actual: usize },
    /// Response contains non-ASCII bytes
    NotAscii,
    /// Record does not split into the expected number of fields
    FieldCount(usize),
    /// A field failed to parse
    InvalidField(&'static str),
    /// Scan response contains a byte that is not a digit
    InvalidDigit(u8),
}

/// Parsed adapter status record
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStatus {
    /// Model identifier (e.g. "i2cdriver1")
    pub identifier: String<MAX_LABEL_LEN>,
    /// FTDI serial number
    pub serial: String<MAX_LABEL_LEN>,
    /// Seconds since power-on
    pub uptime: u32,
    /// USB supply voltage in volts
    pub voltage: f32,
    /// Supply current in milliamps
    pub current: f32,
    /// Board temperature in degrees Celsius
    pub temperature: f32,
    /// Operating mode ('I' = I2C, 'B' = bitbang, 'M' = monitor, 'C' = capture)
    pub mode: char,
    /// SDA line level
    pub sda: u8,
    /// SCL line level
    pub scl: u8,
    /// Bus speed in kHz
    pub speed: u16,
    /// Pullup control mask
    pub pullups: u8,
    /// Running CRC of bus traffic
    pub crc: u16,
}

fn label(field: &str, name: &'static str) -> Result<String<MAX_LABEL_LEN>, DecodeError> {
    if field.is_empty() {
        return Err(DecodeError::InvalidField(name));
    }
    let mut out = String::new();
    out.push_str(field)
        .map_err(|_| DecodeError::InvalidField(name))?;
    Ok(out)
}

fn number<T: FromStr>(field: &str, name: &'static str) -> Result<T, DecodeError> {
    field.parse().map_err(|_| DecodeError::InvalidField(name))
}

fn single_char(field: &str, name: &'static str) -> Result<char, DecodeError> {
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(DecodeError::InvalidField(name)),
    }
}

impl DeviceStatus {
    /// Decode a status record
    ///
    /// Fails closed: the response must be exactly [`STATUS_RESPONSE_SIZE`]
    /// ASCII bytes holding exactly [`STATUS_FIELD_COUNT`] fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != STATUS_RESPONSE_SIZE {
            return Err(DecodeError::WrongLength {
                expected: STATUS_RESPONSE_SIZE,
                actual: bytes.len(),
            });
        }
        if !bytes.is_ascii() {
            return Err(DecodeError::NotAscii);
        }
        let text = core::str::from_utf8(&bytes[1..]).map_err(|_| DecodeError::NotAscii)?;
        let body = text.trim_end_matches(|c: char| c == ' ' || c == CLOSE_MARKER as char);

        let mut fields: Vec<&str, STATUS_FIELD_COUNT> = Vec::new();
        let mut count = 0;
        for field in body.split(' ') {
            count += 1;
            // Extra fields are counted but not stored
            let _ = fields.push(field);
        }
        if count != STATUS_FIELD_COUNT {
            return Err(DecodeError::FieldCount(count));
        }

        Ok(Self {
            identifier: label(fields[0], "identifier")?,
            serial: label(fields[1], "serial")?,
            uptime: number(fields[2], "uptime")?,
            voltage: number(fields[3], "voltage")?,
            current: number(fields[4], "current")?,
            temperature: number(fields[5], "temperature")?,
            mode: single_char(fields[6], "mode")?,
            sda: number(fields[7], "sda")?,
            scl: number(fields[8], "scl")?,
            speed: number(fields[9], "speed")?,
            pullups: u8::from_str_radix(fields[10], 16)
                .map_err(|_| DecodeError::InvalidField("pullups"))?,
            crc: u16::from_str_radix(fields[11], 16)
                .map_err(|_| DecodeError::InvalidField("crc"))?,
        })
    }

    /// Encode this status in the adapter's record layout
    ///
    /// Fails if the fields do not fit in [`STATUS_RESPONSE_SIZE`] bytes.
    pub fn encode(&self) -> Result<[u8; STATUS_RESPONSE_SIZE], core::fmt::Error> {
        let mut text: String<STATUS_RESPONSE_SIZE> = String::new();
        write!(
            text,
            "[{} {} {:09} {:.3} {:03.0} {:+05.1} {} {} {} {} {:02x} {:04x}",
            self.identifier,
            self.serial,
            self.uptime,
            self.voltage,
            self.current,
            self.temperature,
            self.mode,
            self.sda,
            self.scl,
            self.speed,
            self.pullups,
            self.crc,
        )?;
        if text.len() >= STATUS_RESPONSE_SIZE {
            return Err(core::fmt::Error);
        }

        let mut record = [b' '; STATUS_RESPONSE_SIZE];
        record[..text.len()].copy_from_slice(text.as_bytes());
        record[STATUS_RESPONSE_SIZE - 1] = CLOSE_MARKER;
        Ok(record)
    }
}
