//! Byte stream transport to the adapter
//!
//! The adapter is reached over a reliable, ordered byte channel, usually the
//! USB serial port it enumerates as (1 Mbaud, 8N1). Any type implementing
//! the `embedded-io-async` read and write traits can carry the protocol.

use embedded_io_async::{Read, Write};

/// Combined byte stream interface
///
/// Reads must eventually return the bytes the adapter sends; a read of zero
/// bytes is treated as the channel having been closed. Writes followed by
/// `flush` must reach the adapter before the next read is awaited.
pub trait Transport: Read + Write {}

// Blanket implementation
impl<T: Read + Write> Transport for T {}
