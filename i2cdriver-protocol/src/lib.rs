//! I2CDriver adapter protocol
//!
//! This crate defines the byte protocol spoken by the I2CDriver USB-to-I2C
//! adapter over its serial port. The host sends single-byte opcodes, some
//! followed by a fixed-size payload, and the adapter answers with either
//! nothing, a single acknowledgement byte, or a fixed-size ASCII record.
//!
//! # Protocol Overview
//!
//! ```text
//! ┌────────┬──────────────┐        ┌──────────────────────────┐
//! │ OPCODE │ PAYLOAD      │  ───▶  │ RESPONSE                 │
//! │ 1B     │ 0–64B        │        │ none / ack (1B) / record │
//! └────────┴──────────────┘        └──────────────────────────┘
//! ```
//!
//! Reads and writes of up to 64 bytes are encoded in the opcode itself
//! (`0x80 + N - 1` and `0xC0 + N - 1`), so larger transfers must be split
//! by the caller.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod command;
pub mod scan;
pub mod status;

pub use command::{
    decode_ack, start_byte, BusSpeed, Command, CommandError, Direction, MAX_ADDRESS,
    MAX_COMMAND_SIZE, MAX_PULLUP_MASK, MAX_TRANSFER,
};
pub use scan::{ScanResult, SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS, SCAN_RESPONSE_SIZE};
pub use status::{DecodeError, DeviceStatus, STATUS_RESPONSE_SIZE};
