//! Driver for the I2CDriver USB-to-I2C adapter
//!
//! This crate turns a byte stream to the adapter into a shared I2C bus:
//!
//! - [`session::ProtocolSession`] - Command sequencing and acknowledgement checks
//! - [`queue::OperationQueue`] - FIFO single-flight access to the session
//! - [`bus::BusAdapter`] - SMBus-style client operations ([`SmbusBus`])
//! - [`device::I2cDevice`] - `embedded-hal-async` I2C handle
//! - [`blocking::BlockingBus`] - `embedded-hal` blocking handle
//!
//! # Example
//!
//! ```ignore
//! let adapter = BusAdapter::open(serial, DriverConfig::default()).await?;
//! let found = adapter.scan_default().await?;
//! let id = adapter.read_byte(0x68, 0x75).await?;
//! ```
//!
//! Synchronisation uses `embassy-sync` critical-section mutexes; enable the
//! `std` feature on hosts that do not provide a critical-section
//! implementation of their own.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub(crate) mod fmt;

pub mod blocking;
pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod queue;
pub mod session;

#[cfg(test)]
mod sim;

pub use blocking::BlockingBus;
pub use bus::{BusAdapter, ADAPTER_FUNCS};
pub use config::DriverConfig;
pub use device::I2cDevice;
pub use error::Error;
pub use i2cdriver_hal::{AddressList, I2cFuncs, SmbusBus, Transport};
pub use i2cdriver_protocol::{BusSpeed, DeviceStatus, Direction, ScanResult};
pub use queue::{OperationQueue, Ticket, Turn};
pub use session::{ProtocolSession, TransactionState};
