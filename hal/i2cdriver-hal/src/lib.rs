//! I2CDriver bus abstractions
//!
//! This crate defines the traits that sit on either side of the adapter
//! driver, so that client code and transports can be swapped independently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Client code (sensor drivers, tools)    │
//! └─────────────────────────────────────────┘
//!                     │  SmbusBus / embedded-hal I2c
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  i2cdriver (adapter driver)             │
//! └─────────────────────────────────────────┘
//!                     │  Transport
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  Serial port / USB CDC / test double    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`transport::Transport`] - Byte stream to the adapter
//! - [`i2c::SmbusBus`] - SMBus-style bus client operations

#![no_std]
#![deny(unsafe_code)]
#![allow(async_fn_in_trait)]

pub mod i2c;
pub mod transport;

// Re-export key traits at crate root for convenience
pub use i2c::{AddressList, DeviceId, I2cFuncs, SmbusBus};
pub use transport::Transport;
