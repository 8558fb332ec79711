//! embedded-hal async device handle
//!
//! Lets device drivers written against `embedded_hal_async::i2c::I2c` run on
//! the adapter. Each call is one queued bracket.

use embedded_hal::i2c::{ErrorType, Operation};
use embedded_hal_async::i2c::I2c;
use i2cdriver_hal::Transport;
use i2cdriver_protocol::Direction;

use crate::bus::BusAdapter;
use crate::error::Error;
use crate::session::ProtocolSession;

/// Shared handle implementing [`embedded_hal_async::i2c::I2c`]
///
/// Consecutive operations in the same direction share one START. Each
/// read operation ends with a NACKed byte, so a run of contiguous reads
/// is not merged on the wire.
pub struct I2cDevice<'a, T> {
    adapter: &'a BusAdapter<T>,
}

impl<T> Clone for I2cDevice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for I2cDevice<'_, T> {}

impl<'a, T: Transport> I2cDevice<'a, T> {
    pub(crate) fn new(adapter: &'a BusAdapter<T>) -> Self {
        Self { adapter }
    }
}

/// Run embedded-hal operations as one bracket on an exclusive session
///
/// A START (or repeated START) is sent whenever the direction changes and a
/// single STOP closes the bracket. Errors are returned without a STOP.
async fn run_operations<T: Transport>(
    session: &mut ProtocolSession<T>,
    address: u8,
    operations: &mut [Operation<'_>],
) -> Result<(), Error<T::Error>> {
    let mut current = None;
    for operation in operations.iter_mut() {
        let direction = match operation {
            Operation::Read(_) => Direction::Read,
            Operation::Write(_) => Direction::Write,
        };
        if current != Some(direction) {
            session.start(address, direction).await?;
            current = Some(direction);
        }
        match operation {
            Operation::Read(buffer) => session.read_chunked(buffer).await?,
            Operation::Write(data) => session.write_chunked(data).await?,
        }
    }
    if current.is_some() {
        session.stop().await?;
    }
    Ok(())
}

impl<T: Transport> ErrorType for I2cDevice<'_, T> {
    type Error = Error<T::Error>;
}

impl<T: Transport> I2c for I2cDevice<'_, T> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut session = self.adapter.session().await;
        run_operations(&mut *session, address, operations).await
    }
}
