//! Bus scan response decoding
//!
//! The `d` command probes every address from 0x08 to 0x77 and answers with
//! one ASCII digit per address, in address order. A `1` means the address
//! acknowledged.

use heapless::Vec;

use crate::status::DecodeError;

/// First address probed by a scan
pub const SCAN_FIRST_ADDRESS: u8 = 0x08;

/// Last address probed by a scan
pub const SCAN_LAST_ADDRESS: u8 = 0x77;

/// Size of the scan response in bytes
pub const SCAN_RESPONSE_SIZE: usize = (SCAN_LAST_ADDRESS - SCAN_FIRST_ADDRESS + 1) as usize;

/// Addresses that acknowledged during a scan, in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanResult {
    addresses: Vec<u8, SCAN_RESPONSE_SIZE>,
}

impl ScanResult {
    /// Decode a 112-byte scan response
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != SCAN_RESPONSE_SIZE {
            return Err(DecodeError::WrongLength {
                expected: SCAN_RESPONSE_SIZE,
                actual: bytes.len(),
            });
        }

        let mut addresses = Vec::new();
        for (offset, &digit) in bytes.iter().enumerate() {
            match digit {
                b'1' => {
                    // Cannot overflow: one slot per probed address
                    let _ = addresses.push(SCAN_FIRST_ADDRESS + offset as u8);
                }
                b'0'..=b'9' => {}
                other => return Err(DecodeError::InvalidDigit(other)),
            }
        }

        Ok(Self { addresses })
    }

    /// Responding addresses
    pub fn addresses(&self) -> &[u8] {
        &self.addresses
    }

    /// Check whether an address responded
    pub fn contains(&self, address: u8) -> bool {
        self.addresses.binary_search(&address).is_ok()
    }

    /// Number of responding addresses
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when nothing responded
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Responding addresses strictly between `low` and `high`
    pub fn between(&self, low: u8, high: u8) -> impl Iterator<Item = u8> + '_ {
        self.addresses
            .iter()
            .copied()
            .filter(move |&address| address > low && address < high)
    }
}
