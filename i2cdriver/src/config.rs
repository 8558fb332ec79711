//! Adapter startup configuration

use i2cdriver_protocol::BusSpeed;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings applied by the startup handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverConfig {
    /// Bus clock (default 400 kHz)
    pub speed: BusSpeed,
    /// Pullup mask to apply, or `None` to leave the adapter's setting
    pub pullups: Option<u8>,
}

impl DriverConfig {
    /// Configuration with the given bus speed and no pullup change
    pub const fn new(speed: BusSpeed) -> Self {
        Self {
            speed,
            pullups: None,
        }
    }

    /// Set the pullup mask applied after the handshake
    ///
    /// The mask is validated when the handshake runs.
    pub const fn with_pullups(mut self, mask: u8) -> Self {
        self.pullups = Some(mask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fast_mode() {
        let config = DriverConfig::default();
        assert_eq!(config.speed, BusSpeed::Fast);
        assert_eq!(config.pullups, None);
    }

    #[test]
    fn test_builder() {
        let config = DriverConfig::new(BusSpeed::Standard).with_pullups(0b100_100);
        assert_eq!(config.speed.khz(), 100);
        assert_eq!(config.pullups, Some(0x24));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_postcard_roundtrip() {
        let config = DriverConfig::new(BusSpeed::Standard).with_pullups(0x3F);
        let mut buf = [0u8; 16];
        let bytes = postcard::to_slice(&config, &mut buf).unwrap();
        let decoded: DriverConfig = postcard::from_bytes(bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
