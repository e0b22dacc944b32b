//! CONNECT flag byte as a `BeBytes` bit-field view

use crate::error::{MqttError, Result};
use bebytes::BeBytes;

/// CONNECT flags byte, most significant bit first
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
pub struct ConnectFlags {
    /// User Name Flag (bit 7)
    #[bits(1)]
    pub username: u8,
    /// Password Flag (bit 6)
    #[bits(1)]
    pub password: u8,
    /// Will Retain (bit 5)
    #[bits(1)]
    pub will_retain: u8,
    /// Will `QoS` (bits 4-3)
    #[bits(2)]
    pub will_qos: u8,
    /// Will Flag (bit 2)
    #[bits(1)]
    pub will: u8,
    /// Clean Session / Clean Start (bit 1)
    #[bits(1)]
    pub clean_start: u8,
    /// Reserved (bit 0), must be zero
    #[bits(1)]
    pub reserved: u8,
}

impl ConnectFlags {
    /// Splits a raw flags byte into its fields
    ///
    /// # Errors
    ///
    /// Never fails for a single byte; the error path only exists because the
    /// derived parser is fallible
    pub fn parse(byte: u8) -> Result<Self> {
        let (flags, _) = Self::try_from_be_bytes(&[byte])
            .map_err(|e| MqttError::MalformedPacket(format!("Invalid connect flags: {e:?}")))?;
        Ok(flags)
    }

    #[must_use]
    pub fn has_username(&self) -> bool {
        self.username != 0
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password != 0
    }

    #[must_use]
    pub fn has_will(&self) -> bool {
        self.will != 0
    }

    #[must_use]
    pub fn is_will_retain(&self) -> bool {
        self.will_retain != 0
    }

    #[must_use]
    pub fn is_clean_start(&self) -> bool {
        self.clean_start != 0
    }

    #[must_use]
    pub fn reserved_set(&self) -> bool {
        self.reserved != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let flags = ConnectFlags::parse(0b1111_0110).unwrap();
        assert!(flags.has_username());
        assert!(flags.has_password());
        assert!(flags.is_will_retain());
        assert_eq!(flags.will_qos, 2);
        assert!(flags.has_will());
        assert!(flags.is_clean_start());
        assert!(!flags.reserved_set());
    }

    #[test]
    fn test_parse_reserved_bit() {
        let flags = ConnectFlags::parse(0x01).unwrap();
        assert!(flags.reserved_set());
        assert!(!flags.is_clean_start());
    }

    #[test]
    fn test_will_qos_extraction() {
        assert_eq!(ConnectFlags::parse(0b0000_1000).unwrap().will_qos, 1);
        assert_eq!(ConnectFlags::parse(0b0001_0000).unwrap().will_qos, 2);
        assert_eq!(ConnectFlags::parse(0b0001_1000).unwrap().will_qos, 3);
    }

    #[test]
    fn test_round_trip_byte() {
        for byte in 0..=u8::MAX {
            let flags = ConnectFlags::parse(byte).unwrap();
            assert_eq!(flags.to_be_bytes(), vec![byte]);
        }
    }
}
