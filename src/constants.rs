//! MQTT Protocol Constants
//!
//! Wire-level constants shared by the frame decoder, the per-type decoders
//! and the packet builders in [`crate::testing`].

use crate::PacketType;

/// Fixed header byte 1 values (packet type << 4 | flags)
pub mod fixed_header {
    /// CONNECT packet fixed header (0x10)
    pub const CONNECT: u8 = (super::PacketType::Connect as u8) << 4;

    /// PUBLISH packet fixed header base (0x30) - flags vary
    pub const PUBLISH_BASE: u8 = (super::PacketType::Publish as u8) << 4;

    /// PUBACK packet fixed header (0x40)
    pub const PUBACK: u8 = (super::PacketType::PubAck as u8) << 4;

    /// PUBREC packet fixed header (0x50)
    pub const PUBREC: u8 = (super::PacketType::PubRec as u8) << 4;

    /// PUBREL packet fixed header (0x62) - has required flags
    pub const PUBREL: u8 = (super::PacketType::PubRel as u8) << 4 | 0x02;

    /// PUBCOMP packet fixed header (0x70)
    pub const PUBCOMP: u8 = (super::PacketType::PubComp as u8) << 4;

    /// SUBSCRIBE packet fixed header (0x82) - has required flags
    pub const SUBSCRIBE: u8 = (super::PacketType::Subscribe as u8) << 4 | 0x02;

    /// UNSUBSCRIBE packet fixed header (0xA2) - has required flags
    pub const UNSUBSCRIBE: u8 = (super::PacketType::Unsubscribe as u8) << 4 | 0x02;

    /// PINGREQ packet fixed header (0xC0)
    pub const PINGREQ: u8 = (super::PacketType::PingReq as u8) << 4;

    /// DISCONNECT packet fixed header (0xE0)
    pub const DISCONNECT: u8 = (super::PacketType::Disconnect as u8) << 4;

    /// AUTH packet fixed header (0xF0)
    pub const AUTH: u8 = (super::PacketType::Auth as u8) << 4;
}

/// Masks for extracting fields from fixed header
pub mod masks {
    /// Mask for extracting flags from fixed header byte 1 (0x0F)
    pub const FLAGS: u8 = 0x0F;

    /// Flags required on PUBREL, SUBSCRIBE and UNSUBSCRIBE
    pub const REQUIRED_FLAGS_0010: u8 = 0x02;
}

/// Subscription option masks
pub mod subscription {
    /// Prefix of a shared subscription filter
    pub const SHARED_PREFIX: &str = "$share/";
}

/// CONNECT variable header
pub mod connect {
    /// Protocol name used by MQTT 3.1
    pub const PROTOCOL_NAME_V3_1: &str = "MQIsdp";

    /// Protocol name used by MQTT 3.1.1 and 5.0
    pub const PROTOCOL_NAME: &str = "MQTT";

    /// Protocol level byte for 3.1
    pub const LEVEL_V3_1: u8 = 3;

    /// Protocol level byte for 3.1.1
    pub const LEVEL_V3_1_1: u8 = 4;

    /// Protocol level byte for 5.0
    pub const LEVEL_V5: u8 = 5;

    /// Name (2 + 6) + level + flags + keep alive
    pub const HEADER_LEN_V3_1: usize = 12;

    /// Name (2 + 4) + level + flags + keep alive
    pub const HEADER_LEN_V3_1_1: usize = 10;
}

/// Size limits
pub mod limits {
    /// One header byte plus at least one remaining-length byte
    pub const MIN_FIXED_HEADER_LENGTH: usize = 2;

    /// Largest packet representable on the wire: 1 + 4 + 268,435,455
    pub const MAX_PACKET_SIZE_NO_LIMIT: usize = 268_435_460;

    /// Maximum string length in MQTT (65535)
    pub const MAX_STRING_LENGTH: usize = u16::MAX as usize;
}

/// Values a client is assumed to have chosen when it omits the property
pub mod defaults {
    /// Receive maximum when the CONNECT carries none
    pub const RECEIVE_MAXIMUM: u16 = u16::MAX;

    /// Session expiry when the CONNECT carries none (expire on disconnect)
    pub const SESSION_EXPIRY_ON_DISCONNECT: u32 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_values() {
        assert_eq!(fixed_header::CONNECT, 0x10);
        assert_eq!(fixed_header::PUBLISH_BASE, 0x30);
        assert_eq!(fixed_header::PUBREL, 0x62);
        assert_eq!(fixed_header::SUBSCRIBE, 0x82);
        assert_eq!(fixed_header::UNSUBSCRIBE, 0xA2);
        assert_eq!(fixed_header::PINGREQ, 0xC0);
        assert_eq!(fixed_header::AUTH, 0xF0);
    }

    #[test]
    fn test_connect_header_lengths() {
        assert_eq!(
            connect::HEADER_LEN_V3_1,
            2 + connect::PROTOCOL_NAME_V3_1.len() + 4
        );
        assert_eq!(
            connect::HEADER_LEN_V3_1_1,
            2 + connect::PROTOCOL_NAME.len() + 4
        );
    }
}
