//! Protocol version detection from the CONNECT variable header

use crate::constants::connect::{
    HEADER_LEN_V3_1, LEVEL_V3_1, LEVEL_V3_1_1, LEVEL_V5, PROTOCOL_NAME, PROTOCOL_NAME_V3_1,
};
use crate::error::{MqttError, Result};
use std::fmt;

/// MQTT protocol revision negotiated by the first CONNECT of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V3_1,
    V3_1_1,
    V5,
}

impl ProtocolVersion {
    /// Protocol level byte carried in CONNECT
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::V3_1 => LEVEL_V3_1,
            Self::V3_1_1 => LEVEL_V3_1_1,
            Self::V5 => LEVEL_V5,
        }
    }

    /// Protocol name carried in CONNECT
    #[must_use]
    pub fn protocol_name(self) -> &'static str {
        match self {
            Self::V3_1 => PROTOCOL_NAME_V3_1,
            Self::V3_1_1 | Self::V5 => PROTOCOL_NAME,
        }
    }

    #[must_use]
    pub fn is_v5(self) -> bool {
        self == Self::V5
    }

    /// Inspects a CONNECT body without consuming it and returns the version
    /// it announces.
    ///
    /// The protocol-name length tells 3.1 (`MQIsdp`, 6 bytes) apart from
    /// 3.1.1 and 5.0 (`MQTT`, 4 bytes); the level byte that follows the name
    /// separates the latter two.
    ///
    /// # Errors
    ///
    /// - `InvalidProtocolName` if the name length or name is not recognised
    /// - `MalformedPacket` if the body is too short to hold the header
    /// - `UnsupportedProtocolVersion` if the name is valid but the level is not
    pub fn peek_connect(body: &[u8]) -> Result<Self> {
        if body.len() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNECT too short for protocol name".to_string(),
            ));
        }

        let name_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
        let (expected, header_len) = match name_len {
            6 => (PROTOCOL_NAME_V3_1, HEADER_LEN_V3_1),
            // level byte only, flags and keep alive are checked per version
            4 => (PROTOCOL_NAME, 2 + 4 + 1),
            other => {
                return Err(MqttError::InvalidProtocolName(format!(
                    "protocol name length {other}"
                )))
            }
        };

        if body.len() < header_len {
            return Err(MqttError::MalformedPacket(
                "CONNECT too short for variable header".to_string(),
            ));
        }

        let name = &body[2..2 + name_len];
        if name != expected.as_bytes() {
            return Err(MqttError::InvalidProtocolName(
                String::from_utf8_lossy(name).into_owned(),
            ));
        }

        match (name_len, body[2 + name_len]) {
            (6, LEVEL_V3_1) => Ok(Self::V3_1),
            (4, LEVEL_V3_1_1) => Ok(Self::V3_1_1),
            (4, LEVEL_V5) => Ok(Self::V5),
            _ => Err(MqttError::UnsupportedProtocolVersion),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3_1 => f.write_str("MQTTv3.1"),
            Self::V3_1_1 => f.write_str("MQTTv3.1.1"),
            Self::V5 => f.write_str("MQTTv5"),
        }
    }
}
