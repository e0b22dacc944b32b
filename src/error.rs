use crate::protocol::v5::reason_codes::ReasonCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

/// Protocol engine errors
///
/// Every variant that can be caused by a peer maps onto an MQTT 5 reason
/// code through [`MqttError::reason_code`]. The frame decoder uses that code
/// when it terminates the connection.
///
/// # Error Categories
///
/// - **Framing**: `MalformedPacket`, `PacketTooLarge`, `InvalidPacketType`
/// - **Semantics**: `ProtocolError`, `DuplicatePropertyId`, `TopicAliasInvalid`
/// - **Capabilities**: `RetainNotSupported`, `QoSNotSupported`, `WildcardSubscriptionsNotSupported`
/// - **Flow Control**: `ReceiveMaximumExceeded`, `QuotaExceeded`
/// - **Collaborators**: `Storage`, `Io`, `NotConnected`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("User properties too large: size {size} exceeds maximum {max}")]
    UserPropertiesTooLarge { size: usize, max: usize },

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("Invalid protocol name: {0}")]
    InvalidProtocolName(String),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid fixed header flags {flags:#04x} for packet type {packet_type}")]
    InvalidFixedHeaderFlags { packet_type: u8, flags: u8 },

    #[error("Invalid property ID: {0}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: {0}")]
    DuplicatePropertyId(u8),

    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(u8),

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid topic name: {0}")]
    TopicNameInvalid(String),

    #[error("Invalid topic filter: {0}")]
    TopicFilterInvalid(String),

    #[error("Topic alias invalid: {0}")]
    TopicAliasInvalid(u16),

    #[error("Client identifier not valid")]
    ClientIdentifierNotValid,

    #[error("Bad authentication method")]
    BadAuthenticationMethod,

    #[error("Payload format invalid")]
    PayloadFormatInvalid,

    #[error("Retain not supported")]
    RetainNotSupported,

    #[error("QoS not supported")]
    QoSNotSupported,

    #[error("Shared subscriptions not supported")]
    SharedSubscriptionsNotSupported,

    #[error("Subscription identifiers not supported")]
    SubscriptionIdentifiersNotSupported,

    #[error("Wildcard subscriptions not supported")]
    WildcardSubscriptionsNotSupported,

    #[error("Receive maximum exceeded")]
    ReceiveMaximumExceeded,

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("Not connected")]
    NotConnected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    /// The MQTT 5 reason code reported to the peer for this error
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            MqttError::MalformedPacket(_)
            | MqttError::InvalidPacketType(_)
            | MqttError::InvalidFixedHeaderFlags { .. }
            | MqttError::InvalidPropertyId(_)
            | MqttError::InvalidReasonCode(_)
            | MqttError::InvalidQoS(_) => ReasonCode::MalformedPacket,
            MqttError::ProtocolError(_) | MqttError::DuplicatePropertyId(_) => {
                ReasonCode::ProtocolError
            }
            MqttError::PacketTooLarge { .. } | MqttError::UserPropertiesTooLarge { .. } => {
                ReasonCode::PacketTooLarge
            }
            MqttError::UnsupportedProtocolVersion | MqttError::InvalidProtocolName(_) => {
                ReasonCode::UnsupportedProtocolVersion
            }
            MqttError::TopicNameInvalid(_) => ReasonCode::TopicNameInvalid,
            MqttError::TopicFilterInvalid(_) => ReasonCode::TopicFilterInvalid,
            MqttError::TopicAliasInvalid(_) => ReasonCode::TopicAliasInvalid,
            MqttError::ClientIdentifierNotValid => ReasonCode::ClientIdentifierNotValid,
            MqttError::BadAuthenticationMethod => ReasonCode::BadAuthenticationMethod,
            MqttError::PayloadFormatInvalid => ReasonCode::PayloadFormatInvalid,
            MqttError::RetainNotSupported => ReasonCode::RetainNotSupported,
            MqttError::QoSNotSupported => ReasonCode::QoSNotSupported,
            MqttError::SharedSubscriptionsNotSupported => {
                ReasonCode::SharedSubscriptionsNotSupported
            }
            MqttError::SubscriptionIdentifiersNotSupported => {
                ReasonCode::SubscriptionIdentifiersNotSupported
            }
            MqttError::WildcardSubscriptionsNotSupported => {
                ReasonCode::WildcardSubscriptionsNotSupported
            }
            MqttError::ReceiveMaximumExceeded => ReasonCode::ReceiveMaximumExceeded,
            MqttError::QuotaExceeded => ReasonCode::QuotaExceeded,
            MqttError::Io(_)
            | MqttError::NotConnected
            | MqttError::Storage(_)
            | MqttError::Configuration(_) => ReasonCode::ImplementationSpecificError,
        }
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MqttError {
    fn from(err: toml::de::Error) -> Self {
        MqttError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = MqttError::TopicNameInvalid("test/+/topic".to_string());
        assert_eq!(err.to_string(), "Invalid topic name: test/+/topic");

        let err = MqttError::PacketTooLarge {
            size: 1000,
            max: 500,
        };
        assert_eq!(
            err.to_string(),
            "Packet too large: size 1000 exceeds maximum 500"
        );

        let err = MqttError::InvalidFixedHeaderFlags {
            packet_type: 8,
            flags: 0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid fixed header flags 0x00 for packet type 8"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let mqtt_err: MqttError = io_err.into();
        match mqtt_err {
            MqttError::Io(msg) => assert!(msg.contains("reset")),
            _ => panic!("Expected IO error"),
        }
    }

    #[test]
    fn test_reason_code_mapping() {
        assert_eq!(
            MqttError::MalformedPacket(String::new()).reason_code(),
            ReasonCode::MalformedPacket
        );
        assert_eq!(
            MqttError::DuplicatePropertyId(0x23).reason_code(),
            ReasonCode::ProtocolError
        );
        assert_eq!(
            MqttError::UserPropertiesTooLarge { size: 2, max: 1 }.reason_code(),
            ReasonCode::PacketTooLarge
        );
        assert_eq!(
            MqttError::TopicAliasInvalid(7).reason_code(),
            ReasonCode::TopicAliasInvalid
        );
        assert_eq!(
            MqttError::ReceiveMaximumExceeded.reason_code(),
            ReasonCode::ReceiveMaximumExceeded
        );
        assert_eq!(
            MqttError::RetainNotSupported.reason_code(),
            ReasonCode::RetainNotSupported
        );
        assert_eq!(
            MqttError::Storage("disk".into()).reason_code(),
            ReasonCode::ImplementationSpecificError
        );
    }

    #[test]
    fn test_every_peer_error_is_a_failure_code() {
        let errors = [
            MqttError::MalformedPacket("x".into()),
            MqttError::ProtocolError("x".into()),
            MqttError::UnsupportedProtocolVersion,
            MqttError::QoSNotSupported,
            MqttError::WildcardSubscriptionsNotSupported,
            MqttError::QuotaExceeded,
        ];
        for err in errors {
            assert!(err.reason_code().is_error(), "{err} must map to >= 0x80");
        }
    }
}
