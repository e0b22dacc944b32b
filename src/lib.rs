//! # MQTT Protocol Engine
//!
//! The broker-side core of an MQTT 3.1 / 3.1.1 / 5.0 server: a frame decoder
//! that turns an untrusted, partially delivered byte stream into validated
//! packets, and a per-connection QoS delivery engine.
//!
//! The engine does no I/O of its own. A connection task owns a
//! [`ConnectionState`], feeds read buffers to [`MqttDecoder::decode`] and
//! drives a [`QosEngine`] with what comes out:
//!
//! ```rust,no_run
//! use bytes::BytesMut;
//! use mqtt_protocol_engine::testing::RecordingTerminator;
//! use mqtt_protocol_engine::{ConnectionState, DecodeOutcome, EngineConfig, MqttDecoder};
//!
//! let mut decoder = MqttDecoder::new(EngineConfig::default(), RecordingTerminator::default());
//! let mut connection = ConnectionState::new();
//! let mut buf = BytesMut::from(&[0x10, 0x0D][..]);
//!
//! loop {
//!     match decoder.decode(&mut connection, &mut buf) {
//!         DecodeOutcome::Decoded(packet) => println!("{:?}", packet.packet_type()),
//!         DecodeOutcome::NeedMoreData => break, // read more bytes
//!         DecodeOutcome::Rejected(rejection) => {
//!             println!("connection terminated: {}", rejection.error);
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! Protocol violations never surface as a bare error: by the time
//! [`DecodeOutcome::Rejected`] is returned the [`Disconnector`] or
//! [`Connacker`] has already been told to end the connection.

#![warn(clippy::pedantic)]

pub mod config;
pub mod connection;
pub mod constants;
pub mod decoder;
pub mod disconnect;
pub mod encoding;
pub mod error;
pub mod flags;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod testing;
pub mod validation;

pub use config::EngineConfig;
pub use connection::{ConnectionId, ConnectionState};
pub use decoder::{DecodeOutcome, MqttDecoder};
pub use disconnect::{Connacker, Disconnector, RejectAction, Rejection};
pub use error::{MqttError, Result};
pub use packet::publish::PublishPacket;
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use protocol::v5::properties::{Properties, PropertyId, PropertyValue};
pub use protocol::v5::reason_codes::ReasonCode;
pub use protocol::ProtocolVersion;
pub use session::{
    DeliveryHandle, DeliveryStatus, InboundDecision, OutboundPacket, PacketSink, QosEngine,
    Submission,
};
pub use storage::{FlowRecord, FlowStore, MemoryFlowStore};
pub use validation::{is_valid_topic_filter, is_valid_topic_name, validate_topic_filter, validate_topic_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_values() {
        assert_eq!(QoS::AtMostOnce as u8, 0);
        assert_eq!(QoS::AtLeastOnce as u8, 1);
        assert_eq!(QoS::ExactlyOnce as u8, 2);
    }

    #[test]
    fn test_qos_try_from_u8() {
        assert_eq!(QoS::try_from(0), Ok(QoS::AtMostOnce));
        assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
        assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));

        assert_eq!(QoS::try_from(3), Err(MqttError::InvalidQoS(3)));
        assert_eq!(QoS::try_from(255), Err(MqttError::InvalidQoS(255)));
    }

    #[test]
    fn test_qos_into_u8() {
        assert_eq!(u8::from(QoS::AtMostOnce), 0);
        assert_eq!(u8::from(QoS::AtLeastOnce), 1);
        assert_eq!(u8::from(QoS::ExactlyOnce), 2);
        assert!(QoS::ExactlyOnce > QoS::AtLeastOnce);
    }
}
