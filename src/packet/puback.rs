use crate::error::Result;
use crate::packet::{AckBody, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyValue};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};

/// MQTT PUBACK packet (`QoS` 1 publish acknowledgment)
///
/// A v5 PUBACK of exactly two bytes carries an implied success reason code.
/// With a reason code but no properties the property length may be omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubAckPacket {
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    /// PUBACK properties (v5.0 only)
    pub properties: Properties,
}

impl PubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self::new_with_reason(packet_id, ReasonCode::Success)
    }

    #[must_use]
    pub fn new_with_reason(packet_id: u16, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            reason_code,
            properties: Properties::default(),
        }
    }

    /// Sets the reason string
    #[must_use]
    pub fn with_reason_string(mut self, reason: impl Into<String>) -> Self {
        self.properties.replace(
            PropertyId::ReasonString,
            PropertyValue::Utf8String(reason.into()),
        );
        self
    }

    #[must_use]
    pub fn reason_string(&self) -> Option<&str> {
        self.properties.get_string(PropertyId::ReasonString)
    }
}

impl MqttPacket for PubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        AckBody::encode(
            self.packet_id,
            self.reason_code,
            &self.properties,
            buf,
            version,
        )
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        let ack = AckBody::decode(buf, ctx, PacketType::PubAck)?;
        Ok(Self {
            packet_id: ack.packet_id,
            reason_code: ack.reason_code,
            properties: ack.properties,
        })
    }
}
