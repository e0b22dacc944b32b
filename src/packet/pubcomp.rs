use crate::error::Result;
use crate::packet::{AckBody, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyValue};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};

/// MQTT PUBCOMP packet (`QoS` 2 publish complete, part 3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubCompPacket {
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    /// PUBCOMP properties (v5.0 only)
    pub properties: Properties,
}

impl PubCompPacket {
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

impl MqttPacket for PubCompPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PubComp
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
        let ack = AckBody::decode(buf, ctx, PacketType::PubComp)?;
        Ok(Self {
            packet_id: ack.packet_id,
            reason_code: ack.reason_code,
            properties: ack.properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::connection::ConnectionState;
    use crate::error::MqttError;
    use crate::packet::FixedHeader;
    use bytes::{Bytes, BytesMut};

    fn decode(body: &[u8], flags: u8, version: ProtocolVersion) -> Result<PubCompPacket> {
        let config = EngineConfig::default();
        let mut connection = ConnectionState::new();
        let mut ctx = DecodeContext {
            fixed_header: FixedHeader::new(PacketType::PubComp, flags, body.len() as u32),
            version,
            config: &config,
            connection: &mut connection,
        };
        let mut buf = Bytes::copy_from_slice(body);
        PubCompPacket::decode_body(&mut buf, &mut ctx)
    }

    #[test]
    fn test_pubcomp_round_trip() {
        let packet = PubCompPacket::new(300);
        let mut buf = BytesMut::new();
        packet.encode_body(&mut buf, ProtocolVersion::V5).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x2C]);
        assert_eq!(decode(&buf, 0, ProtocolVersion::V5).unwrap(), packet);
    }

    #[test]
    fn test_pubcomp_user_property_size() {
        // one user property "k" = "v" within the default limit
        let body = [0x00, 0x01, 0x00, 0x07, 0x26, 0x00, 0x01, b'k', 0x00, 0x01, b'v'];
        let ack = decode(&body, 0, ProtocolVersion::V5).unwrap();
        assert_eq!(ack.properties.user_properties().count(), 1);
    }

}
