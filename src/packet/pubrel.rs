use crate::error::Result;
use crate::packet::{AckBody, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyValue};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};

/// MQTT PUBREL packet (`QoS` 2 publish release, part 2)
///
/// The fixed header flags must be `0010`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRelPacket {
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    /// PUBREL properties (v5.0 only)
    pub properties: Properties,
}

impl PubRelPacket {
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

impl MqttPacket for PubRelPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PubRel
    }

    fn flags(&self) -> u8 {
        crate::constants::masks::REQUIRED_FLAGS_0010
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
        let ack = AckBody::decode(buf, ctx, PacketType::PubRel)?;
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

    fn decode(body: &[u8], flags: u8, version: ProtocolVersion) -> Result<PubRelPacket> {
        let config = EngineConfig::default();
        let mut connection = ConnectionState::new();
        let mut ctx = DecodeContext {
            fixed_header: FixedHeader::new(PacketType::PubRel, flags, body.len() as u32),
            version,
            config: &config,
            connection: &mut connection,
        };
        let mut buf = Bytes::copy_from_slice(body);
        PubRelPacket::decode_body(&mut buf, &mut ctx)
    }

    #[test]
    fn test_pubrel_flags() {
        assert!(decode(&[0x00, 0x05], 0x02, ProtocolVersion::V3_1_1).is_ok());
        assert!(matches!(
            decode(&[0x00, 0x05], 0x00, ProtocolVersion::V3_1_1),
            Err(MqttError::MalformedPacket(_))
        ));
        assert_eq!(PubRelPacket::new(5).flags(), 0x02);
    }

    #[test]
    fn test_pubrel_not_found() {
        let ack = decode(&[0x00, 0x05, 0x92, 0x00], 0x02, ProtocolVersion::V5).unwrap();
        assert_eq!(ack.reason_code, ReasonCode::PacketIdentifierNotFound);
    }

}
