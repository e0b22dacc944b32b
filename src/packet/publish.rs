use crate::encoding::{decode_string_with, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, DecodeContext, MqttPacket, MqttTypeAndFlags, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyScope, PropertyValue};
use crate::protocol::ProtocolVersion;
use crate::validation::{contains_wildcard, is_valid_utf8_payload, validate_topic_name};
use crate::QoS;
use bytes::{Buf, BufMut, Bytes};

/// MQTT PUBLISH packet
///
/// After decoding, `topic_name` is always the effective topic: a v5 topic
/// alias has already been resolved against the connection's alias table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Topic name
    pub topic_name: String,
    /// Packet identifier (present for `QoS` > 0)
    pub packet_id: Option<u16>,
    /// Message payload
    pub payload: Bytes,
    /// Quality of Service level
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
    /// Duplicate delivery flag
    pub dup: bool,
    /// PUBLISH properties (v5.0 only)
    pub properties: Properties,
}

impl PublishPacket {
    /// Creates a new PUBLISH packet
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
            properties: Properties::default(),
        }
    }

    /// Sets the packet identifier. Ignored for `QoS` 0.
    #[must_use]
    pub fn with_packet_id(mut self, id: u16) -> Self {
        if self.qos != QoS::AtMostOnce {
            self.packet_id = Some(id);
        }
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    /// Sets the topic alias
    #[must_use]
    pub fn with_topic_alias(mut self, alias: u16) -> Self {
        self.properties
            .replace(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(alias));
        self
    }

    /// Sets the message expiry interval
    #[must_use]
    pub fn with_message_expiry_interval(mut self, seconds: u32) -> Self {
        self.properties.replace(
            PropertyId::MessageExpiryInterval,
            PropertyValue::FourByteInteger(seconds),
        );
        self
    }

    /// Sets the payload format indicator
    #[must_use]
    pub fn with_payload_format_indicator(mut self, is_utf8: bool) -> Self {
        self.properties.replace(
            PropertyId::PayloadFormatIndicator,
            PropertyValue::Byte(u8::from(is_utf8)),
        );
        self
    }

    /// Adds any other PUBLISH property
    #[must_use]
    pub fn with_property(mut self, id: PropertyId, value: PropertyValue) -> Self {
        let _ = self.properties.add(id, value);
        self
    }

    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        self.properties.get_u16(PropertyId::TopicAlias)
    }

    #[must_use]
    pub fn message_expiry_interval(&self) -> Option<u32> {
        self.properties.get_u32(PropertyId::MessageExpiryInterval)
    }

    #[must_use]
    pub fn is_utf8_payload(&self) -> bool {
        self.properties.get_byte(PropertyId::PayloadFormatIndicator) == Some(1)
    }

    fn decode_properties<B: Buf>(
        buf: &mut B,
        topic_name: &mut String,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Properties> {
        let config = ctx.config;
        let mut properties =
            Properties::decode(buf, PropertyScope::Packet(PacketType::Publish), config)?;

        if properties.contains(PropertyId::SubscriptionIdentifier) {
            return Err(MqttError::ProtocolError(
                "Sent a PUBLISH with a subscription identifier".to_string(),
            ));
        }

        if properties
            .get_byte(PropertyId::PayloadFormatIndicator)
            .is_some_and(|indicator| indicator > 1)
        {
            return Err(MqttError::MalformedPacket(
                "Sent a PUBLISH with an invalid payload format indicator".to_string(),
            ));
        }

        if let Some(response_topic) = properties.get_string(PropertyId::ResponseTopic) {
            if contains_wildcard(response_topic) {
                return Err(MqttError::TopicNameInvalid(format!(
                    "response topic '{response_topic}' contains wildcard characters"
                )));
            }
        }

        match properties.get_u16(PropertyId::TopicAlias) {
            Some(0) => {
                return Err(MqttError::ProtocolError(
                    "Sent a PUBLISH with topic alias = '0'".to_string(),
                ))
            }
            Some(alias) => {
                let aliases = ctx.connection.topic_aliases_mut();
                if usize::from(alias) > aliases.maximum() {
                    return Err(MqttError::TopicAliasInvalid(alias));
                }
                if topic_name.is_empty() {
                    *topic_name = aliases.resolve(alias)?.to_string();
                } else {
                    aliases.register(alias, topic_name)?;
                }
            }
            None if topic_name.is_empty() => {
                return Err(MqttError::ProtocolError(
                    "Sent a PUBLISH with an empty topic and no topic alias".to_string(),
                ))
            }
            None => {}
        }

        if let Some(expiry) = properties.get_u32(PropertyId::MessageExpiryInterval) {
            if expiry > config.max_message_expiry_interval {
                properties.replace(
                    PropertyId::MessageExpiryInterval,
                    PropertyValue::FourByteInteger(config.max_message_expiry_interval),
                );
            }
        }

        Ok(properties)
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        MqttTypeAndFlags::for_publish(self.qos as u8, self.dup, self.retain).flags()
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        encode_string(buf, &self.topic_name)?;

        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::MalformedPacket("Packet ID required for QoS > 0".to_string())
            })?;
            buf.put_u16(packet_id);
        }

        if version.is_v5() {
            self.properties.encode(buf)?;
        }

        buf.put_slice(&self.payload);

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        let header = MqttTypeAndFlags::parse(
            (u8::from(PacketType::Publish) << 4) | ctx.fixed_header.flags,
        )?;

        let qos = QoS::try_from(header.qos).map_err(|_| {
            MqttError::MalformedPacket("Sent a PUBLISH with QoS 3".to_string())
        })?;
        let dup = header.is_dup();
        let retain = header.is_retain();

        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::ProtocolError(
                "Sent a PUBLISH with QoS 0 and DUP set to 1".to_string(),
            ));
        }

        if retain && !ctx.config.retained_messages_enabled {
            return Err(MqttError::RetainNotSupported);
        }

        let mut topic_name = decode_string_with(buf, ctx.config.validate_utf8).map_err(|_| {
            MqttError::MalformedPacket("Sent a PUBLISH with a malformed topic".to_string())
        })?;

        if !topic_name.is_empty() {
            validate_topic_name(&topic_name, ctx.config)?;
        } else if !ctx.is_v5() {
            return Err(MqttError::ProtocolError(
                "Sent a PUBLISH with an empty topic".to_string(),
            ));
        }

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let id = decode_packet_id(buf, PacketType::Publish)?;
            if id == 0 {
                return Err(MqttError::ProtocolError(
                    "Sent a PUBLISH with packet identifier = '0'".to_string(),
                ));
            }
            Some(id)
        };

        let properties = if ctx.is_v5() {
            Self::decode_properties(buf, &mut topic_name, ctx)?
        } else {
            Properties::default()
        };

        let payload = buf.copy_to_bytes(buf.remaining());

        let packet = Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain,
            dup,
            properties,
        };

        if ctx.config.validate_utf8
            && packet.is_utf8_payload()
            && !is_valid_utf8_payload(&packet.payload)
        {
            return Err(MqttError::PayloadFormatInvalid);
        }

        if qos as u8 > ctx.config.maximum_qos {
            return Err(MqttError::QoSNotSupported);
        }

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::connection::ConnectionState;
    use crate::packet::connect::ConnectPacket;
    use crate::packet::FixedHeader;
    use bytes::BytesMut;

    fn connected(version: ProtocolVersion, config: &EngineConfig) -> ConnectionState {
        let mut connection = ConnectionState::new();
        connection
            .accept_connect(&ConnectPacket::new(version, "pub-client"), config)
            .unwrap();
        connection
    }

    fn decode_raw(
        flags: u8,
        body: &[u8],
        version: ProtocolVersion,
        config: &EngineConfig,
        connection: &mut ConnectionState,
    ) -> Result<PublishPacket> {
        let mut ctx = DecodeContext {
            fixed_header: FixedHeader::new(PacketType::Publish, flags, body.len() as u32),
            version,
            config,
            connection,
        };
        let mut buf = Bytes::copy_from_slice(body);
        PublishPacket::decode_body(&mut buf, &mut ctx)
    }

    fn decode_packet(
        packet: &PublishPacket,
        version: ProtocolVersion,
        config: &EngineConfig,
        connection: &mut ConnectionState,
    ) -> Result<PublishPacket> {
        let mut body = BytesMut::new();
        packet.encode_body(&mut body, version).unwrap();
        decode_raw(packet.flags(), &body, version, config, connection)
    }

    #[test]
    fn test_publish_v311_qos1() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V3_1_1, &config);
        let packet = PublishPacket::new("sensors/temp", &b"21.5"[..], QoS::AtLeastOnce)
            .with_packet_id(42)
            .with_retain(true);

        let decoded =
            decode_packet(&packet, ProtocolVersion::V3_1_1, &config, &mut connection).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_publish_flag_errors() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V5, &config);
        let body = [0x00, 0x01, b't', 0x00, 0x01, 0x00];

        assert!(matches!(
            decode_raw(0x06, &body, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::MalformedPacket(_))
        ));
        assert!(matches!(
            decode_raw(0x08, &[0x00, 0x01, b't', 0x00], ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_publish_retain_not_supported() {
        let config = EngineConfig::default().with_retained_messages(false);
        let mut connection = connected(ProtocolVersion::V5, &config);
        let packet = PublishPacket::new("t", &b""[..], QoS::AtMostOnce).with_retain(true);
        assert_eq!(
            decode_packet(&packet, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::RetainNotSupported)
        );
    }

    #[test]
    fn test_publish_qos_not_supported() {
        let config = EngineConfig::default().with_maximum_qos(1);
        let mut connection = connected(ProtocolVersion::V5, &config);
        let packet = PublishPacket::new("t", &b"x"[..], QoS::ExactlyOnce).with_packet_id(1);
        assert_eq!(
            decode_packet(&packet, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::QoSNotSupported)
        );
    }

    #[test]
    fn test_publish_wildcard_topic() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V3_1_1, &config);
        let packet = PublishPacket::new("a/#", &b"x"[..], QoS::AtMostOnce);
        assert!(matches!(
            decode_packet(&packet, ProtocolVersion::V3_1_1, &config, &mut connection),
            Err(MqttError::TopicNameInvalid(_))
        ));
    }

    #[test]
    fn test_publish_packet_id_zero() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V3_1_1, &config);
        let body = [0x00, 0x01, b't', 0x00, 0x00];
        assert!(matches!(
            decode_raw(0x02, &body, ProtocolVersion::V3_1_1, &config, &mut connection),
            Err(MqttError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_topic_alias_register_then_resolve() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V5, &config);

        let first = PublishPacket::new("long/topic/name", &b"1"[..], QoS::AtMostOnce)
            .with_topic_alias(3);
        let decoded =
            decode_packet(&first, ProtocolVersion::V5, &config, &mut connection).unwrap();
        assert_eq!(decoded.topic_name, "long/topic/name");

        let second = PublishPacket::new("", &b"2"[..], QoS::AtMostOnce).with_topic_alias(3);
        let decoded =
            decode_packet(&second, ProtocolVersion::V5, &config, &mut connection).unwrap();
        assert_eq!(decoded.topic_name, "long/topic/name");
        assert_eq!(decoded.topic_alias(), Some(3));
    }

    #[test]
    fn test_topic_alias_errors() {
        let config = EngineConfig::default().with_topic_alias_maximum(2);
        let mut connection = connected(ProtocolVersion::V5, &config);

        let unmapped = PublishPacket::new("", &b""[..], QoS::AtMostOnce).with_topic_alias(1);
        assert_eq!(
            decode_packet(&unmapped, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::TopicAliasInvalid(1))
        );

        let too_large = PublishPacket::new("t", &b""[..], QoS::AtMostOnce).with_topic_alias(3);
        assert_eq!(
            decode_packet(&too_large, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::TopicAliasInvalid(3))
        );

        let zero = PublishPacket::new("t", &b""[..], QoS::AtMostOnce).with_topic_alias(0);
        assert!(matches!(
            decode_packet(&zero, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::ProtocolError(_))
        ));

        let empty = PublishPacket::new("", &b""[..], QoS::AtMostOnce);
        assert!(matches!(
            decode_packet(&empty, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_subscription_identifier_rejected() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V5, &config);
        let packet = PublishPacket::new("t", &b""[..], QoS::AtMostOnce).with_property(
            PropertyId::SubscriptionIdentifier,
            PropertyValue::VariableByteInteger(4),
        );
        assert!(matches!(
            decode_packet(&packet, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_payload_format_and_expiry() {
        let config = EngineConfig::default().with_max_message_expiry_interval(60);
        let mut connection = connected(ProtocolVersion::V5, &config);

        let bad = PublishPacket::new("t", &[0xFFu8, 0xFE][..], QoS::AtMostOnce)
            .with_payload_format_indicator(true);
        assert_eq!(
            decode_packet(&bad, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::PayloadFormatInvalid)
        );

        let capped = PublishPacket::new("t", &b"ok"[..], QoS::AtMostOnce)
            .with_payload_format_indicator(true)
            .with_message_expiry_interval(3600);
        let decoded =
            decode_packet(&capped, ProtocolVersion::V5, &config, &mut connection).unwrap();
        assert_eq!(decoded.message_expiry_interval(), Some(60));
    }

    #[test]
    fn test_response_topic_wildcard() {
        let config = EngineConfig::default();
        let mut connection = connected(ProtocolVersion::V5, &config);
        let packet = PublishPacket::new("req", &b""[..], QoS::AtMostOnce).with_property(
            PropertyId::ResponseTopic,
            PropertyValue::Utf8String("resp/+".into()),
        );
        assert!(matches!(
            decode_packet(&packet, ProtocolVersion::V5, &config, &mut connection),
            Err(MqttError::TopicNameInvalid(_))
        ));
    }

    #[test]
    fn test_utf8_check_disabled() {
        let config = EngineConfig::default().with_validate_utf8(false);
        let mut connection = connected(ProtocolVersion::V5, &config);
        let packet = PublishPacket::new("t", &[0xFFu8][..], QoS::AtMostOnce)
            .with_payload_format_indicator(true);
        assert!(decode_packet(&packet, ProtocolVersion::V5, &config, &mut connection).is_ok());
    }
}
