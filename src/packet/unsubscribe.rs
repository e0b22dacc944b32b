use crate::encoding::{decode_string_with, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyScope};
use crate::protocol::ProtocolVersion;
use crate::validation::{validate_topic_filter, SharedSubscription};
use bytes::{Buf, BufMut};

/// MQTT UNSUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    /// Topic filters to unsubscribe from
    pub filters: Vec<String>,
    /// UNSUBSCRIBE properties (v5.0 only)
    pub properties: Properties,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        crate::constants::masks::REQUIRED_FLAGS_0010
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        buf.put_u16(self.packet_id);

        if version.is_v5() {
            self.properties.encode(buf)?;
        }

        for filter in &self.filters {
            encode_string(buf, filter)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        let packet_id = decode_packet_id(buf, PacketType::Unsubscribe)?;
        if packet_id == 0 {
            return Err(MqttError::ProtocolError(
                "Sent an UNSUBSCRIBE with packet identifier = '0'".to_string(),
            ));
        }

        let properties = if ctx.is_v5() {
            Properties::decode(buf, PropertyScope::Packet(PacketType::Unsubscribe), ctx.config)?
        } else {
            Properties::default()
        };

        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string_with(buf, ctx.config.validate_utf8).map_err(|_| {
                MqttError::MalformedPacket(
                    "Sent an UNSUBSCRIBE with a malformed topic filter".to_string(),
                )
            })?;

            let inner = SharedSubscription::parse(&filter)?.map_or(filter.as_str(), |s| s.filter);
            validate_topic_filter(inner, ctx.config)?;

            filters.push(filter);
        }

        if filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "Sent an UNSUBSCRIBE without topic filters".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            filters,
            properties,
        })
    }
}
