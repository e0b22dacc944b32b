use crate::error::{MqttError, Result};
use crate::packet::{ensure_no_payload, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyScope, PropertyValue};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut, Bytes};

/// AUTH packet for MQTT v5.0 enhanced authentication
///
/// Only the framing is checked here. The authentication exchange itself
/// belongs to whoever consumes the decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode, method: impl Into<String>) -> Self {
        let mut properties = Properties::default();
        properties.replace(
            PropertyId::AuthenticationMethod,
            PropertyValue::Utf8String(method.into()),
        );
        Self {
            reason_code,
            properties,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.properties.replace(
            PropertyId::AuthenticationData,
            PropertyValue::BinaryData(data.into()),
        );
        self
    }

    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        self.properties.get_string(PropertyId::AuthenticationMethod)
    }

    #[must_use]
    pub fn authentication_data(&self) -> Option<&Bytes> {
        self.properties.get_binary(PropertyId::AuthenticationData)
    }
}

impl MqttPacket for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, _version: ProtocolVersion) -> Result<()> {
        buf.put_u8(u8::from(self.reason_code));
        self.properties.encode(buf)
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        let mut packet = Self {
            reason_code: ReasonCode::Success,
            properties: Properties::default(),
        };

        if buf.has_remaining() {
            let reason_byte = buf.get_u8();
            packet.reason_code = ReasonCode::from_u8(reason_byte)
                .filter(|code| code.is_valid_for(PacketType::Auth))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Sent an AUTH with an invalid reason code '{reason_byte:#04x}'"
                    ))
                })?;
        }

        if buf.has_remaining() {
            packet.properties =
                Properties::decode(buf, PropertyScope::Packet(PacketType::Auth), ctx.config)?;
        }
        ensure_no_payload(buf, PacketType::Auth)?;

        if packet.authentication_method().is_none() {
            return Err(MqttError::ProtocolError(
                "Sent an AUTH without authentication method".to_string(),
            ));
        }

        Ok(packet)
    }
}
