use crate::encoding::encode_variable_int;
use crate::error::{MqttError, Result};
use crate::packet::{ensure_no_payload, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyScope, PropertyValue};
use crate::protocol::v5::reason_codes::{ReasonCode, NORMAL_DISCONNECTION};
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};

/// MQTT DISCONNECT packet
///
/// The engine both decodes client DISCONNECTs and builds the ones it sends
/// before closing a v5 connection on a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    /// DISCONNECT properties (v5.0 only)
    pub properties: Properties,
}

impl Default for DisconnectPacket {
    fn default() -> Self {
        Self::normal()
    }
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }

    /// Creates a normal disconnection packet
    #[must_use]
    pub fn normal() -> Self {
        Self::new(NORMAL_DISCONNECTION)
    }

    #[must_use]
    pub fn with_session_expiry_interval(mut self, seconds: u32) -> Self {
        self.properties.replace(
            PropertyId::SessionExpiryInterval,
            PropertyValue::FourByteInteger(seconds),
        );
        self
    }

    #[must_use]
    pub fn with_reason_string(mut self, reason: impl Into<String>) -> Self {
        self.properties.replace(
            PropertyId::ReasonString,
            PropertyValue::Utf8String(reason.into()),
        );
        self
    }

    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        self.properties.get_u32(PropertyId::SessionExpiryInterval)
    }

    #[must_use]
    pub fn reason_string(&self) -> Option<&str> {
        self.properties.get_string(PropertyId::ReasonString)
    }

    /// A client may only raise the session expiry if its CONNECT left it
    /// non-zero. The accepted value is capped and written to the connection.
    fn apply_session_expiry(&mut self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let Some(requested) = self.session_expiry_interval() else {
            return Ok(());
        };

        if requested != 0 && ctx.connection.session_expiry_interval() == 0 {
            return Err(MqttError::ProtocolError(
                "Sent a DISCONNECT with session expiry interval, but session expiry interval in CONNECT was 0"
                    .to_string(),
            ));
        }

        let capped = requested.min(ctx.config.max_session_expiry_interval);
        if capped != requested {
            self.properties.replace(
                PropertyId::SessionExpiryInterval,
                PropertyValue::FourByteInteger(capped),
            );
        }
        ctx.connection.set_session_expiry_interval(capped);
        Ok(())
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        if !version.is_v5() {
            return Ok(());
        }

        // Remaining length 0 means normal disconnection without properties
        if self.reason_code == NORMAL_DISCONNECTION && self.properties.is_empty() {
            return Ok(());
        }

        buf.put_u8(u8::from(self.reason_code));
        if self.properties.is_empty() {
            encode_variable_int(buf, 0)?;
        } else {
            self.properties.encode(buf)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        if !ctx.is_v5() || !buf.has_remaining() {
            ensure_no_payload(buf, PacketType::Disconnect)?;
            return Ok(Self::normal());
        }

        let reason_byte = buf.get_u8();
        let reason_code = ReasonCode::from_u8(reason_byte)
            .filter(|code| code.is_valid_for(PacketType::Disconnect))
            .ok_or_else(|| {
                MqttError::MalformedPacket(format!(
                    "Sent a DISCONNECT with an invalid reason code '{reason_byte:#04x}'"
                ))
            })?;

        let mut packet = Self::new(reason_code);

        if buf.has_remaining() {
            packet.properties = Properties::decode(
                buf,
                PropertyScope::Packet(PacketType::Disconnect),
                ctx.config,
            )?;
        }
        ensure_no_payload(buf, PacketType::Disconnect)?;

        if packet.properties.contains(PropertyId::ServerReference) {
            return Err(MqttError::ProtocolError(
                "Sent a DISCONNECT with a server reference".to_string(),
            ));
        }

        packet.apply_session_expiry(ctx)?;

        Ok(packet)
    }
}
