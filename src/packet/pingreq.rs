use crate::error::Result;
use crate::packet::{ensure_no_payload, DecodeContext, MqttPacket, PacketType};
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};

/// MQTT PINGREQ packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingReqPacket;

impl MqttPacket for PingReqPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PingReq
    }

    fn encode_body<B: BufMut>(&self, _buf: &mut B, _version: ProtocolVersion) -> Result<()> {
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;
        ensure_no_payload(buf, PacketType::PingReq)?;
        Ok(Self)
    }
}
