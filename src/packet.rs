pub mod auth;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod subscribe;
pub mod unsubscribe;


use crate::config::EngineConfig;
use crate::connection::ConnectionState;
use crate::encoding::encode_variable_int;
use crate::error::{MqttError, Result};
use crate::protocol::v5::properties::{Properties, PropertyScope};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use bebytes::BeBytes;
use bytes::{Buf, BufMut, Bytes};
use std::fmt;

/// MQTT acknowledgment packet variable header using bebytes
/// Used by `PubAck`, `PubRec`, `PubRel`, and `PubComp` packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
pub struct AckPacketHeader {
    /// Packet identifier (big-endian u16)
    #[bebytes(big_endian)]
    pub packet_id: u16,
    /// Reason code (single byte)
    pub reason_code: u8,
}

impl AckPacketHeader {
    /// Creates a new acknowledgment packet header
    #[must_use]
    pub fn create(packet_id: u16, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            reason_code: u8::from(reason_code),
        }
    }

    /// Gets the reason code as a `ReasonCode` enum
    #[must_use]
    pub fn get_reason_code(&self) -> Option<ReasonCode> {
        ReasonCode::from_u8(self.reason_code)
    }
}

/// MQTT Fixed Header Type and Flags byte using bebytes for bit field operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
pub struct MqttTypeAndFlags {
    /// Message type (bits 7-4)
    #[bits(4)]
    pub message_type: u8,
    /// DUP flag (bit 3) - for PUBLISH packets
    #[bits(1)]
    pub dup: u8,
    /// `QoS` level (bits 2-1) - for PUBLISH packets
    #[bits(2)]
    pub qos: u8,
    /// RETAIN flag (bit 0) - for PUBLISH packets
    #[bits(1)]
    pub retain: u8,
}

impl MqttTypeAndFlags {
    /// Splits the first byte of a packet into its bit fields
    ///
    /// # Errors
    ///
    /// Only fails if the derived parser rejects a single byte
    pub fn parse(byte: u8) -> Result<Self> {
        let (parsed, _) = Self::try_from_be_bytes(&[byte])
            .map_err(|e| MqttError::MalformedPacket(format!("Invalid fixed header: {e:?}")))?;
        Ok(parsed)
    }

    /// Creates a new `MqttTypeAndFlags` for PUBLISH packets with `QoS` and flags
    #[must_use]
    pub fn for_publish(qos: u8, dup: bool, retain: bool) -> Self {
        Self {
            message_type: PacketType::Publish as u8,
            dup: u8::from(dup),
            qos,
            retain: u8::from(retain),
        }
    }

    /// Returns the packet type, `None` for the reserved type 0
    #[must_use]
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.message_type)
    }

    /// The low nibble as a single value
    #[must_use]
    pub fn flags(&self) -> u8 {
        (self.dup << 3) | (self.qos << 1) | self.retain
    }

    /// Returns true if the DUP flag is set
    #[must_use]
    pub fn is_dup(&self) -> bool {
        self.dup != 0
    }

    /// Returns true if the RETAIN flag is set
    #[must_use]
    pub fn is_retain(&self) -> bool {
        self.retain != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BeBytes)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    /// Converts a u8 to `PacketType`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        // Use the TryFrom implementation generated by BeBytes
        Self::try_from(value).ok()
    }

    /// Upper-case protocol name, as used in reason strings
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
            Self::Auth => "AUTH",
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// MQTT packet fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    /// Creates a new fixed header
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Encodes the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining length is too large
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let byte1 =
            (u8::from(self.packet_type) << 4) | (self.flags & crate::constants::masks::FLAGS);
        buf.put_u8(byte1);
        encode_variable_int(buf, self.remaining_length)?;
        Ok(())
    }

    /// Validates the flags for the packet type
    #[must_use]
    pub fn validate_flags(&self) -> bool {
        match self.packet_type {
            PacketType::Publish => true, // Publish has variable flags
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => {
                self.flags == crate::constants::masks::REQUIRED_FLAGS_0010
            }
            _ => self.flags == 0,
        }
    }

    /// Returns the flags as a checked error
    ///
    /// # Errors
    ///
    /// Returns `MalformedPacket` naming the packet type if the flags are wrong
    pub fn check_flags(&self) -> Result<()> {
        if self.validate_flags() {
            Ok(())
        } else {
            Err(MqttError::MalformedPacket(format!(
                "Sent a {} with an invalid fixed header",
                self.packet_type
            )))
        }
    }

    /// Returns the encoded length of the fixed header
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + crate::encoding::variable_int_len(self.remaining_length)
    }
}

/// Everything a per-type decoder may consult or update while decoding a body
pub struct DecodeContext<'a> {
    pub fixed_header: FixedHeader,
    pub version: ProtocolVersion,
    pub config: &'a EngineConfig,
    pub connection: &'a mut ConnectionState,
}

impl DecodeContext<'_> {
    #[must_use]
    pub fn is_v5(&self) -> bool {
        self.version.is_v5()
    }
}

/// A client-to-server type that strict mode would refuse, carried undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncheckedPacket {
    pub packet_type: PacketType,
    pub flags: u8,
    pub body: Bytes,
}

/// Enum representing the MQTT packets a broker receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Box<connect::ConnectPacket>),
    Publish(publish::PublishPacket),
    PubAck(puback::PubAckPacket),
    PubRec(pubrec::PubRecPacket),
    PubRel(pubrel::PubRelPacket),
    PubComp(pubcomp::PubCompPacket),
    Subscribe(subscribe::SubscribePacket),
    Unsubscribe(unsubscribe::UnsubscribePacket),
    PingReq,
    Disconnect(disconnect::DisconnectPacket),
    Auth(auth::AuthPacket),
    /// CONNACK, SUBACK or UNSUBACK accepted with strict checking off
    Unchecked(UncheckedPacket),
}

impl Packet {
    /// Decode a packet body based on the packet type.
    ///
    /// The `(type, version)` pair selects the decoder; each decoder handles
    /// the version differences itself.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure of the selected decoder
    pub fn decode_from_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        match ctx.fixed_header.packet_type {
            PacketType::Connect => {
                let packet = connect::ConnectPacket::decode_body(buf, ctx)?;
                Ok(Packet::Connect(Box::new(packet)))
            }
            PacketType::Publish => {
                let packet = publish::PublishPacket::decode_body(buf, ctx)?;
                Ok(Packet::Publish(packet))
            }
            PacketType::PubAck => {
                let packet = puback::PubAckPacket::decode_body(buf, ctx)?;
                Ok(Packet::PubAck(packet))
            }
            PacketType::PubRec => {
                let packet = pubrec::PubRecPacket::decode_body(buf, ctx)?;
                Ok(Packet::PubRec(packet))
            }
            PacketType::PubRel => {
                let packet = pubrel::PubRelPacket::decode_body(buf, ctx)?;
                Ok(Packet::PubRel(packet))
            }
            PacketType::PubComp => {
                let packet = pubcomp::PubCompPacket::decode_body(buf, ctx)?;
                Ok(Packet::PubComp(packet))
            }
            PacketType::Subscribe => {
                let packet = subscribe::SubscribePacket::decode_body(buf, ctx)?;
                Ok(Packet::Subscribe(packet))
            }
            PacketType::Unsubscribe => {
                let packet = unsubscribe::UnsubscribePacket::decode_body(buf, ctx)?;
                Ok(Packet::Unsubscribe(packet))
            }
            PacketType::PingReq => {
                pingreq::PingReqPacket::decode_body(buf, ctx)?;
                Ok(Packet::PingReq)
            }
            PacketType::Disconnect => {
                let packet = disconnect::DisconnectPacket::decode_body(buf, ctx)?;
                Ok(Packet::Disconnect(packet))
            }
            PacketType::Auth => {
                let packet = auth::AuthPacket::decode_body(buf, ctx)?;
                Ok(Packet::Auth(packet))
            }
            PacketType::ConnAck | PacketType::SubAck | PacketType::UnsubAck => {
                Ok(Packet::Unchecked(UncheckedPacket {
                    packet_type: ctx.fixed_header.packet_type,
                    flags: ctx.fixed_header.flags,
                    body: buf.copy_to_bytes(buf.remaining()),
                }))
            }
            PacketType::PingResp => Err(MqttError::ProtocolError(
                "Sent a PINGRESP message".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::PingReq => PacketType::PingReq,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
            Packet::Unchecked(packet) => packet.packet_type,
        }
    }
}

/// Trait for MQTT packets
pub trait MqttPacket: Sized {
    /// Returns the packet type
    fn packet_type(&self) -> PacketType;

    /// Returns the fixed header flags
    fn flags(&self) -> u8 {
        0
    }

    /// Encodes the packet body (without fixed header) for `version`
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()>;

    /// Decodes and validates the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or validation fails
    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self>;

    /// Encodes the complete packet (with fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    fn encode<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        // First encode to temporary buffer to get remaining length
        let mut body = Vec::new();
        self.encode_body(&mut body, version)?;

        let remaining_length = u32::try_from(body.len()).map_err(|_| MqttError::PacketTooLarge {
            size: body.len(),
            max: crate::encoding::VARIABLE_INT_MAX as usize,
        })?;
        let fixed_header = FixedHeader::new(self.packet_type(), self.flags(), remaining_length);

        fixed_header.encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// Reads a two byte packet identifier
///
/// # Errors
///
/// Returns `MalformedPacket` if fewer than 2 bytes remain
pub(crate) fn decode_packet_id<B: Buf>(buf: &mut B, packet_type: PacketType) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(format!(
            "Sent a {packet_type} with remaining length too short for packet identifier"
        )));
    }
    Ok(buf.get_u16())
}

/// Rejects trailing bytes in packets that carry no payload
///
/// # Errors
///
/// Returns `MalformedPacket` if any bytes remain
pub(crate) fn ensure_no_payload<B: Buf>(buf: &B, packet_type: PacketType) -> Result<()> {
    if buf.has_remaining() {
        return Err(MqttError::MalformedPacket(format!(
            "Sent a {packet_type} with payload"
        )));
    }
    Ok(())
}

/// Packet identifier, reason code and properties shared by the four
/// publish acknowledgements
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AckBody {
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AckBody {
    /// 3.x acks are exactly the packet identifier. v5 acks may append a
    /// reason code and then properties; a missing reason code means success.
    pub(crate) fn decode<B: Buf>(
        buf: &mut B,
        ctx: &DecodeContext<'_>,
        packet_type: PacketType,
    ) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        let packet_id = decode_packet_id(buf, packet_type)?;
        if packet_id == 0 {
            return Err(MqttError::ProtocolError(format!(
                "Sent a {packet_type} with packet identifier = '0'"
            )));
        }

        let mut ack = Self {
            packet_id,
            reason_code: ReasonCode::Success,
            properties: Properties::default(),
        };

        if !ctx.is_v5() || !buf.has_remaining() {
            ensure_no_payload(buf, packet_type)?;
            return Ok(ack);
        }

        let reason_byte = buf.get_u8();
        ack.reason_code = ReasonCode::from_u8(reason_byte)
            .filter(|code| code.is_valid_for(packet_type))
            .ok_or_else(|| {
                MqttError::MalformedPacket(format!(
                    "Sent a {packet_type} with an invalid reason code '{reason_byte:#04x}'"
                ))
            })?;

        if buf.has_remaining() {
            ack.properties =
                Properties::decode(buf, PropertyScope::Packet(packet_type), ctx.config)?;
        }
        ensure_no_payload(buf, packet_type)?;

        Ok(ack)
    }

    /// Writes the shortest form the version allows
    pub(crate) fn encode<B: BufMut>(
        packet_id: u16,
        reason_code: ReasonCode,
        properties: &Properties,
        buf: &mut B,
        version: ProtocolVersion,
    ) -> Result<()> {
        if !version.is_v5() {
            buf.put_u16(packet_id);
            return Ok(());
        }

        if properties.is_empty() {
            if reason_code == ReasonCode::Success {
                buf.put_u16(packet_id);
            } else {
                buf.put_slice(&AckPacketHeader::create(packet_id, reason_code).to_be_bytes());
            }
            return Ok(());
        }

        buf.put_slice(&AckPacketHeader::create(packet_id, reason_code).to_be_bytes());
        properties.encode(buf)
    }
}
