use crate::constants::connect::{HEADER_LEN_V3_1, HEADER_LEN_V3_1_1};
use crate::constants::limits::MAX_PACKET_SIZE_NO_LIMIT;
use crate::encoding::{decode_binary, decode_string_with, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::flags::ConnectFlags;
use crate::packet::{DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyScope, PropertyValue};
use crate::protocol::ProtocolVersion;
use crate::validation::{contains_wildcard, is_valid_utf8_payload, validate_topic_name};
use crate::QoS;
use bebytes::BeBytes;
use bytes::{Buf, BufMut, Bytes};

/// Last will carried by a CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    /// Will properties (v5.0 only)
    pub properties: Properties,
}

impl WillMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Adds a will property, ignoring values the container refuses
    #[must_use]
    pub fn with_property(mut self, id: PropertyId, value: PropertyValue) -> Self {
        let _ = self.properties.add(id, value);
        self
    }

    /// Seconds the server waits before publishing the will, 0 if absent
    #[must_use]
    pub fn delay_interval(&self) -> u32 {
        self.properties
            .get_u32(PropertyId::WillDelayInterval)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn message_expiry_interval(&self) -> Option<u32> {
        self.properties.get_u32(PropertyId::MessageExpiryInterval)
    }

    #[must_use]
    pub fn is_utf8_payload(&self) -> bool {
        self.properties.get_byte(PropertyId::PayloadFormatIndicator) == Some(1)
    }
}

/// MQTT CONNECT packet
///
/// The resolved fields hold what the connection negotiates: defaults are
/// filled in when the client omits a property, and intervals are already
/// capped to the server maxima.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_version: ProtocolVersion,
    /// Clean start flag (Clean Session in v3.x)
    pub clean_start: bool,
    /// Keep alive interval in seconds
    pub keep_alive: u16,
    /// Client identifier, may be empty when the server is to assign one
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<WillMessage>,
    pub session_expiry_interval: u32,
    /// Outbound in-flight capacity the client accepts
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub topic_alias_maximum: u16,
    pub request_response_information: bool,
    pub request_problem_information: bool,
    /// CONNECT properties (v5.0 only)
    pub properties: Properties,
}

impl ConnectPacket {
    /// Creates a CONNECT with protocol defaults
    #[must_use]
    pub fn new(protocol_version: ProtocolVersion, client_id: impl Into<String>) -> Self {
        Self {
            protocol_version,
            clean_start: true,
            keep_alive: 60,
            client_id: client_id.into(),
            username: None,
            password: None,
            will: None,
            session_expiry_interval: 0,
            receive_maximum: crate::constants::defaults::RECEIVE_MAXIMUM,
            maximum_packet_size: u32::try_from(MAX_PACKET_SIZE_NO_LIMIT).unwrap_or(u32::MAX),
            topic_alias_maximum: 0,
            request_response_information: false,
            request_problem_information: true,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<Bytes>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }

    /// Sets the session expiry interval (v5.0)
    #[must_use]
    pub fn with_session_expiry_interval(mut self, seconds: u32) -> Self {
        self.session_expiry_interval = seconds;
        self.properties.replace(
            PropertyId::SessionExpiryInterval,
            PropertyValue::FourByteInteger(seconds),
        );
        self
    }

    /// Sets the receive maximum (v5.0)
    #[must_use]
    pub fn with_receive_maximum(mut self, receive_maximum: u16) -> Self {
        self.receive_maximum = receive_maximum;
        self.properties.replace(
            PropertyId::ReceiveMaximum,
            PropertyValue::TwoByteInteger(receive_maximum),
        );
        self
    }

    /// Adds any other CONNECT property (v5.0)
    #[must_use]
    pub fn with_property(mut self, id: PropertyId, value: PropertyValue) -> Self {
        let _ = self.properties.add(id, value);
        self
    }

    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        self.properties.get_string(PropertyId::AuthenticationMethod)
    }

    fn connect_flags(&self) -> ConnectFlags {
        ConnectFlags {
            username: u8::from(self.username.is_some()),
            password: u8::from(self.password.is_some()),
            will_retain: u8::from(self.will.as_ref().is_some_and(|w| w.retain)),
            will_qos: self.will.as_ref().map_or(0, |w| w.qos as u8),
            will: u8::from(self.will.is_some()),
            clean_start: u8::from(self.clean_start),
            reserved: 0,
        }
    }

    fn decode_will<B: Buf>(
        buf: &mut B,
        flags: &ConnectFlags,
        ctx: &DecodeContext<'_>,
    ) -> Result<WillMessage> {
        let config = ctx.config;

        let mut properties = if ctx.is_v5() {
            Properties::decode(buf, PropertyScope::Will, config)?
        } else {
            Properties::default()
        };

        if let Some(indicator) = properties.get_byte(PropertyId::PayloadFormatIndicator) {
            if indicator > 1 {
                return Err(MqttError::MalformedPacket(
                    "Sent a CONNECT with an invalid will payload format indicator".to_string(),
                ));
            }
        }

        if let Some(response_topic) = properties.get_string(PropertyId::ResponseTopic) {
            if contains_wildcard(response_topic) {
                return Err(MqttError::TopicNameInvalid(
                    "Sent a CONNECT with a will response topic containing wildcards".to_string(),
                ));
            }
        }

        if let Some(expiry) = properties.get_u32(PropertyId::MessageExpiryInterval) {
            if expiry > config.max_message_expiry_interval {
                properties.replace(
                    PropertyId::MessageExpiryInterval,
                    PropertyValue::FourByteInteger(config.max_message_expiry_interval),
                );
            }
        }

        let topic = decode_string_with(buf, config.validate_utf8).map_err(|_| {
            MqttError::MalformedPacket("Sent CONNECT with malformed will topic".to_string())
        })?;
        if topic.is_empty() {
            return Err(MqttError::TopicNameInvalid(
                "Sent a CONNECT with empty will topic".to_string(),
            ));
        }
        validate_topic_name(&topic, config)?;

        let payload = decode_binary(buf).map_err(|_| {
            MqttError::MalformedPacket("Sent a CONNECT with malformed will payload".to_string())
        })?;

        let will = WillMessage {
            topic,
            payload,
            qos: QoS::try_from(flags.will_qos)?,
            retain: flags.is_will_retain(),
            properties,
        };

        if config.validate_utf8 && will.is_utf8_payload() && !is_valid_utf8_payload(&will.payload)
        {
            return Err(MqttError::PayloadFormatInvalid);
        }

        Ok(will)
    }

    /// Reads the v5 CONNECT properties into the resolved fields
    fn apply_properties(&mut self, ctx: &DecodeContext<'_>) -> Result<()> {
        let props = &self.properties;

        if let Some(expiry) = props.get_u32(PropertyId::SessionExpiryInterval) {
            self.session_expiry_interval = expiry.min(ctx.config.max_session_expiry_interval);
        }

        if let Some(receive_maximum) = props.get_u16(PropertyId::ReceiveMaximum) {
            if receive_maximum == 0 {
                return Err(MqttError::ProtocolError(
                    "Sent a CONNECT with receive maximum = '0'".to_string(),
                ));
            }
            self.receive_maximum = receive_maximum;
        }

        if let Some(max_packet_size) = props.get_u32(PropertyId::MaximumPacketSize) {
            if max_packet_size == 0 {
                return Err(MqttError::ProtocolError(
                    "Sent a CONNECT with maximum packet size = '0'".to_string(),
                ));
            }
            self.maximum_packet_size = max_packet_size;
        }

        if let Some(alias_max) = props.get_u16(PropertyId::TopicAliasMaximum) {
            self.topic_alias_maximum = alias_max;
        }

        for (id, target, name) in [
            (
                PropertyId::RequestResponseInformation,
                &mut self.request_response_information,
                "request response information",
            ),
            (
                PropertyId::RequestProblemInformation,
                &mut self.request_problem_information,
                "request problem information",
            ),
        ] {
            match props.get_byte(id) {
                None => {}
                Some(0) => *target = false,
                Some(1) => *target = true,
                Some(_) => {
                    return Err(MqttError::MalformedPacket(format!(
                        "Sent a CONNECT with a malformed boolean for {name}"
                    )))
                }
            }
        }

        if props.contains(PropertyId::AuthenticationData)
            && !props.contains(PropertyId::AuthenticationMethod)
        {
            return Err(MqttError::ProtocolError(
                "Sent a CONNECT with auth data but without auth method".to_string(),
            ));
        }

        Ok(())
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        encode_string(buf, version.protocol_name())?;
        buf.put_u8(version.level());
        buf.put_slice(&self.connect_flags().to_be_bytes());
        buf.put_u16(self.keep_alive);

        if version.is_v5() {
            self.properties.encode(buf)?;
        }

        encode_string(buf, &self.client_id)?;

        if let Some(will) = &self.will {
            if version.is_v5() {
                will.properties.encode(buf)?;
            }
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }

        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }

        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        let version = ctx.version;
        let validate_utf8 = ctx.config.validate_utf8;

        let header_len = match version {
            ProtocolVersion::V3_1 => HEADER_LEN_V3_1,
            ProtocolVersion::V3_1_1 | ProtocolVersion::V5 => HEADER_LEN_V3_1_1,
        };
        if buf.remaining() < header_len {
            return Err(MqttError::MalformedPacket(
                "Sent a CONNECT with an incorrect connect header".to_string(),
            ));
        }

        let protocol_name = decode_string_with(buf, true)?;
        if protocol_name != version.protocol_name() {
            return Err(MqttError::InvalidProtocolName(protocol_name));
        }
        // level already checked while selecting this decoder
        buf.advance(1);

        let flags = ConnectFlags::parse(buf.get_u8())?;
        if flags.reserved_set() {
            return Err(MqttError::MalformedPacket(
                "Sent a CONNECT with invalid CONNECT flags".to_string(),
            ));
        }

        let will_valid = (flags.has_will() && flags.will_qos < 3)
            || (!flags.is_will_retain() && flags.will_qos == 0);
        if !will_valid {
            return Err(MqttError::MalformedPacket(
                "Sent a CONNECT with an invalid will-topic/flag combination".to_string(),
            ));
        }

        if !version.is_v5() && flags.has_password() && !flags.has_username() {
            return Err(MqttError::ProtocolError(
                "Sent a CONNECT with password flag set but username flag unset".to_string(),
            ));
        }

        let keep_alive = buf.get_u16();

        let mut packet = ConnectPacket::new(version, String::new())
            .with_clean_start(flags.is_clean_start())
            .with_keep_alive(keep_alive);

        if version.is_v5() {
            packet.properties =
                Properties::decode(buf, PropertyScope::Packet(PacketType::Connect), ctx.config)?;
            packet.apply_properties(ctx)?;
        } else {
            packet.session_expiry_interval = if packet.clean_start {
                0
            } else {
                ctx.config.max_session_expiry_interval
            };
        }

        packet.client_id = decode_string_with(buf, validate_utf8).map_err(|_| {
            MqttError::MalformedPacket("Sent CONNECT with malformed client id".to_string())
        })?;

        if packet.client_id.is_empty() {
            match version {
                ProtocolVersion::V3_1 => return Err(MqttError::ClientIdentifierNotValid),
                ProtocolVersion::V3_1_1 if !packet.clean_start => {
                    return Err(MqttError::ClientIdentifierNotValid)
                }
                _ => {}
            }
        }

        if flags.has_will() {
            packet.will = Some(Self::decode_will(buf, &flags, ctx)?);
        }

        if flags.has_username() {
            packet.username = Some(decode_string_with(buf, validate_utf8).map_err(|_| {
                MqttError::MalformedPacket(
                    "Sent a CONNECT with a malformed UTF-8 string for username".to_string(),
                )
            })?);
        }

        if flags.has_password() {
            packet.password = Some(decode_binary(buf).map_err(|_| {
                MqttError::MalformedPacket("Sent a CONNECT with malformed password".to_string())
            })?);
        }

        Ok(packet)
    }
}
