use crate::config::EngineConfig;
use crate::encoding::{
    decode_binary, decode_string_pair, decode_string_with, decode_variable_int, encode_binary,
    encode_string, encode_variable_int,
};
use crate::error::{MqttError, Result};
use crate::packet::PacketType;
use bytes::{Buf, BufMut, Bytes};
use std::collections::HashMap;
use std::fmt;

/// MQTT v5.0 Property Identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    // Byte properties
    PayloadFormatIndicator = 0x01,
    RequestProblemInformation = 0x17,
    RequestResponseInformation = 0x19,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2A,

    // Two Byte Integer properties
    ServerKeepAlive = 0x13,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,

    // Four Byte Integer properties
    MessageExpiryInterval = 0x02,
    SessionExpiryInterval = 0x11,
    WillDelayInterval = 0x18,
    MaximumPacketSize = 0x27,

    // Variable Byte Integer properties
    SubscriptionIdentifier = 0x0B,

    // UTF-8 Encoded String properties
    ContentType = 0x03,
    ResponseTopic = 0x08,
    AssignedClientIdentifier = 0x12,
    AuthenticationMethod = 0x15,
    ResponseInformation = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,

    // Binary Data properties
    CorrelationData = 0x09,
    AuthenticationData = 0x16,

    // UTF-8 String Pair properties
    UserProperty = 0x26,
}

impl PropertyId {
    /// Converts a u8 to `PropertyId`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PayloadFormatIndicator),
            0x02 => Some(Self::MessageExpiryInterval),
            0x03 => Some(Self::ContentType),
            0x08 => Some(Self::ResponseTopic),
            0x09 => Some(Self::CorrelationData),
            0x0B => Some(Self::SubscriptionIdentifier),
            0x11 => Some(Self::SessionExpiryInterval),
            0x12 => Some(Self::AssignedClientIdentifier),
            0x13 => Some(Self::ServerKeepAlive),
            0x15 => Some(Self::AuthenticationMethod),
            0x16 => Some(Self::AuthenticationData),
            0x17 => Some(Self::RequestProblemInformation),
            0x18 => Some(Self::WillDelayInterval),
            0x19 => Some(Self::RequestResponseInformation),
            0x1A => Some(Self::ResponseInformation),
            0x1C => Some(Self::ServerReference),
            0x1F => Some(Self::ReasonString),
            0x21 => Some(Self::ReceiveMaximum),
            0x22 => Some(Self::TopicAliasMaximum),
            0x23 => Some(Self::TopicAlias),
            0x24 => Some(Self::MaximumQoS),
            0x25 => Some(Self::RetainAvailable),
            0x26 => Some(Self::UserProperty),
            0x27 => Some(Self::MaximumPacketSize),
            0x28 => Some(Self::WildcardSubscriptionAvailable),
            0x29 => Some(Self::SubscriptionIdentifierAvailable),
            0x2A => Some(Self::SharedSubscriptionAvailable),
            _ => None,
        }
    }

    /// Only user properties may repeat in a client-sent packet
    #[must_use]
    pub fn allows_multiple(&self) -> bool {
        matches!(self, Self::UserProperty)
    }

    /// Human readable name used in reason strings
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PayloadFormatIndicator => "payload format indicator",
            Self::MessageExpiryInterval => "message expiry interval",
            Self::ContentType => "content type",
            Self::ResponseTopic => "response topic",
            Self::CorrelationData => "correlation data",
            Self::SubscriptionIdentifier => "subscription identifier",
            Self::SessionExpiryInterval => "session expiry interval",
            Self::AssignedClientIdentifier => "assigned client identifier",
            Self::ServerKeepAlive => "server keep alive",
            Self::AuthenticationMethod => "auth method",
            Self::AuthenticationData => "auth data",
            Self::RequestProblemInformation => "request problem information",
            Self::WillDelayInterval => "will delay interval",
            Self::RequestResponseInformation => "request response information",
            Self::ResponseInformation => "response information",
            Self::ServerReference => "server reference",
            Self::ReasonString => "reason string",
            Self::ReceiveMaximum => "receive maximum",
            Self::TopicAliasMaximum => "topic alias maximum",
            Self::TopicAlias => "topic alias",
            Self::MaximumQoS => "maximum qos",
            Self::RetainAvailable => "retain available",
            Self::UserProperty => "user property",
            Self::MaximumPacketSize => "maximum packet size",
            Self::WildcardSubscriptionAvailable => "wildcard subscription available",
            Self::SubscriptionIdentifierAvailable => "subscription identifier available",
            Self::SharedSubscriptionAvailable => "shared subscription available",
        }
    }

    /// Gets the expected value type for this property
    #[must_use]
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            Self::PayloadFormatIndicator
            | Self::RequestProblemInformation
            | Self::RequestResponseInformation
            | Self::MaximumQoS
            | Self::RetainAvailable
            | Self::WildcardSubscriptionAvailable
            | Self::SubscriptionIdentifierAvailable
            | Self::SharedSubscriptionAvailable => PropertyValueType::Byte,

            Self::ServerKeepAlive
            | Self::ReceiveMaximum
            | Self::TopicAliasMaximum
            | Self::TopicAlias => PropertyValueType::TwoByteInteger,

            Self::MessageExpiryInterval
            | Self::SessionExpiryInterval
            | Self::WillDelayInterval
            | Self::MaximumPacketSize => PropertyValueType::FourByteInteger,

            Self::SubscriptionIdentifier => PropertyValueType::VariableByteInteger,

            Self::ContentType
            | Self::ResponseTopic
            | Self::AssignedClientIdentifier
            | Self::AuthenticationMethod
            | Self::ResponseInformation
            | Self::ServerReference
            | Self::ReasonString => PropertyValueType::Utf8String,

            Self::CorrelationData | Self::AuthenticationData => PropertyValueType::BinaryData,

            Self::UserProperty => PropertyValueType::Utf8StringPair,
        }
    }

    /// Returns true if a client may put this property in the given block
    #[must_use]
    pub fn allowed_in(&self, scope: PropertyScope) -> bool {
        use PropertyId as P;
        match scope {
            PropertyScope::Will => matches!(
                self,
                P::WillDelayInterval
                    | P::PayloadFormatIndicator
                    | P::MessageExpiryInterval
                    | P::ContentType
                    | P::ResponseTopic
                    | P::CorrelationData
                    | P::UserProperty
            ),
            PropertyScope::Packet(PacketType::Connect) => matches!(
                self,
                P::SessionExpiryInterval
                    | P::ReceiveMaximum
                    | P::MaximumPacketSize
                    | P::TopicAliasMaximum
                    | P::RequestResponseInformation
                    | P::RequestProblemInformation
                    | P::UserProperty
                    | P::AuthenticationMethod
                    | P::AuthenticationData
            ),
            PropertyScope::Packet(PacketType::Publish) => matches!(
                self,
                P::PayloadFormatIndicator
                    | P::MessageExpiryInterval
                    | P::TopicAlias
                    | P::ResponseTopic
                    | P::CorrelationData
                    | P::UserProperty
                    | P::SubscriptionIdentifier
                    | P::ContentType
            ),
            PropertyScope::Packet(
                PacketType::PubAck | PacketType::PubRec | PacketType::PubRel | PacketType::PubComp,
            ) => matches!(self, P::ReasonString | P::UserProperty),
            PropertyScope::Packet(PacketType::Subscribe) => {
                matches!(self, P::SubscriptionIdentifier | P::UserProperty)
            }
            PropertyScope::Packet(PacketType::Unsubscribe) => matches!(self, P::UserProperty),
            PropertyScope::Packet(PacketType::Disconnect) => matches!(
                self,
                P::SessionExpiryInterval | P::ReasonString | P::UserProperty | P::ServerReference
            ),
            PropertyScope::Packet(PacketType::Auth) => matches!(
                self,
                P::AuthenticationMethod | P::AuthenticationData | P::ReasonString | P::UserProperty
            ),
            PropertyScope::Packet(_) => false,
        }
    }
}

/// Where a properties block sits: a packet's variable header or a CONNECT will
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyScope {
    Packet(PacketType),
    Will,
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packet(packet_type) => write!(f, "{packet_type}"),
            Self::Will => f.write_str("CONNECT with Will"),
        }
    }
}

/// Property value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValueType {
    Byte,
    TwoByteInteger,
    FourByteInteger,
    VariableByteInteger,
    BinaryData,
    Utf8String,
    Utf8StringPair,
}

/// Property value storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInteger(u16),
    FourByteInteger(u32),
    VariableByteInteger(u32),
    BinaryData(Bytes),
    Utf8String(String),
    Utf8StringPair(String, String),
}

impl PropertyValue {
    #[must_use]
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            Self::Byte(_) => PropertyValueType::Byte,
            Self::TwoByteInteger(_) => PropertyValueType::TwoByteInteger,
            Self::FourByteInteger(_) => PropertyValueType::FourByteInteger,
            Self::VariableByteInteger(_) => PropertyValueType::VariableByteInteger,
            Self::BinaryData(_) => PropertyValueType::BinaryData,
            Self::Utf8String(_) => PropertyValueType::Utf8String,
            Self::Utf8StringPair(_, _) => PropertyValueType::Utf8StringPair,
        }
    }

    fn read<B: Buf>(value_type: PropertyValueType, buf: &mut B, validate_utf8: bool) -> Result<Self> {
        let needed = match value_type {
            PropertyValueType::Byte => 1,
            PropertyValueType::TwoByteInteger => 2,
            PropertyValueType::FourByteInteger => 4,
            _ => 0,
        };
        if buf.remaining() < needed {
            return Err(MqttError::MalformedPacket(format!(
                "Insufficient data for {value_type:?} property"
            )));
        }

        Ok(match value_type {
            PropertyValueType::Byte => Self::Byte(buf.get_u8()),
            PropertyValueType::TwoByteInteger => Self::TwoByteInteger(buf.get_u16()),
            PropertyValueType::FourByteInteger => Self::FourByteInteger(buf.get_u32()),
            PropertyValueType::VariableByteInteger => {
                Self::VariableByteInteger(decode_variable_int(buf)?)
            }
            PropertyValueType::BinaryData => Self::BinaryData(decode_binary(buf)?),
            PropertyValueType::Utf8String => {
                Self::Utf8String(decode_string_with(buf, validate_utf8)?)
            }
            PropertyValueType::Utf8StringPair => {
                let (key, value) = decode_string_pair(buf, validate_utf8)?;
                Self::Utf8StringPair(key, value)
            }
        })
    }
}

/// Container for MQTT v5.0 properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    properties: HashMap<PropertyId, Vec<PropertyValue>>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property value
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The value type doesn't match the property's expected type
    /// - The property doesn't allow multiple values and already exists
    pub fn add(&mut self, id: PropertyId, value: PropertyValue) -> Result<()> {
        if value.value_type() != id.value_type() {
            return Err(MqttError::ProtocolError(format!(
                "Property {:?} expects type {:?}, got {:?}",
                id,
                id.value_type(),
                value.value_type()
            )));
        }

        if !id.allows_multiple() && self.properties.contains_key(&id) {
            return Err(MqttError::DuplicatePropertyId(id as u8));
        }

        self.properties.entry(id).or_default().push(value);
        Ok(())
    }

    /// Gets a single property value
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&id).and_then(|v| v.first())
    }

    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.properties.contains_key(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    #[must_use]
    pub fn get_byte(&self, id: PropertyId) -> Option<u8> {
        match self.get(id) {
            Some(PropertyValue::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_u16(&self, id: PropertyId) -> Option<u16> {
        match self.get(id) {
            Some(PropertyValue::TwoByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    /// Four-byte and variable-byte integers
    #[must_use]
    pub fn get_u32(&self, id: PropertyId) -> Option<u32> {
        match self.get(id) {
            Some(PropertyValue::FourByteInteger(v) | PropertyValue::VariableByteInteger(v)) => {
                Some(*v)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, id: PropertyId) -> Option<&str> {
        match self.get(id) {
            Some(PropertyValue::Utf8String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_binary(&self, id: PropertyId) -> Option<&Bytes> {
        match self.get(id) {
            Some(PropertyValue::BinaryData(v)) => Some(v),
            _ => None,
        }
    }

    /// All user properties in arrival order
    pub fn user_properties(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.properties
            .get(&PropertyId::UserProperty)
            .into_iter()
            .flatten()
            .filter_map(|value| match value {
                PropertyValue::Utf8StringPair(k, v) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
    }

    /// Replaces a single-valued property, used to clamp values to server limits
    pub fn replace(&mut self, id: PropertyId, value: PropertyValue) {
        self.properties.insert(id, vec![value]);
    }

    /// Encodes all properties with their length prefix
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be encoded
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = Vec::new();

        let mut ids: Vec<_> = self.properties.keys().copied().collect();
        ids.sort_by_key(|id| *id as u8);

        for id in ids {
            for value in &self.properties[&id] {
                body.put_u8(id as u8);
                match value {
                    PropertyValue::Byte(v) => body.put_u8(*v),
                    PropertyValue::TwoByteInteger(v) => body.put_u16(*v),
                    PropertyValue::FourByteInteger(v) => body.put_u32(*v),
                    PropertyValue::VariableByteInteger(v) => encode_variable_int(&mut body, *v)?,
                    PropertyValue::BinaryData(v) => encode_binary(&mut body, v)?,
                    PropertyValue::Utf8String(v) => encode_string(&mut body, v)?,
                    PropertyValue::Utf8StringPair(k, v) => {
                        encode_string(&mut body, k)?;
                        encode_string(&mut body, v)?;
                    }
                }
            }
        }

        let len = u32::try_from(body.len()).map_err(|_| MqttError::PacketTooLarge {
            size: body.len(),
            max: crate::encoding::VARIABLE_INT_MAX as usize,
        })?;
        encode_variable_int(buf, len)?;
        buf.put_slice(&body);
        Ok(())
    }

    /// Decodes a properties block sent by a client.
    ///
    /// Reads the variable byte properties length, then identifier-prefixed
    /// values until exactly that many bytes are consumed.
    ///
    /// # Errors
    ///
    /// - `MalformedPacket` if the length field is broken or longer than the
    ///   remaining body, a value is truncated, or the identifier is unknown
    ///   or not allowed in `scope`
    /// - `ProtocolError` if a single-instance property appears twice
    /// - `UserPropertiesTooLarge` if user properties exceed the configured size
    pub fn decode<B: Buf>(buf: &mut B, scope: PropertyScope, config: &EngineConfig) -> Result<Self> {
        let props_len = decode_variable_int(buf).map_err(|_| {
            MqttError::MalformedPacket(format!("Sent a {scope} with a malformed properties length"))
        })? as usize;

        if buf.remaining() < props_len {
            return Err(MqttError::MalformedPacket(format!(
                "Sent a {scope} with remaining length too short for properties"
            )));
        }

        let mut props_buf = buf.copy_to_bytes(props_len);
        let mut properties = Self::new();
        let mut user_properties_size = 0usize;

        while props_buf.has_remaining() {
            let raw_id = props_buf.get_u8();
            let id = PropertyId::from_u8(raw_id)
                .filter(|id| id.allowed_in(scope))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Sent a {scope} with an invalid property identifier '{raw_id}'"
                    ))
                })?;

            let value = PropertyValue::read(id.value_type(), &mut props_buf, config.validate_utf8)?;

            if let PropertyValue::Utf8StringPair(key, value) = &value {
                user_properties_size += key.len() + value.len();
                if user_properties_size > config.user_properties_max_size {
                    return Err(MqttError::UserPropertiesTooLarge {
                        size: user_properties_size,
                        max: config.user_properties_max_size,
                    });
                }
            }

            properties.add(id, value).map_err(|err| match err {
                MqttError::DuplicatePropertyId(_) => MqttError::ProtocolError(format!(
                    "Sent a {scope} with '{}' included more than once",
                    id.name()
                )),
                other => other,
            })?;
        }

        Ok(properties)
    }
}
