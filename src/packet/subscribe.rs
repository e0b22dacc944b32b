use crate::encoding::{decode_string_with, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{decode_packet_id, DecodeContext, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyScope, PropertyValue};
use crate::protocol::ProtocolVersion;
use crate::validation::{contains_wildcard, validate_topic_filter, SharedSubscription};
use crate::QoS;
use bebytes::BeBytes;
use bytes::{Buf, BufMut};

/// Retain handling options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RetainHandling {
    /// Send retained messages at subscribe time
    #[default]
    SendAtSubscribe = 0,
    /// Send retained messages at subscribe time only if subscription doesn't exist
    SendAtSubscribeIfNew = 1,
    /// Don't send retained messages at subscribe time
    DoNotSend = 2,
}

/// Subscription options (v5.0). A 3.x subscription only carries `qos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Maximum `QoS` level the client will accept
    pub qos: QoS,
    /// Messages published by this connection are not forwarded back to it
    pub no_local: bool,
    /// Keep the RETAIN flag as published
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self::new(QoS::AtMostOnce)
    }
}

impl SubscriptionOptions {
    #[must_use]
    pub fn new(qos: QoS) -> Self {
        Self {
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::SendAtSubscribe,
        }
    }

    #[must_use]
    pub fn with_no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    #[must_use]
    pub fn with_retain_as_published(mut self, retain_as_published: bool) -> Self {
        self.retain_as_published = retain_as_published;
        self
    }

    #[must_use]
    pub fn with_retain_handling(mut self, retain_handling: RetainHandling) -> Self {
        self.retain_handling = retain_handling;
        self
    }

    /// Options byte for `version`
    #[must_use]
    pub fn encode(&self, version: ProtocolVersion) -> u8 {
        if version.is_v5() {
            SubscriptionOptionsBits::from_options(self).to_be_bytes()[0]
        } else {
            self.qos as u8
        }
    }
}

/// Subscription options byte, bit fields ordered from MSB to LSB
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
pub struct SubscriptionOptionsBits {
    /// Reserved bits (bits 7-6) - must be 0
    #[bits(2)]
    pub reserved_bits: u8,
    /// Retain Handling (bits 5-4)
    #[bits(2)]
    pub retain_handling: u8,
    /// Retain As Published flag (bit 3)
    #[bits(1)]
    pub retain_as_published: u8,
    /// No Local flag (bit 2)
    #[bits(1)]
    pub no_local: u8,
    /// QoS level (bits 1-0)
    #[bits(2)]
    pub qos: u8,
}

impl SubscriptionOptionsBits {
    #[must_use]
    pub fn from_options(options: &SubscriptionOptions) -> Self {
        Self {
            reserved_bits: 0,
            retain_handling: options.retain_handling as u8,
            retain_as_published: u8::from(options.retain_as_published),
            no_local: u8::from(options.no_local),
            qos: options.qos as u8,
        }
    }

    /// Splits a raw options byte
    ///
    /// # Errors
    ///
    /// Only fails if the derived parser rejects a single byte
    pub fn parse(byte: u8) -> Result<Self> {
        let (bits, _) = Self::try_from_be_bytes(&[byte]).map_err(|e| {
            MqttError::MalformedPacket(format!("Invalid subscription options: {e:?}"))
        })?;
        Ok(bits)
    }

    /// Converts the bit fields into validated options
    ///
    /// # Errors
    ///
    /// - `MalformedPacket` if a reserved bit is set
    /// - `ProtocolError` for `QoS` 3 or retain handling 3
    pub fn to_options(&self) -> Result<SubscriptionOptions> {
        if self.reserved_bits != 0 {
            return Err(MqttError::MalformedPacket(
                "Sent a SUBSCRIBE with reserved subscription option bits set".to_string(),
            ));
        }

        let qos = QoS::try_from(self.qos).map_err(|_| {
            MqttError::ProtocolError("Sent a SUBSCRIBE with QoS 3".to_string())
        })?;

        let retain_handling = match self.retain_handling {
            0 => RetainHandling::SendAtSubscribe,
            1 => RetainHandling::SendAtSubscribeIfNew,
            2 => RetainHandling::DoNotSend,
            _ => {
                return Err(MqttError::ProtocolError(
                    "Sent a SUBSCRIBE with retain handling = '3'".to_string(),
                ))
            }
        };

        Ok(SubscriptionOptions {
            qos,
            no_local: self.no_local != 0,
            retain_as_published: self.retain_as_published != 0,
            retain_handling,
        })
    }
}

/// One topic filter with its options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_filter: String,
    pub options: SubscriptionOptions,
}

impl Subscription {
    #[must_use]
    pub fn new(topic_filter: impl Into<String>, options: SubscriptionOptions) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            options,
        }
    }

    /// Share group name if this is a `$share/{group}/{filter}` subscription
    #[must_use]
    pub fn share_group(&self) -> Option<&str> {
        SharedSubscription::parse(&self.topic_filter)
            .ok()
            .flatten()
            .map(|shared| shared.group)
    }

    fn validate(&self, ctx: &DecodeContext<'_>) -> Result<()> {
        let config = ctx.config;
        let shared = SharedSubscription::parse(&self.topic_filter)?;
        let filter = shared.map_or(self.topic_filter.as_str(), |s| s.filter);

        validate_topic_filter(filter, config)?;

        if shared.is_some() {
            if !config.shared_subscriptions_enabled {
                return Err(MqttError::SharedSubscriptionsNotSupported);
            }
            if self.options.no_local {
                return Err(MqttError::ProtocolError(
                    "Sent a SUBSCRIBE with a shared subscription and no local set to 1"
                        .to_string(),
                ));
            }
        }

        if !config.wildcard_subscriptions_enabled && contains_wildcard(filter) {
            return Err(MqttError::WildcardSubscriptionsNotSupported);
        }

        Ok(())
    }
}

/// MQTT SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
    /// SUBSCRIBE properties (v5.0 only)
    pub properties: Properties,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            subscriptions: Vec::new(),
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn add_subscription(
        mut self,
        topic_filter: impl Into<String>,
        options: SubscriptionOptions,
    ) -> Self {
        self.subscriptions
            .push(Subscription::new(topic_filter, options));
        self
    }

    #[must_use]
    pub fn with_subscription_identifier(mut self, id: u32) -> Self {
        self.properties.replace(
            PropertyId::SubscriptionIdentifier,
            PropertyValue::VariableByteInteger(id),
        );
        self
    }

    #[must_use]
    pub fn subscription_identifier(&self) -> Option<u32> {
        self.properties.get_u32(PropertyId::SubscriptionIdentifier)
    }

    fn decode_properties<B: Buf>(buf: &mut B, ctx: &DecodeContext<'_>) -> Result<Properties> {
        let properties =
            Properties::decode(buf, PropertyScope::Packet(PacketType::Subscribe), ctx.config)?;

        if let Some(id) = properties.get_u32(PropertyId::SubscriptionIdentifier) {
            if !ctx.config.subscription_identifiers_enabled {
                return Err(MqttError::SubscriptionIdentifiersNotSupported);
            }
            if id == 0 {
                return Err(MqttError::ProtocolError(
                    "Sent a SUBSCRIBE with subscription identifier = '0'".to_string(),
                ));
            }
        }

        Ok(properties)
    }

    fn decode_options(byte: u8, version: ProtocolVersion) -> Result<SubscriptionOptions> {
        if version.is_v5() {
            return SubscriptionOptionsBits::parse(byte)?.to_options();
        }

        // 3.x: upper six bits reserved, QoS in the low two
        let qos = match byte {
            0..=2 => QoS::try_from(byte)?,
            _ => {
                return Err(MqttError::MalformedPacket(format!(
                    "Sent a SUBSCRIBE with invalid QoS byte '{byte:#04x}'"
                )))
            }
        };
        Ok(SubscriptionOptions::new(qos))
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        crate::constants::masks::REQUIRED_FLAGS_0010
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        buf.put_u16(self.packet_id);

        if version.is_v5() {
            self.properties.encode(buf)?;
        }

        for subscription in &self.subscriptions {
            encode_string(buf, &subscription.topic_filter)?;
            buf.put_u8(subscription.options.encode(version));
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, ctx: &mut DecodeContext<'_>) -> Result<Self> {
        ctx.fixed_header.check_flags()?;

        let packet_id = decode_packet_id(buf, PacketType::Subscribe)?;
        if packet_id == 0 {
            return Err(MqttError::ProtocolError(
                "Sent a SUBSCRIBE with packet identifier = '0'".to_string(),
            ));
        }

        let properties = if ctx.is_v5() {
            Self::decode_properties(buf, ctx)?
        } else {
            Properties::default()
        };

        let mut subscriptions = Vec::new();
        while buf.has_remaining() {
            let topic_filter = decode_string_with(buf, ctx.config.validate_utf8).map_err(|_| {
                MqttError::MalformedPacket(
                    "Sent a SUBSCRIBE with a malformed topic filter".to_string(),
                )
            })?;

            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Sent a SUBSCRIBE without subscription options".to_string(),
                ));
            }
            let options = Self::decode_options(buf.get_u8(), ctx.version)?;

            let subscription = Subscription {
                topic_filter,
                options,
            };
            subscription.validate(ctx)?;
            subscriptions.push(subscription);
        }

        if subscriptions.is_empty() {
            return Err(MqttError::ProtocolError(
                "Sent a SUBSCRIBE without topic filters".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            subscriptions,
            properties,
        })
    }
}
