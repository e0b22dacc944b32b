//! Engine configuration
//!
//! Limits and toggles consulted by the frame decoder and the QoS engine.
//! Per-connection values negotiated at CONNECT time live on
//! [`crate::connection::ConnectionState`]; this struct holds the server side.

use crate::constants::limits::MAX_PACKET_SIZE_NO_LIMIT;
use crate::error::{MqttError, Result};
use serde::{Deserialize, Serialize};

/// Protocol engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct EngineConfig {
    /// Largest total packet size (header + length field + body) accepted
    pub max_packet_size: usize,

    /// Longest topic name or filter accepted, in bytes
    pub max_topic_length: usize,

    /// Reject malformed UTF-8 in strings and UTF-8 flagged payloads
    pub validate_utf8: bool,

    /// Whether PUBLISH with RETAIN=1 is accepted
    pub retained_messages_enabled: bool,

    /// Maximum `QoS` supported
    pub maximum_qos: u8,

    /// Wildcard subscription available
    pub wildcard_subscriptions_enabled: bool,

    /// Shared subscription available
    pub shared_subscriptions_enabled: bool,

    /// Subscription identifiers available
    pub subscription_identifiers_enabled: bool,

    /// Topic aliases a client may register per connection
    pub topic_alias_maximum: u16,

    /// Upper bound applied to client supplied message expiry intervals
    pub max_message_expiry_interval: u32,

    /// Upper bound applied to client supplied session expiry intervals
    pub max_session_expiry_interval: u32,

    /// Concurrent inbound QoS>0 publishes a client may leave unacknowledged
    pub server_receive_maximum: u16,

    /// Total size of all user property keys and values in one packet
    pub user_properties_max_size: usize,

    /// Send a DISCONNECT with reason code to v5 clients before closing
    pub disconnect_with_reason_code: bool,

    /// Include a reason string in that DISCONNECT
    pub disconnect_with_reason_string: bool,

    /// Reject server-to-client packet types sent by a client
    pub strict: bool,

    /// Pending writes after which QoS 0 publishes are dropped while unwritable
    pub not_writable_queue_size: usize,

    /// Drop QoS 0 publishes instead of buffering them while unwritable
    pub drop_qos0_when_not_writable: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE_NO_LIMIT,
            max_topic_length: 65_535,
            validate_utf8: true,
            retained_messages_enabled: true,
            maximum_qos: 2,
            wildcard_subscriptions_enabled: true,
            shared_subscriptions_enabled: true,
            subscription_identifiers_enabled: true,
            topic_alias_maximum: 5,
            max_message_expiry_interval: u32::MAX,
            max_session_expiry_interval: u32::MAX,
            server_receive_maximum: 10,
            user_properties_max_size: 5 * 1024 * 1024,
            disconnect_with_reason_code: true,
            disconnect_with_reason_string: true,
            strict: true,
            not_writable_queue_size: 1000,
            drop_qos0_when_not_writable: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `MqttError::Configuration` if the document does not parse or
    /// the resulting values are inconsistent
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the maximum packet size
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets the maximum topic length
    #[must_use]
    pub fn with_max_topic_length(mut self, length: usize) -> Self {
        self.max_topic_length = length;
        self
    }

    /// Enables or disables UTF-8 validation
    #[must_use]
    pub fn with_validate_utf8(mut self, enabled: bool) -> Self {
        self.validate_utf8 = enabled;
        self
    }

    /// Enables or disables retained messages
    #[must_use]
    pub fn with_retained_messages(mut self, enabled: bool) -> Self {
        self.retained_messages_enabled = enabled;
        self
    }

    /// Sets the maximum `QoS`
    #[must_use]
    pub fn with_maximum_qos(mut self, qos: u8) -> Self {
        self.maximum_qos = qos;
        self
    }

    /// Enables or disables wildcard subscriptions
    #[must_use]
    pub fn with_wildcard_subscriptions(mut self, enabled: bool) -> Self {
        self.wildcard_subscriptions_enabled = enabled;
        self
    }

    /// Enables or disables shared subscriptions
    #[must_use]
    pub fn with_shared_subscriptions(mut self, enabled: bool) -> Self {
        self.shared_subscriptions_enabled = enabled;
        self
    }

    /// Enables or disables subscription identifiers
    #[must_use]
    pub fn with_subscription_identifiers(mut self, enabled: bool) -> Self {
        self.subscription_identifiers_enabled = enabled;
        self
    }

    /// Sets the topic alias maximum
    #[must_use]
    pub fn with_topic_alias_maximum(mut self, max: u16) -> Self {
        self.topic_alias_maximum = max;
        self
    }

    /// Sets the message expiry cap
    #[must_use]
    pub fn with_max_message_expiry_interval(mut self, seconds: u32) -> Self {
        self.max_message_expiry_interval = seconds;
        self
    }

    /// Sets the session expiry cap
    #[must_use]
    pub fn with_max_session_expiry_interval(mut self, seconds: u32) -> Self {
        self.max_session_expiry_interval = seconds;
        self
    }

    /// Sets the server receive maximum
    #[must_use]
    pub fn with_server_receive_maximum(mut self, max: u16) -> Self {
        self.server_receive_maximum = max;
        self
    }

    /// Sets the user properties size limit
    #[must_use]
    pub fn with_user_properties_max_size(mut self, size: usize) -> Self {
        self.user_properties_max_size = size;
        self
    }

    /// Controls whether v5 clients receive a DISCONNECT before the close
    #[must_use]
    pub fn with_disconnect_reason_code(mut self, enabled: bool) -> Self {
        self.disconnect_with_reason_code = enabled;
        self
    }

    /// Controls whether the DISCONNECT carries a reason string
    #[must_use]
    pub fn with_disconnect_reason_string(mut self, enabled: bool) -> Self {
        self.disconnect_with_reason_string = enabled;
        self
    }

    /// Enables or disables strict packet type checking
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the QoS 0 backpressure threshold
    #[must_use]
    pub fn with_not_writable_queue_size(mut self, size: usize) -> Self {
        self.not_writable_queue_size = size;
        self
    }

    /// Controls whether QoS 0 publishes are dropped while unwritable
    #[must_use]
    pub fn with_drop_qos0_when_not_writable(mut self, enabled: bool) -> Self {
        self.drop_qos0_when_not_writable = enabled;
        self
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<&Self> {
        if self.max_packet_size < 2 || self.max_packet_size > MAX_PACKET_SIZE_NO_LIMIT {
            return Err(MqttError::Configuration(format!(
                "max_packet_size must be between 2 and {MAX_PACKET_SIZE_NO_LIMIT}"
            )));
        }

        if self.max_topic_length == 0 || self.max_topic_length > 65_535 {
            return Err(MqttError::Configuration(
                "max_topic_length must be between 1 and 65535".to_string(),
            ));
        }

        if self.maximum_qos > 2 {
            return Err(MqttError::Configuration(
                "maximum_qos must be 0, 1, or 2".to_string(),
            ));
        }

        if self.server_receive_maximum == 0 {
            return Err(MqttError::Configuration(
                "server_receive_maximum must be greater than 0".to_string(),
            ));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_packet_size, 268_435_460);
        assert_eq!(config.topic_alias_maximum, 5);
        assert_eq!(config.server_receive_maximum, 10);
        assert_eq!(config.user_properties_max_size, 5 * 1024 * 1024);
        assert!(config.strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_max_packet_size(1024)
            .with_retained_messages(false)
            .with_maximum_qos(1)
            .with_strict(false);
        assert_eq!(config.max_packet_size, 1024);
        assert!(!config.retained_messages_enabled);
        assert_eq!(config.maximum_qos, 1);
        assert!(!config.strict);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::new().with_maximum_qos(3).validate().is_err());
        assert!(EngineConfig::new()
            .with_server_receive_maximum(0)
            .validate()
            .is_err());
        assert!(EngineConfig::new().with_max_packet_size(1).validate().is_err());
        assert!(EngineConfig::new()
            .with_max_topic_length(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str(
            r"
            max_packet_size = 4096
            validate_utf8 = false
            server_receive_maximum = 20
            ",
        )
        .unwrap();
        assert_eq!(config.max_packet_size, 4096);
        assert!(!config.validate_utf8);
        assert_eq!(config.server_receive_maximum, 20);
        assert_eq!(config.topic_alias_maximum, 5);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(
            EngineConfig::from_toml_str("maximum_qos = 7"),
            Err(MqttError::Configuration(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_packet_size = \"big\""),
            Err(MqttError::Configuration(_))
        ));
    }

    #[test]
    fn test_serde_json_round_trip() {
        let config = EngineConfig::default().with_topic_alias_maximum(9);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
