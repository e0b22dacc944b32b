//! Topic and payload validation shared by the PUBLISH, SUBSCRIBE,
//! UNSUBSCRIBE and CONNECT (will) decoders.

use crate::config::EngineConfig;
use crate::constants::subscription::SHARED_PREFIX;
use crate::error::{MqttError, Result};

/// Returns true if the string contains `+` or `#`
#[must_use]
pub fn contains_wildcard(topic: &str) -> bool {
    topic.contains('+') || topic.contains('#')
}

/// Validates an MQTT topic name according to MQTT v5.0 specification
///
/// # Rules:
/// - Must have at least one character
/// - Must not contain null characters (U+0000)
/// - Must not exceed maximum string length when UTF-8 encoded
/// - Must not contain wildcard characters (+, #), those belong to filters
#[must_use]
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= crate::constants::limits::MAX_STRING_LENGTH
        && !topic.contains('\0')
        && !contains_wildcard(topic)
}

/// Validates an MQTT topic filter according to MQTT v5.0 specification
///
/// # Rules:
/// - Must follow all topic name rules except wildcard usage
/// - Single-level wildcard (+) must occupy entire level
/// - Multi-level wildcard (#) must be last character and occupy entire level
/// - Examples: sport/+/player, sport/tennis/#, +/tennis/#
#[must_use]
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty()
        || filter.len() > crate::constants::limits::MAX_STRING_LENGTH
        || filter.contains('\0')
    {
        return false;
    }

    let parts: Vec<&str> = filter.split('/').collect();

    for (i, part) in parts.iter().enumerate() {
        if part.contains('#') && (i != parts.len() - 1 || *part != "#") {
            return false;
        }

        if part.contains('+') && *part != "+" {
            return false;
        }
    }

    true
}

/// Checks a non-empty PUBLISH or will topic against syntax and the
/// configured length bound
///
/// # Errors
///
/// Returns `MqttError::TopicNameInvalid` if the topic:
/// - Exceeds `max_topic_length`
/// - Contains null characters
/// - Contains wildcard characters (+, #)
pub fn validate_topic_name(topic: &str, config: &EngineConfig) -> Result<()> {
    if topic.len() > config.max_topic_length {
        return Err(MqttError::TopicNameInvalid(format!(
            "topic length {} exceeds maximum {}",
            topic.len(),
            config.max_topic_length
        )));
    }
    if !is_valid_topic_name(topic) {
        return Err(MqttError::TopicNameInvalid(topic.to_string()));
    }
    Ok(())
}

/// Checks a subscription filter against syntax and the configured length
///
/// # Errors
///
/// Returns `MqttError::TopicFilterInvalid` if the filter is empty, too long,
/// contains NUL or misplaces a wildcard
pub fn validate_topic_filter(filter: &str, config: &EngineConfig) -> Result<()> {
    if filter.len() > config.max_topic_length || !is_valid_topic_filter(filter) {
        return Err(MqttError::TopicFilterInvalid(filter.to_string()));
    }
    Ok(())
}

/// A `$share/{group}/{filter}` subscription split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedSubscription<'a> {
    pub group: &'a str,
    pub filter: &'a str,
}

impl<'a> SharedSubscription<'a> {
    /// Splits a shared subscription, returning `None` for ordinary filters
    ///
    /// # Errors
    ///
    /// Returns `TopicFilterInvalid` if the share name is empty or contains a
    /// wildcard, or if no filter follows it
    pub fn parse(filter: &'a str) -> Result<Option<Self>> {
        let Some(rest) = filter.strip_prefix(SHARED_PREFIX) else {
            return Ok(None);
        };

        let (group, inner) = rest
            .split_once('/')
            .ok_or_else(|| MqttError::TopicFilterInvalid(filter.to_string()))?;

        if group.is_empty() || contains_wildcard(group) || inner.is_empty() {
            return Err(MqttError::TopicFilterInvalid(filter.to_string()));
        }

        Ok(Some(Self {
            group,
            filter: inner,
        }))
    }
}

/// Payload check for PUBLISH and will messages flagged as UTF-8
#[must_use]
pub fn is_valid_utf8_payload(payload: &[u8]) -> bool {
    std::str::from_utf8(payload).is_ok()
}
