//! Per-connection protocol state
//!
//! One [`ConnectionState`] exists per network connection. It is owned by the
//! connection's executor and mutated only from there, so it carries no
//! locking. The frame decoder fills it in when the CONNECT is accepted and
//! consults it for every later packet.

use crate::config::EngineConfig;
use crate::constants::defaults::{RECEIVE_MAXIMUM, SESSION_EXPIRY_ON_DISCONNECT};
use crate::constants::limits::MAX_PACKET_SIZE_NO_LIMIT;
use crate::error::{MqttError, Result};
use crate::packet::connect::ConnectPacket;
use crate::protocol::ProtocolVersion;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, used in log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Inbound topic alias mapping for one connection (alias 1..=maximum)
#[derive(Debug, Clone, Default)]
pub struct TopicAliases {
    slots: Vec<Option<String>>,
}

impl TopicAliases {
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            slots: vec![None; usize::from(maximum)],
        }
    }

    #[must_use]
    pub fn maximum(&self) -> usize {
        self.slots.len()
    }

    /// Binds `alias` to `topic`, replacing any previous binding
    ///
    /// # Errors
    ///
    /// Returns `TopicAliasInvalid` if the alias is 0 or above the maximum
    pub fn register(&mut self, alias: u16, topic: &str) -> Result<()> {
        let slot = self.slot_mut(alias)?;
        *slot = Some(topic.to_string());
        Ok(())
    }

    /// Looks up the topic bound to `alias`
    ///
    /// # Errors
    ///
    /// Returns `TopicAliasInvalid` if the alias is out of range or unmapped
    pub fn resolve(&self, alias: u16) -> Result<&str> {
        usize::from(alias)
            .checked_sub(1)
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_deref)
            .ok_or(MqttError::TopicAliasInvalid(alias))
    }

    fn slot_mut(&mut self, alias: u16) -> Result<&mut Option<String>> {
        usize::from(alias)
            .checked_sub(1)
            .and_then(|index| self.slots.get_mut(index))
            .ok_or(MqttError::TopicAliasInvalid(alias))
    }
}

/// Protocol state of a single connection
#[derive(Debug)]
pub struct ConnectionState {
    id: ConnectionId,
    protocol_version: Option<ProtocolVersion>,
    client_id: Option<String>,
    clean_start: bool,
    session_expiry_interval: u32,
    client_receive_maximum: u16,
    client_maximum_packet_size: u32,
    request_problem_information: bool,
    topic_aliases: TopicAliases,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Creates the state for a freshly opened connection
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            protocol_version: None,
            client_id: None,
            clean_start: true,
            session_expiry_interval: SESSION_EXPIRY_ON_DISCONNECT,
            client_receive_maximum: RECEIVE_MAXIMUM,
            client_maximum_packet_size: u32::try_from(MAX_PACKET_SIZE_NO_LIMIT).unwrap_or(u32::MAX),
            request_problem_information: true,
            topic_aliases: TopicAliases::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Version announced by the accepted CONNECT, `None` before it
    #[must_use]
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.protocol_version
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.protocol_version.is_some()
    }

    /// Client identifier for log fields, `UNKNOWN` before CONNECT
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or("UNKNOWN")
    }

    /// Replaces an empty client identifier with one assigned by the server
    pub fn assign_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
    }

    #[must_use]
    pub fn clean_start(&self) -> bool {
        self.clean_start
    }

    #[must_use]
    pub fn session_expiry_interval(&self) -> u32 {
        self.session_expiry_interval
    }

    /// Updates the session expiry, as a v5 DISCONNECT may do
    pub fn set_session_expiry_interval(&mut self, interval: u32) {
        self.session_expiry_interval = interval;
    }

    /// Outbound window capacity the client asked for
    #[must_use]
    pub fn client_receive_maximum(&self) -> u16 {
        self.client_receive_maximum
    }

    #[must_use]
    pub fn client_maximum_packet_size(&self) -> u32 {
        self.client_maximum_packet_size
    }

    #[must_use]
    pub fn request_problem_information(&self) -> bool {
        self.request_problem_information
    }

    #[must_use]
    pub fn topic_aliases(&self) -> &TopicAliases {
        &self.topic_aliases
    }

    pub fn topic_aliases_mut(&mut self) -> &mut TopicAliases {
        &mut self.topic_aliases
    }

    /// Records an accepted CONNECT. The version is fixed from here on.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if a CONNECT was already accepted
    pub fn accept_connect(&mut self, connect: &ConnectPacket, config: &EngineConfig) -> Result<()> {
        if self.protocol_version.is_some() {
            return Err(MqttError::ProtocolError(
                "Sent second CONNECT message".to_string(),
            ));
        }

        self.protocol_version = Some(connect.protocol_version);
        self.client_id = Some(connect.client_id.clone());
        self.clean_start = connect.clean_start;
        self.session_expiry_interval = connect.session_expiry_interval;
        self.client_receive_maximum = connect.receive_maximum;
        self.client_maximum_packet_size = connect.maximum_packet_size;
        self.request_problem_information = connect.request_problem_information;
        self.topic_aliases = TopicAliases::new(if connect.protocol_version.is_v5() {
            config.topic_alias_maximum
        } else {
            0
        });
        Ok(())
    }
}
