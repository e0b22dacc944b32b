//! Test support
//!
//! Raw packet builders for feeding the decoder byte-exact input, including
//! input the crate's own encoders refuse to produce, plus collaborators
//! that record what the engine asked them to do.

use crate::connection::ConnectionState;
use crate::disconnect::{Connacker, Disconnector};
use crate::error::{MqttError, Result};
use crate::packet::MqttPacket;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use crate::session::outbound::{OutboundPacket, PacketSink};
use crate::storage::{FlowRecord, FlowStore};
use crate::QoS;

/// Encodes a complete packet with the crate's encoder
///
/// # Errors
///
/// Returns the encoder's error
pub fn encode_packet<P: MqttPacket>(packet: &P, version: ProtocolVersion) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    packet.encode(&mut buf, version)?;
    Ok(buf)
}

/// Remaining length bytes for `len`, without the 4 byte limit
#[must_use]
pub fn remaining_length(mut len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            return out;
        }
    }
}

/// Prefixes `body` with a fixed header
#[must_use]
pub fn frame(first_byte: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![first_byte];
    out.extend(remaining_length(body.len()));
    out.extend_from_slice(body);
    out
}

/// Appends a two byte length prefixed string
pub fn put_str(out: &mut Vec<u8>, value: &str) {
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn connect_body(name: &str, level: u8, client_id: &str, v5: bool) -> Vec<u8> {
    let mut body = Vec::new();
    put_str(&mut body, name);
    body.push(level);
    // clean session
    body.push(0x02);
    body.extend_from_slice(&60u16.to_be_bytes());
    if v5 {
        body.push(0x00);
    }
    put_str(&mut body, client_id);
    body
}

#[must_use]
pub fn connect_v31(client_id: &str) -> Vec<u8> {
    frame(0x10, &connect_body("MQIsdp", 3, client_id, false))
}

#[must_use]
pub fn connect_v311(client_id: &str) -> Vec<u8> {
    frame(0x10, &connect_body("MQTT", 4, client_id, false))
}

#[must_use]
pub fn connect_v5(client_id: &str) -> Vec<u8> {
    frame(0x10, &connect_body("MQTT", 5, client_id, true))
}

/// PUBLISH with an empty property block on v5
#[must_use]
pub fn publish(
    version: ProtocolVersion,
    topic: &str,
    qos: QoS,
    packet_id: Option<u16>,
    dup: bool,
    payload: &[u8],
) -> Vec<u8> {
    let first = 0x30 | (u8::from(dup) << 3) | (u8::from(qos) << 1);
    let mut body = Vec::new();
    put_str(&mut body, topic);
    if let Some(id) = packet_id {
        body.extend_from_slice(&id.to_be_bytes());
    }
    if version.is_v5() {
        body.push(0x00);
    }
    body.extend_from_slice(payload);
    frame(first, &body)
}

#[must_use]
pub fn puback(packet_id: u16) -> Vec<u8> {
    frame(0x40, &packet_id.to_be_bytes())
}

#[must_use]
pub fn pubrel(packet_id: u16) -> Vec<u8> {
    frame(0x62, &packet_id.to_be_bytes())
}

/// SUBSCRIBE with a single filter; v5 adds an empty property block
#[must_use]
pub fn subscribe(version: ProtocolVersion, packet_id: u16, filter: &str, options: u8) -> Vec<u8> {
    let mut body = packet_id.to_be_bytes().to_vec();
    if version.is_v5() {
        body.push(0x00);
    }
    put_str(&mut body, filter);
    body.push(options);
    frame(0x82, &body)
}

#[must_use]
pub fn pingreq() -> Vec<u8> {
    vec![0xC0, 0x00]
}

#[must_use]
pub fn disconnect() -> Vec<u8> {
    vec![0xE0, 0x00]
}

/// A termination the engine requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Disconnected {
        reason_code: ReasonCode,
        reason_string: Option<String>,
    },
    Connack {
        version: ProtocolVersion,
        reason_code: ReasonCode,
    },
    Closed,
}

/// Records every termination instead of touching a socket
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    pub events: Vec<Termination>,
}

impl Disconnector for RecordingTerminator {
    fn disconnect(
        &mut self,
        _connection: &ConnectionState,
        _log_reason: &str,
        _user_reason: &str,
        reason_code: ReasonCode,
        reason_string: Option<&str>,
    ) {
        self.events.push(Termination::Disconnected {
            reason_code,
            reason_string: reason_string.map(str::to_string),
        });
    }

    fn close_immediately(&mut self, _connection: &ConnectionState) {
        self.events.push(Termination::Closed);
    }
}

impl Connacker for RecordingTerminator {
    fn connack_error(
        &mut self,
        _connection: &ConnectionState,
        version: ProtocolVersion,
        _log_reason: &str,
        _user_reason: &str,
        reason_code: ReasonCode,
        _reason_string: Option<&str>,
    ) {
        self.events.push(Termination::Connack {
            version,
            reason_code,
        });
    }
}

/// Packet sink that keeps everything written
#[derive(Debug)]
pub struct RecordingSink {
    pub written: Vec<OutboundPacket>,
    /// Make every write fail
    pub fail_writes: bool,
    pub writable: bool,
    pub pending: usize,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            written: Vec::new(),
            fail_writes: false,
            writable: true,
            pending: 0,
        }
    }
}

impl RecordingSink {
    /// Packet ids of the written PUBLISH packets, in write order
    #[must_use]
    pub fn written_ids(&self) -> Vec<u16> {
        self.written
            .iter()
            .filter_map(|packet| match packet {
                OutboundPacket::Publish(publish) => publish.packet_id,
                _ => None,
            })
            .collect()
    }
}

impl PacketSink for RecordingSink {
    fn write(&mut self, packet: OutboundPacket) -> Result<()> {
        if self.fail_writes {
            return Err(MqttError::Io("connection reset".to_string()));
        }
        self.written.push(packet);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn pending_writes(&self) -> usize {
        self.pending
    }
}

/// Flow store whose every operation fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingFlowStore;

impl FlowStore for FailingFlowStore {
    async fn get(&self, _client_id: &str, _packet_id: u16) -> Result<Option<FlowRecord>> {
        Err(MqttError::Storage("store unavailable".to_string()))
    }

    async fn add_or_replace(&self, _client_id: &str, _packet_id: u16, _record: FlowRecord) -> Result<()> {
        Err(MqttError::Storage("store unavailable".to_string()))
    }

    async fn remove(&self, _client_id: &str, _packet_id: u16) -> Result<()> {
        Err(MqttError::Storage("store unavailable".to_string()))
    }

    async fn delete_client(&self, _client_id: &str) -> Result<()> {
        Err(MqttError::Storage("store unavailable".to_string()))
    }
}
