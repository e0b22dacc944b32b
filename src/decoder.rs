//! Frame decoder
//!
//! Reassembles packets from a connection's read buffer, selects the decoder
//! for the packet's `(type, version)` and turns every protocol violation
//! into a termination side effect.
//!
//! Bytes are only consumed once a whole packet is buffered, so feeding a
//! packet in one chunk or byte by byte yields the same outcome. A rejection
//! clears the buffer: nothing that follows a violation is ever decoded.

use crate::config::EngineConfig;
use crate::connection::ConnectionState;
use crate::constants::limits::MIN_FIXED_HEADER_LENGTH;
use crate::disconnect::{send_disconnect, terminate, Connacker, Disconnector, RejectAction, Rejection};
use crate::encoding::{VariableInt, VariableIntPeek};
use crate::error::MqttError;
use crate::packet::{DecodeContext, FixedHeader, MqttTypeAndFlags, Packet, PacketType};
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

/// Result of one [`MqttDecoder::decode`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, validated packet was consumed from the buffer
    Decoded(Packet),
    /// The buffer does not hold a complete packet yet; nothing was consumed
    NeedMoreData,
    /// The packet violated the protocol and the connection was terminated
    Rejected(Rejection),
}

impl DecodeOutcome {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The decoded packet, if any
    #[must_use]
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Self::Decoded(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Where a failure happened, which decides how it is reported
enum Stage {
    /// Before a version is known: close without reply
    Framing,
    /// A first CONNECT whose version may or may not be known
    Connect(Option<ProtocolVersion>),
    /// Any packet on an accepted connection
    Established,
    /// A packet above the size limit
    Oversized,
}

/// Stateless frame decoder shared by the connections of one listener
///
/// The per-connection state lives in [`ConnectionState`]; the decoder only
/// owns the configuration and the termination collaborator `T`.
#[derive(Debug)]
pub struct MqttDecoder<T> {
    config: EngineConfig,
    terminator: T,
}

impl<T> MqttDecoder<T>
where
    T: Disconnector + Connacker,
{
    pub fn new(config: EngineConfig, terminator: T) -> Self {
        Self { config, terminator }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn terminator(&self) -> &T {
        &self.terminator
    }

    pub fn terminator_mut(&mut self) -> &mut T {
        &mut self.terminator
    }

    /// Decodes at most one packet from the front of `buf`
    pub fn decode(&mut self, connection: &mut ConnectionState, buf: &mut BytesMut) -> DecodeOutcome {
        if buf.len() < MIN_FIXED_HEADER_LENGTH {
            return DecodeOutcome::NeedMoreData;
        }

        let (remaining_length, length_len) = match VariableInt::peek(&buf[1..]) {
            VariableIntPeek::Complete { value, len } => (value, len),
            VariableIntPeek::Incomplete => return DecodeOutcome::NeedMoreData,
            VariableIntPeek::Malformed => {
                let error = MqttError::MalformedPacket(
                    "Sent a message with an invalid remaining length".to_string(),
                );
                return self.close(connection, buf, error);
            }
        };

        let header_len = 1 + length_len;
        let total_len = header_len + remaining_length as usize;
        if buf.len() < total_len {
            trace!(
                connection = %connection.id(),
                buffered = buf.len(),
                needed = total_len,
                "waiting for the rest of the packet"
            );
            return DecodeOutcome::NeedMoreData;
        }

        if total_len > self.config.max_packet_size {
            let error = MqttError::PacketTooLarge {
                size: total_len,
                max: self.config.max_packet_size,
            };
            return self.reject(connection, buf, Stage::Oversized, error);
        }

        let first_byte = buf[0];
        let type_and_flags = match MqttTypeAndFlags::parse(first_byte) {
            Ok(parsed) => parsed,
            Err(error) => return self.close(connection, buf, error),
        };
        let Some(packet_type) = type_and_flags.packet_type() else {
            return self.close(connection, buf, MqttError::InvalidPacketType(0));
        };

        if let Err(error) = self.check_sequence(connection, packet_type) {
            return self.close(connection, buf, error);
        }

        let mut body = buf.split_to(total_len).freeze();
        body.advance(header_len);

        let (version, stage) = match (packet_type, connection.protocol_version()) {
            (PacketType::Connect, Some(_)) => {
                let error = MqttError::ProtocolError("Sent second CONNECT message".to_string());
                return self.reject(connection, buf, Stage::Established, error);
            }
            (PacketType::Connect, None) => match ProtocolVersion::peek_connect(&body) {
                Ok(version) => (version, Stage::Connect(Some(version))),
                Err(error) => return self.reject(connection, buf, Stage::Connect(None), error),
            },
            (_, Some(version)) => (version, Stage::Established),
            (_, None) => {
                // already refused by check_sequence
                let error = MqttError::ProtocolError(format!("Sent a {packet_type} before CONNECT"));
                return self.close(connection, buf, error);
            }
        };

        let fixed_header = FixedHeader::new(packet_type, type_and_flags.flags(), remaining_length);
        let decoded = {
            let mut ctx = DecodeContext {
                fixed_header,
                version,
                config: &self.config,
                connection,
            };
            Packet::decode_from_body(&mut body, &mut ctx)
        };

        let packet = match decoded {
            Ok(packet) => packet,
            Err(error) => return self.reject(connection, buf, stage, error),
        };

        if let Packet::Connect(connect) = &packet {
            if let Err(error) = connection.accept_connect(connect, &self.config) {
                return self.reject(connection, buf, Stage::Connect(Some(version)), error);
            }
            debug!(
                client_id = connection.client_id(),
                connection = %connection.id(),
                %version,
                "CONNECT accepted"
            );
        } else {
            trace!(
                client_id = connection.client_id(),
                packet_type = %packet_type,
                "decoded packet"
            );
        }

        DecodeOutcome::Decoded(packet)
    }

    /// Packet types a client may never send in the connection's current state
    fn check_sequence(
        &self,
        connection: &ConnectionState,
        packet_type: PacketType,
    ) -> Result<(), MqttError> {
        if !connection.is_connected() && packet_type != PacketType::Connect {
            return Err(MqttError::ProtocolError(format!(
                "Sent a {packet_type} message before CONNECT"
            )));
        }

        match packet_type {
            PacketType::PingResp => Err(MqttError::ProtocolError(
                "Sent a PINGRESP message".to_string(),
            )),
            PacketType::ConnAck | PacketType::SubAck | PacketType::UnsubAck
                if self.config.strict =>
            {
                Err(MqttError::ProtocolError(format!(
                    "Sent a {packet_type} message"
                )))
            }
            PacketType::Auth if connection.protocol_version().is_some_and(|v| !v.is_v5()) => {
                Err(MqttError::InvalidPacketType(PacketType::Auth as u8))
            }
            _ => Ok(()),
        }
    }

    fn close(
        &mut self,
        connection: &ConnectionState,
        buf: &mut BytesMut,
        error: MqttError,
    ) -> DecodeOutcome {
        buf.clear();
        debug!(
            client_id = connection.client_id(),
            connection = %connection.id(),
            reason = %error,
            "closing connection"
        );
        self.terminator.close_immediately(connection);
        DecodeOutcome::Rejected(Rejection {
            error,
            action: RejectAction::Closed,
        })
    }

    fn reject(
        &mut self,
        connection: &ConnectionState,
        buf: &mut BytesMut,
        stage: Stage,
        error: MqttError,
    ) -> DecodeOutcome {
        let reason_code = error.reason_code();

        match stage {
            Stage::Framing => self.close(connection, buf, error),

            Stage::Connect(version) => {
                let version = match (&error, version) {
                    (MqttError::UnsupportedProtocolVersion, _) => ProtocolVersion::V3_1_1,
                    (_, Some(version)) => version,
                    (_, None) => return self.close(connection, buf, error),
                };

                if !version.is_v5() && reason_code.to_v3_connack_return_code().is_none() {
                    return self.close(connection, buf, error);
                }

                buf.clear();
                let user_reason = error.to_string();
                let log_reason = format!(
                    "Client (connection {}) sent an invalid CONNECT: {error}",
                    connection.id()
                );
                debug!(
                    connection = %connection.id(),
                    %version,
                    reason = %error,
                    "refusing CONNECT"
                );
                let reason_string = self
                    .config
                    .disconnect_with_reason_string
                    .then_some(user_reason.as_str());
                self.terminator.connack_error(
                    connection,
                    version,
                    &log_reason,
                    &user_reason,
                    reason_code,
                    reason_string,
                );
                DecodeOutcome::Rejected(Rejection {
                    error,
                    action: RejectAction::ConnackSent(reason_code),
                })
            }

            Stage::Established => {
                buf.clear();
                let action = terminate(&mut self.terminator, connection, &self.config, &error);
                DecodeOutcome::Rejected(Rejection { error, action })
            }

            Stage::Oversized => {
                if !connection.protocol_version().is_some_and(ProtocolVersion::is_v5) {
                    return self.close(connection, buf, error);
                }
                buf.clear();
                let action =
                    send_disconnect(&mut self.terminator, connection, &self.config, &error);
                DecodeOutcome::Rejected(Rejection { error, action })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::v5::reason_codes::ReasonCode;
    use crate::testing::{self, RecordingTerminator, Termination};

    fn decoder(config: EngineConfig) -> MqttDecoder<RecordingTerminator> {
        MqttDecoder::new(config, RecordingTerminator::default())
    }

    #[test]
    fn test_need_more_data_without_consuming() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();

        let mut buf = BytesMut::from(&[0x10][..]);
        assert_eq!(
            decoder.decode(&mut connection, &mut buf),
            DecodeOutcome::NeedMoreData
        );
        assert_eq!(buf.len(), 1);

        // continuation bit set on the last byte
        let mut buf = BytesMut::from(&[0x10, 0x80][..]);
        assert_eq!(
            decoder.decode(&mut connection, &mut buf),
            DecodeOutcome::NeedMoreData
        );
        assert_eq!(buf.len(), 2);

        let mut buf = BytesMut::from(&[0x10, 0x05, 0x00][..]);
        assert_eq!(
            decoder.decode(&mut connection, &mut buf),
            DecodeOutcome::NeedMoreData
        );
        assert_eq!(buf.len(), 3);
        assert!(decoder.terminator().events.is_empty());
    }

    #[test]
    fn test_malformed_remaining_length_closes() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&[0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);

        let outcome = decoder.decode(&mut connection, &mut buf);
        assert!(matches!(
            outcome,
            DecodeOutcome::Rejected(Rejection {
                action: RejectAction::Closed,
                ..
            })
        ));
        assert!(buf.is_empty());
        assert_eq!(decoder.terminator().events, vec![Termination::Closed]);
    }

    #[test]
    fn test_connect_decoded_and_accepted() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&testing::connect_v311("client-a")[..]);

        let packet = decoder
            .decode(&mut connection, &mut buf)
            .into_packet()
            .unwrap();
        assert_eq!(packet.packet_type(), PacketType::Connect);
        assert!(buf.is_empty());
        assert_eq!(connection.protocol_version(), Some(ProtocolVersion::V3_1_1));
        assert_eq!(connection.client_id(), "client-a");
    }

    #[test]
    fn test_packet_before_connect_closes() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&testing::pingreq()[..]);

        assert!(decoder.decode(&mut connection, &mut buf).is_rejected());
        assert_eq!(decoder.terminator().events, vec![Termination::Closed]);
    }

    #[test]
    fn test_second_connect_v5_disconnects() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&testing::connect_v5("c")[..]);
        buf.extend_from_slice(&testing::connect_v5("c"));

        assert!(decoder.decode(&mut connection, &mut buf).into_packet().is_some());
        let outcome = decoder.decode(&mut connection, &mut buf);
        assert!(matches!(
            outcome,
            DecodeOutcome::Rejected(Rejection {
                action: RejectAction::Disconnected(ReasonCode::ProtocolError),
                ..
            })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unsupported_level_gets_connack() {
        let mut decoder = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut bytes = testing::connect_v311("c");
        bytes[8] = 0x06;
        let mut buf = BytesMut::from(&bytes[..]);

        let outcome = decoder.decode(&mut connection, &mut buf);
        assert!(matches!(
            outcome,
            DecodeOutcome::Rejected(Rejection {
                action: RejectAction::ConnackSent(ReasonCode::UnsupportedProtocolVersion),
                ..
            })
        ));
        assert_eq!(
            decoder.terminator().events,
            vec![Termination::Connack {
                version: ProtocolVersion::V3_1_1,
                reason_code: ReasonCode::UnsupportedProtocolVersion,
            }]
        );
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_strict_toggle_for_server_packets() {
        let mut strict = decoder(EngineConfig::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&testing::connect_v311("c")[..]);
        buf.extend_from_slice(&[0x90, 0x03, 0x00, 0x01, 0x00]);
        assert!(strict.decode(&mut connection, &mut buf).into_packet().is_some());
        assert!(strict.decode(&mut connection, &mut buf).is_rejected());

        let mut lenient = decoder(EngineConfig::default().with_strict(false));
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(&testing::connect_v311("c")[..]);
        buf.extend_from_slice(&[0x90, 0x03, 0x00, 0x01, 0x00]);
        assert!(lenient.decode(&mut connection, &mut buf).into_packet().is_some());
        assert!(matches!(
            lenient.decode(&mut connection, &mut buf),
            DecodeOutcome::Decoded(Packet::Unchecked(_))
        ));
    }
}
