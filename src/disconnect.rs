//! Connection termination collaborators
//!
//! The frame decoder never writes to the network itself. When a packet
//! violates the protocol it hands the decision to a [`Disconnector`] or, for
//! a failed CONNECT, a [`Connacker`], and reports what it did through a
//! [`Rejection`].

use crate::config::EngineConfig;
use crate::connection::ConnectionState;
use crate::error::MqttError;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::protocol::ProtocolVersion;
use tracing::debug;

/// Terminates established connections
pub trait Disconnector {
    /// Sends a v5 DISCONNECT carrying `reason_code`, then closes
    fn disconnect(
        &mut self,
        connection: &ConnectionState,
        log_reason: &str,
        user_reason: &str,
        reason_code: ReasonCode,
        reason_string: Option<&str>,
    );

    /// Closes the connection without writing anything
    fn close_immediately(&mut self, connection: &ConnectionState);
}

/// Refuses a CONNECT with a CONNACK, then closes
///
/// For 3.x versions the implementation maps `reason_code` through
/// [`ReasonCode::to_v3_connack_return_code`]; it is only called when that
/// mapping exists.
pub trait Connacker {
    fn connack_error(
        &mut self,
        connection: &ConnectionState,
        version: ProtocolVersion,
        log_reason: &str,
        user_reason: &str,
        reason_code: ReasonCode,
        reason_string: Option<&str>,
    );
}

/// Side effect already performed for a rejected packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectAction {
    /// A DISCONNECT with this reason code was sent before closing
    Disconnected(ReasonCode),
    /// A CONNACK with this reason code was sent before closing
    ConnackSent(ReasonCode),
    /// The connection was closed without a reply
    Closed,
}

/// Why a packet produced no message, and what was done about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub error: MqttError,
    pub action: RejectAction,
}

impl Rejection {
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self.action {
            RejectAction::Disconnected(code) | RejectAction::ConnackSent(code) => code,
            RejectAction::Closed => self.error.reason_code(),
        }
    }
}

/// Ends an accepted connection after `error`
///
/// v5 clients get a DISCONNECT with the error's reason code when
/// `disconnect_with_reason_code` is on; everyone else is closed without a
/// reply.
pub fn terminate<D: Disconnector + ?Sized>(
    terminator: &mut D,
    connection: &ConnectionState,
    config: &EngineConfig,
    error: &MqttError,
) -> RejectAction {
    let v5 = connection
        .protocol_version()
        .is_some_and(ProtocolVersion::is_v5);

    if !v5 || !config.disconnect_with_reason_code {
        debug!(
            client_id = connection.client_id(),
            connection = %connection.id(),
            reason = %error,
            "closing connection"
        );
        terminator.close_immediately(connection);
        return RejectAction::Closed;
    }

    send_disconnect(terminator, connection, config, error)
}

/// Sends a v5 DISCONNECT for `error` whatever `disconnect_with_reason_code`
/// says
///
/// Only for v5 connections. The decoder uses it for oversized packets.
pub fn send_disconnect<D: Disconnector + ?Sized>(
    terminator: &mut D,
    connection: &ConnectionState,
    config: &EngineConfig,
    error: &MqttError,
) -> RejectAction {
    let reason_code = error.reason_code();
    let user_reason = error.to_string();
    let log_reason = format!(
        "Client '{}' (connection {}) violated the protocol: {error}",
        connection.client_id(),
        connection.id()
    );
    debug!(
        client_id = connection.client_id(),
        connection = %connection.id(),
        ?reason_code,
        reason = %error,
        "disconnecting client"
    );
    let reason_string = config
        .disconnect_with_reason_string
        .then_some(user_reason.as_str());
    terminator.disconnect(
        connection,
        &log_reason,
        &user_reason,
        reason_code,
        reason_string,
    );
    RejectAction::Disconnected(reason_code)
}

impl<T: Disconnector + ?Sized> Disconnector for &mut T {
    fn disconnect(
        &mut self,
        connection: &ConnectionState,
        log_reason: &str,
        user_reason: &str,
        reason_code: ReasonCode,
        reason_string: Option<&str>,
    ) {
        (**self).disconnect(connection, log_reason, user_reason, reason_code, reason_string);
    }

    fn close_immediately(&mut self, connection: &ConnectionState) {
        (**self).close_immediately(connection);
    }
}

impl<T: Connacker + ?Sized> Connacker for &mut T {
    fn connack_error(
        &mut self,
        connection: &ConnectionState,
        version: ProtocolVersion,
        log_reason: &str,
        user_reason: &str,
        reason_code: ReasonCode,
        reason_string: Option<&str>,
    ) {
        (**self).connack_error(
            connection,
            version,
            log_reason,
            user_reason,
            reason_code,
            reason_string,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::connect::ConnectPacket;
    use crate::testing::{RecordingTerminator, Termination};

    fn connected(version: ProtocolVersion) -> ConnectionState {
        let mut connection = ConnectionState::new();
        connection
            .accept_connect(
                &ConnectPacket::new(version, "client"),
                &EngineConfig::default(),
            )
            .unwrap();
        connection
    }

    #[test]
    fn test_terminate_v5_sends_reason_code() {
        let connection = connected(ProtocolVersion::V5);
        let mut terminator = RecordingTerminator::default();

        let action = terminate(
            &mut terminator,
            &connection,
            &EngineConfig::default(),
            &MqttError::ReceiveMaximumExceeded,
        );
        assert_eq!(
            action,
            RejectAction::Disconnected(ReasonCode::ReceiveMaximumExceeded)
        );
        assert_eq!(
            terminator.events,
            vec![Termination::Disconnected {
                reason_code: ReasonCode::ReceiveMaximumExceeded,
                reason_string: Some("Receive maximum exceeded".to_string()),
            }]
        );
    }

    #[test]
    fn test_terminate_closes_v3_and_when_disabled() {
        let mut terminator = RecordingTerminator::default();
        let error = MqttError::ProtocolError("x".into());

        let v311 = connected(ProtocolVersion::V3_1_1);
        let action = terminate(&mut terminator, &v311, &EngineConfig::default(), &error);
        assert_eq!(action, RejectAction::Closed);

        let v5 = connected(ProtocolVersion::V5);
        let config = EngineConfig::default().with_disconnect_reason_code(false);
        let action = terminate(&mut terminator, &v5, &config, &error);
        assert_eq!(action, RejectAction::Closed);

        assert_eq!(
            terminator.events,
            vec![Termination::Closed, Termination::Closed]
        );
    }

    #[test]
    fn test_send_disconnect_ignores_reason_code_toggle() {
        let connection = connected(ProtocolVersion::V5);
        let mut terminator = RecordingTerminator::default();
        let config = EngineConfig::default().with_disconnect_reason_code(false);
        let error = MqttError::PacketTooLarge { size: 100, max: 64 };

        assert_eq!(
            terminate(&mut terminator, &connection, &config, &error),
            RejectAction::Closed
        );
        assert_eq!(
            send_disconnect(&mut terminator, &connection, &config, &error),
            RejectAction::Disconnected(ReasonCode::PacketTooLarge)
        );
        assert!(matches!(
            terminator.events.as_slice(),
            [
                Termination::Closed,
                Termination::Disconnected {
                    reason_code: ReasonCode::PacketTooLarge,
                    ..
                }
            ]
        ));
    }

    #[test]
    fn test_reason_string_toggle() {
        let connection = connected(ProtocolVersion::V5);
        let mut terminator = RecordingTerminator::default();
        let config = EngineConfig::default().with_disconnect_reason_string(false);

        terminate(
            &mut terminator,
            &connection,
            &config,
            &MqttError::ProtocolError("x".into()),
        );
        assert_eq!(
            terminator.events,
            vec![Termination::Disconnected {
                reason_code: ReasonCode::ProtocolError,
                reason_string: None,
            }]
        );
    }

    #[test]
    fn test_rejection_reason_code() {
        let closed = Rejection {
            error: MqttError::MalformedPacket("x".into()),
            action: RejectAction::Closed,
        };
        assert_eq!(closed.reason_code(), ReasonCode::MalformedPacket);

        let connack = Rejection {
            error: MqttError::UnsupportedProtocolVersion,
            action: RejectAction::ConnackSent(ReasonCode::UnsupportedProtocolVersion),
        };
        assert_eq!(connack.reason_code(), ReasonCode::UnsupportedProtocolVersion);
    }
}
