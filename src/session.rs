//! Per-connection QoS delivery engine
//!
//! [`QosEngine`] owns the inbound flow tracker, the outbound window and the
//! connection's [`PacketSink`]. A connection drives it from a single task:
//! decoded packets go in through the `on_*` hooks, and acknowledgements
//! the broker sends go through `send_*` so flow records and admission
//! slots are retired at the right time.

pub mod delivery;
pub mod flow_control;
pub mod inbound;
pub mod outbound;

pub use delivery::{DeliveryHandle, DeliveryResolver, DeliveryStatus};
pub use flow_control::ReceiveQuota;
pub use inbound::{InboundDecision, InboundFlows};
pub use outbound::{OutboundPacket, OutboundWindow, PacketSink, Submission};

use crate::config::EngineConfig;
use crate::connection::ConnectionState;
use crate::disconnect::{terminate, Disconnector, Rejection};
use crate::error::Result;
use crate::packet::puback::PubAckPacket;
use crate::packet::pubcomp::PubCompPacket;
use crate::packet::publish::PublishPacket;
use crate::packet::pubrec::PubRecPacket;
use crate::packet::pubrel::PubRelPacket;
use crate::protocol::ProtocolVersion;
use crate::storage::FlowStore;
use crate::QoS;
use tracing::debug;

/// QoS state machine of one connection
#[derive(Debug)]
pub struct QosEngine<S, W> {
    config: EngineConfig,
    inbound: InboundFlows<S>,
    outbound: OutboundWindow,
    sink: W,
}

impl<S: FlowStore, W: PacketSink> QosEngine<S, W> {
    /// Creates the engine for an accepted connection
    ///
    /// Inbound admission uses the server's receive maximum, the outbound
    /// window the one the client announced in its CONNECT. Receive maximum
    /// is negotiated by MQTT 5 only, so 3.x connections admit every flow.
    pub fn new(config: &EngineConfig, connection: &ConnectionState, store: S, sink: W) -> Self {
        let inbound = if connection.protocol_version().is_some_and(ProtocolVersion::is_v5) {
            InboundFlows::new(store, config.server_receive_maximum)
        } else {
            debug!(
                client_id = connection.client_id(),
                "no receive maximum on a pre-v5 connection"
            );
            InboundFlows::unbounded(store)
        };

        Self {
            config: config.clone(),
            inbound,
            outbound: OutboundWindow::new(connection.client_receive_maximum(), config),
            sink,
        }
    }

    #[must_use]
    pub fn inbound(&self) -> &InboundFlows<S> {
        &self.inbound
    }

    #[must_use]
    pub fn outbound(&self) -> &OutboundWindow {
        &self.outbound
    }

    #[must_use]
    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Admission and deduplication of an inbound PUBLISH
    ///
    /// A client exceeding the receive maximum is terminated through
    /// `terminator` and the publish is rejected.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] when the admission quota was exceeded
    pub async fn on_inbound_publish<D: Disconnector + ?Sized>(
        &mut self,
        connection: &ConnectionState,
        publish: &PublishPacket,
        terminator: &mut D,
    ) -> std::result::Result<InboundDecision, Rejection> {
        let packet_id = match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) | (_, None) => return Ok(InboundDecision::Forward),
            (_, Some(id)) => id,
        };

        match self
            .inbound
            .on_publish(connection.client_id(), packet_id, publish)
            .await
        {
            Ok(decision) => Ok(decision),
            Err(error) => {
                let action = terminate(terminator, connection, &self.config, &error);
                Err(Rejection { error, action })
            }
        }
    }

    /// Writes a PUBACK and completes the QoS 1 flow
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the write failed
    pub async fn send_puback(&mut self, connection: &ConnectionState, puback: PubAckPacket) -> Result<()> {
        let client_id = connection.client_id();
        let packet_id = puback.packet_id;

        self.inbound.on_puback_sending(client_id, packet_id).await;
        let written = self.sink.write(OutboundPacket::PubAck(puback));
        self.inbound
            .complete(client_id, packet_id, written.is_ok())
            .await;
        written
    }

    /// Writes a PUBREC; an error reason code ends the QoS 2 flow early
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the write failed
    pub async fn send_pubrec(&mut self, connection: &ConnectionState, pubrec: PubRecPacket) -> Result<()> {
        let packet_id = pubrec.packet_id;
        let ends_flow = pubrec.reason_code.is_error();

        let written = self.sink.write(OutboundPacket::PubRec(pubrec));
        if ends_flow {
            self.inbound
                .complete(connection.client_id(), packet_id, written.is_ok())
                .await;
        }
        written
    }

    /// Handles a client PUBREL: records it, writes the PUBCOMP and retires
    /// the flow record once that write succeeded
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the PUBCOMP write failed
    pub async fn on_inbound_pubrel(&mut self, connection: &ConnectionState, pubrel: &PubRelPacket) -> Result<()> {
        let client_id = connection.client_id();
        let packet_id = pubrel.packet_id;

        self.inbound.on_pubrel(client_id, packet_id).await;
        let written = self
            .sink
            .write(OutboundPacket::PubComp(PubCompPacket::new(packet_id)));
        self.inbound
            .complete(client_id, packet_id, written.is_ok())
            .await;
        written
    }

    /// Writes or queues an outbound packet
    pub fn submit_outbound(&mut self, packet: OutboundPacket) -> Submission {
        self.outbound.submit(&mut self.sink, packet)
    }

    /// Ends the outbound flow of `packet_id`, see [`OutboundWindow::complete`]
    pub fn complete_outbound(&mut self, packet_id: u16) -> bool {
        self.outbound.complete(&mut self.sink, packet_id)
    }

    /// A client PUBACK ends a QoS 1 flow
    pub fn on_puback_received(&mut self, puback: &PubAckPacket) -> bool {
        self.complete_outbound(puback.packet_id)
    }

    /// A client PUBREC only ends the flow when it carries an error
    pub fn on_pubrec_received(&mut self, pubrec: &PubRecPacket) -> bool {
        if pubrec.reason_code.is_error() {
            debug!(
                packet_id = pubrec.packet_id,
                reason_code = ?pubrec.reason_code,
                "client refused QoS 2 publish"
            );
            return self.complete_outbound(pubrec.packet_id);
        }
        false
    }

    /// A client PUBCOMP ends a QoS 2 flow
    pub fn on_pubcomp_received(&mut self, pubcomp: &PubCompPacket) -> bool {
        self.complete_outbound(pubcomp.packet_id)
    }

    /// An in-flight publish was dropped, for example because it expired
    pub fn on_publish_dropped(&mut self, packet_id: u16) -> bool {
        self.complete_outbound(packet_id)
    }

    /// Cleans up after the connection closed
    ///
    /// Every outstanding delivery handle resolves to `NotConnected`. Flow
    /// records are deleted when the session ends with the connection.
    pub async fn on_connection_closed(&mut self, connection: &ConnectionState) {
        let resolved = self.outbound.close();
        debug!(
            client_id = connection.client_id(),
            resolved, "outbound deliveries resolved as not connected"
        );

        if connection.session_expiry_interval() == 0 {
            self.inbound.clear_client(connection.client_id()).await;
        }
    }
}
