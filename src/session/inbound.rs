//! Inbound QoS 1/2 flows: admission and deduplication
//!
//! A flow lives from the first PUBLISH for a packet identifier until the
//! broker's terminating acknowledgement has been written. Two pieces of
//! state track it:
//!
//! - the persisted [`FlowRecord`] in the [`FlowStore`], which survives
//!   reconnects of a persistent session, and
//! - a per-connection "already forwarded" flag, which tells a true duplicate
//!   (DUP=1, forwarded on this connection) from a resend whose original was
//!   never passed on.

use super::flow_control::ReceiveQuota;
use crate::error::Result;
use crate::packet::publish::PublishPacket;
use crate::storage::{FlowRecord, FlowStore};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// What to do with an inbound PUBLISH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDecision {
    /// Pass the message on to publish processing
    Forward,
    /// A duplicate of a message already passed on; acknowledge but drop
    Drop,
}

/// Inbound flow tracker of one connection
#[derive(Debug)]
pub struct InboundFlows<S> {
    store: S,
    /// `None` on 3.x connections, which never negotiate a receive maximum
    quota: Option<ReceiveQuota>,
    /// Packet ids holding an admission slot, mapped to "already forwarded"
    flows: HashMap<u16, bool>,
}

impl<S: FlowStore> InboundFlows<S> {
    /// Tracker whose admission is bounded by `receive_maximum`
    pub fn new(store: S, receive_maximum: u16) -> Self {
        Self {
            store,
            quota: Some(ReceiveQuota::new(receive_maximum)),
            flows: HashMap::new(),
        }
    }

    /// Tracker without admission control, for MQTT 3.x connections
    pub fn unbounded(store: S) -> Self {
        Self {
            store,
            quota: None,
            flows: HashMap::new(),
        }
    }

    #[must_use]
    pub fn quota(&self) -> Option<&ReceiveQuota> {
        self.quota.as_ref()
    }

    /// Flows currently holding an admission slot, or open on a 3.x connection
    #[must_use]
    pub fn open_flows(&self) -> usize {
        self.flows.len()
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `packet_id` has an open flow on this connection
    #[must_use]
    pub fn is_open(&self, packet_id: u16) -> bool {
        self.flows.contains_key(&packet_id)
    }

    /// Admits and deduplicates a QoS 1/2 PUBLISH
    ///
    /// # Errors
    ///
    /// `ReceiveMaximumExceeded` when the publish would open one flow more
    /// than the receive maximum allows. Unbounded trackers never fail.
    pub async fn on_publish(
        &mut self,
        client_id: &str,
        packet_id: u16,
        publish: &PublishPacket,
    ) -> Result<InboundDecision> {
        if !self.flows.contains_key(&packet_id) {
            if let Some(quota) = self.quota.as_mut() {
                quota.acquire()?;
            }
            self.flows.insert(packet_id, false);
        }

        let prior = match self.store.get(client_id, packet_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(client_id, packet_id, error = %e, "flow record lookup failed");
                None
            }
        };

        if !prior.as_ref().is_some_and(FlowRecord::is_publish) {
            self.persist(client_id, packet_id, FlowRecord::Publish(publish.clone()))
                .await;
            self.flows.insert(packet_id, true);
            trace!(
                client_id,
                packet_id,
                "publish not forwarded before, processing normally"
            );
            return Ok(InboundDecision::Forward);
        }

        if publish.dup {
            let already_forwarded = self.flows.insert(packet_id, true).unwrap_or(false);
            if already_forwarded {
                debug!(client_id, packet_id, "duplicate publish ignored");
                return Ok(InboundDecision::Drop);
            }
            debug!(
                client_id,
                packet_id,
                "duplicate publish not forwarded before, processing normally"
            );
            return Ok(InboundDecision::Forward);
        }

        debug!(
            client_id,
            packet_id,
            qos = u8::from(publish.qos),
            "publish reuses an identifier already in process, starting new flow"
        );
        self.persist(client_id, packet_id, FlowRecord::Publish(publish.clone()))
            .await;
        self.flows.insert(packet_id, true);
        Ok(InboundDecision::Forward)
    }

    /// Records that a PUBACK is about to be written for `packet_id`
    pub async fn on_puback_sending(&mut self, client_id: &str, packet_id: u16) {
        self.persist(client_id, packet_id, FlowRecord::PubAck).await;
    }

    /// Records a PUBREL from the client; a PUBCOMP is written next
    pub async fn on_pubrel(&mut self, client_id: &str, packet_id: u16) {
        self.persist(client_id, packet_id, FlowRecord::PubRel).await;
    }

    /// Ends the flow after its terminating acknowledgement was written
    ///
    /// The admission slot is returned whatever the write outcome. The flow
    /// record is only removed when the write succeeded.
    pub async fn complete(&mut self, client_id: &str, packet_id: u16, written: bool) {
        if self.flows.remove(&packet_id).is_some() {
            if let Some(quota) = self.quota.as_mut() {
                quota.release();
            }
        }

        if !written {
            debug!(
                client_id,
                packet_id,
                "acknowledgement write failed, keeping flow record"
            );
            return;
        }

        if let Err(e) = self.store.remove(client_id, packet_id).await {
            warn!(client_id, packet_id, error = %e, "flow record removal failed");
            return;
        }
        trace!(client_id, packet_id, "completed inbound QoS 1/2 flow");
    }

    /// Drops every record of a client whose session ends with the connection
    pub async fn clear_client(&mut self, client_id: &str) {
        self.flows.clear();
        self.quota = self.quota.map(|quota| ReceiveQuota::new(quota.maximum()));
        if let Err(e) = self.store.delete_client(client_id).await {
            warn!(client_id, error = %e, "deleting flow records failed");
        }
    }

    async fn persist(&self, client_id: &str, packet_id: u16, record: FlowRecord) {
        if let Err(e) = self.store.add_or_replace(client_id, packet_id, record).await {
            warn!(client_id, packet_id, error = %e, "storing flow record failed");
        }
    }
}
