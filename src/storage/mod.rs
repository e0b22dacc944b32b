//! Inbound message flow persistence
//!
//! The QoS engine decides *when* a flow record is created, looked up or
//! removed; where records live is up to the [`FlowStore`] implementation.
//! Records are keyed by `(client id, packet id)` so they can outlive a
//! single connection of a persistent session.

pub mod memory_backend;

pub use memory_backend::MemoryFlowStore;

use crate::error::Result;
use crate::packet::publish::PublishPacket;
use std::sync::Arc;

/// Last step seen for one inbound QoS 1/2 packet identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowRecord {
    /// The PUBLISH that opened the flow
    Publish(PublishPacket),
    /// A PUBACK is being written for the flow
    PubAck,
    /// The client released a QoS 2 flow; a PUBCOMP is being written
    PubRel,
}

impl FlowRecord {
    #[must_use]
    pub fn is_publish(&self) -> bool {
        matches!(self, Self::Publish(_))
    }
}

/// Storage backend for inbound flow records
///
/// Failures are reported, never retried; the engine logs them and keeps the
/// connection going.
pub trait FlowStore: Send + Sync {
    /// Record stored for `packet_id`, if any
    fn get(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> impl std::future::Future<Output = Result<Option<FlowRecord>>> + Send;

    /// Stores `record`, replacing whatever was kept for `packet_id`
    fn add_or_replace(
        &self,
        client_id: &str,
        packet_id: u16,
        record: FlowRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Removes the record for `packet_id`
    fn remove(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Removes every record of `client_id`
    fn delete_client(&self, client_id: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: FlowStore> FlowStore for Arc<S> {
    fn get(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> impl std::future::Future<Output = Result<Option<FlowRecord>>> + Send {
        (**self).get(client_id, packet_id)
    }

    fn add_or_replace(
        &self,
        client_id: &str,
        packet_id: u16,
        record: FlowRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        (**self).add_or_replace(client_id, packet_id, record)
    }

    fn remove(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        (**self).remove(client_id, packet_id)
    }

    fn delete_client(
        &self,
        client_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        (**self).delete_client(client_id)
    }
}
