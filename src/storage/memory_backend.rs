//! In-memory flow store
//!
//! Volatile; records are lost with the process. Clones share the same map,
//! so one store can back every connection of a listener.

use super::{FlowRecord, FlowStore};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory storage backend for flow records
#[derive(Debug, Clone, Default)]
pub struct MemoryFlowStore {
    /// Flow records by client id, then packet id
    flows: Arc<RwLock<HashMap<String, HashMap<u16, FlowRecord>>>>,
}

impl MemoryFlowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records kept for `client_id`
    pub async fn flow_count(&self, client_id: &str) -> usize {
        self.flows
            .read()
            .await
            .get(client_id)
            .map_or(0, HashMap::len)
    }
}

impl FlowStore for MemoryFlowStore {
    async fn get(&self, client_id: &str, packet_id: u16) -> Result<Option<FlowRecord>> {
        let flows = self.flows.read().await;
        Ok(flows
            .get(client_id)
            .and_then(|records| records.get(&packet_id))
            .cloned())
    }

    async fn add_or_replace(&self, client_id: &str, packet_id: u16, record: FlowRecord) -> Result<()> {
        let mut flows = self.flows.write().await;
        flows
            .entry(client_id.to_string())
            .or_default()
            .insert(packet_id, record);
        trace!(client_id, packet_id, "stored flow record");
        Ok(())
    }

    async fn remove(&self, client_id: &str, packet_id: u16) -> Result<()> {
        let mut flows = self.flows.write().await;
        if let Some(records) = flows.get_mut(client_id) {
            records.remove(&packet_id);
            if records.is_empty() {
                flows.remove(client_id);
            }
        }
        trace!(client_id, packet_id, "removed flow record");
        Ok(())
    }

    async fn delete_client(&self, client_id: &str) -> Result<()> {
        self.flows.write().await.remove(client_id);
        trace!(client_id, "removed all flow records");
        Ok(())
    }
}
