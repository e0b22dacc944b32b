//! Delivery status of outbound publishes
//!
//! Every submitted message gets a [`DeliveryHandle`]; the engine keeps the
//! matching [`DeliveryResolver`]. Resolving consumes the resolver, so a
//! status can be set at most once, and a resolver dropped unresolved reports
//! [`DeliveryStatus::NotConnected`], so none is ever left hanging.

use tokio::sync::oneshot;

/// Outcome of an outbound publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Acknowledged by the client, or written for QoS 0
    Delivered,
    /// The connection closed before the flow completed
    NotConnected,
    /// The write failed
    Failed,
    /// Not resolved yet
    InProgress,
    /// Dropped QoS 0 publish while the connection was not writable
    ChannelNotWritable,
}

impl DeliveryStatus {
    #[must_use]
    pub fn is_final(self) -> bool {
        self != Self::InProgress
    }
}

/// Sending half, owned by the engine
#[derive(Debug)]
pub struct DeliveryResolver {
    tx: Option<oneshot::Sender<DeliveryStatus>>,
}

/// Receiving half, returned by `submit`
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: oneshot::Receiver<DeliveryStatus>,
    status: DeliveryStatus,
}

/// Creates a connected resolver/handle pair
#[must_use]
pub fn delivery_channel() -> (DeliveryResolver, DeliveryHandle) {
    let (tx, rx) = oneshot::channel();
    (
        DeliveryResolver { tx: Some(tx) },
        DeliveryHandle {
            rx,
            status: DeliveryStatus::InProgress,
        },
    )
}

impl DeliveryResolver {
    /// Sets the final status
    pub fn resolve(mut self, status: DeliveryStatus) {
        self.send(status);
    }

    fn send(&mut self, status: DeliveryStatus) {
        if let Some(tx) = self.tx.take() {
            // the handle may have been dropped, nobody is waiting then
            let _ = tx.send(status);
        }
    }
}

impl Drop for DeliveryResolver {
    fn drop(&mut self) {
        self.send(DeliveryStatus::NotConnected);
    }
}

impl DeliveryHandle {
    /// A handle that is already resolved
    #[must_use]
    pub fn resolved(status: DeliveryStatus) -> Self {
        let (resolver, mut handle) = delivery_channel();
        resolver.resolve(status);
        handle.status = status;
        handle
    }

    /// Current status without waiting, `InProgress` while unresolved
    pub fn try_status(&mut self) -> DeliveryStatus {
        if self.status.is_final() {
            return self.status;
        }
        match self.rx.try_recv() {
            Ok(status) => self.status = status,
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.status = DeliveryStatus::NotConnected;
            }
        }
        self.status
    }

    /// Waits for the final status
    pub async fn wait(self) -> DeliveryStatus {
        if self.status.is_final() {
            return self.status;
        }
        self.rx.await.unwrap_or(DeliveryStatus::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        let (resolver, mut handle) = delivery_channel();
        assert_eq!(handle.try_status(), DeliveryStatus::InProgress);

        resolver.resolve(DeliveryStatus::Delivered);
        assert_eq!(handle.try_status(), DeliveryStatus::Delivered);
        assert_eq!(handle.try_status(), DeliveryStatus::Delivered);
    }

    #[test]
    fn test_dropped_resolver_reports_not_connected() {
        let (resolver, mut handle) = delivery_channel();
        drop(resolver);
        assert_eq!(handle.try_status(), DeliveryStatus::NotConnected);
    }

    #[test]
    fn test_resolved_handle() {
        let mut handle = DeliveryHandle::resolved(DeliveryStatus::ChannelNotWritable);
        assert_eq!(handle.try_status(), DeliveryStatus::ChannelNotWritable);
    }

    #[tokio::test]
    async fn test_wait() {
        let (resolver, handle) = delivery_channel();
        let waiter = tokio::spawn(handle.wait());
        resolver.resolve(DeliveryStatus::Failed);
        assert_eq!(waiter.await.unwrap(), DeliveryStatus::Failed);
    }
}
