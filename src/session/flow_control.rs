use crate::error::{MqttError, Result};

/// Admission counter for inbound QoS 1/2 publishes
///
/// Starts at the server's receive maximum. Each new inbound flow takes one
/// slot; the slot comes back when the broker sends the flow's terminating
/// acknowledgement (PUBACK, PUBCOMP, or a PUBREC with an error reason code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveQuota {
    maximum: u16,
    available: u16,
}

impl ReceiveQuota {
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            maximum,
            available: maximum,
        }
    }

    #[must_use]
    pub fn maximum(&self) -> u16 {
        self.maximum
    }

    #[must_use]
    pub fn available(&self) -> u16 {
        self.available
    }

    /// Number of flows currently holding a slot
    #[must_use]
    pub fn in_use(&self) -> u16 {
        self.maximum - self.available
    }

    /// Takes a slot for a new flow
    ///
    /// # Errors
    ///
    /// `ReceiveMaximumExceeded` when every slot is taken; the client sent
    /// more concurrent publishes than it was allowed to
    pub fn acquire(&mut self) -> Result<()> {
        self.available = self
            .available
            .checked_sub(1)
            .ok_or(MqttError::ReceiveMaximumExceeded)?;
        Ok(())
    }

    /// Returns a slot, never above the maximum
    pub fn release(&mut self) {
        if self.available < self.maximum {
            self.available += 1;
        }
    }
}
