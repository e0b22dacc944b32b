//! Outbound ordering window
//!
//! QoS 1/2 publishes occupy an in-flight slot from the write until the
//! client's terminating acknowledgement. At most `capacity` slots (the
//! client's receive maximum) are used; further publishes wait in a FIFO
//! queue and are written in submission order as slots free up.

use super::delivery::{delivery_channel, DeliveryHandle, DeliveryResolver, DeliveryStatus};
use crate::config::EngineConfig;
use crate::error::{MqttError, Result};
use crate::packet::puback::PubAckPacket;
use crate::packet::pubcomp::PubCompPacket;
use crate::packet::publish::PublishPacket;
use crate::packet::pubrec::PubRecPacket;
use crate::packet::pubrel::PubRelPacket;
use crate::packet::MqttPacket;
use crate::protocol::ProtocolVersion;
use crate::QoS;
use bytes::BufMut;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// A packet the engine hands to the connection for writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPacket {
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
}

impl OutboundPacket {
    #[must_use]
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Publish(p) => p.packet_id,
            Self::PubAck(p) => Some(p.packet_id),
            Self::PubRec(p) => Some(p.packet_id),
            Self::PubRel(p) => Some(p.packet_id),
            Self::PubComp(p) => Some(p.packet_id),
        }
    }

    /// Encodes the complete packet for `version`
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded
    pub fn encode<B: BufMut>(&self, buf: &mut B, version: ProtocolVersion) -> Result<()> {
        match self {
            Self::Publish(p) => p.encode(buf, version),
            Self::PubAck(p) => p.encode(buf, version),
            Self::PubRec(p) => p.encode(buf, version),
            Self::PubRel(p) => p.encode(buf, version),
            Self::PubComp(p) => p.encode(buf, version),
        }
    }
}

/// Write side of a connection
pub trait PacketSink {
    /// Hands `packet` to the transport
    ///
    /// # Errors
    ///
    /// Returns an error when the connection can no longer be written to
    fn write(&mut self, packet: OutboundPacket) -> Result<()>;

    /// Whether the transport currently accepts writes without buffering
    fn is_writable(&self) -> bool {
        true
    }

    /// Writes handed over but not yet flushed
    fn pending_writes(&self) -> usize {
        0
    }
}

impl<T: PacketSink + ?Sized> PacketSink for &mut T {
    fn write(&mut self, packet: OutboundPacket) -> Result<()> {
        (**self).write(packet)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn pending_writes(&self) -> usize {
        (**self).pending_writes()
    }
}

/// Forwards packets to a writer task
impl PacketSink for mpsc::UnboundedSender<OutboundPacket> {
    fn write(&mut self, packet: OutboundPacket) -> Result<()> {
        self.send(packet).map_err(|_| MqttError::NotConnected)
    }
}

/// Result of [`OutboundWindow::submit`]
#[derive(Debug)]
pub struct Submission {
    pub handle: DeliveryHandle,
    /// The write was deferred because the window was full
    pub queued: bool,
}

#[derive(Debug)]
struct Queued {
    packet_id: u16,
    publish: PublishPacket,
    resolver: DeliveryResolver,
}

/// In-flight set and overflow queue of one connection
#[derive(Debug)]
pub struct OutboundWindow {
    capacity: usize,
    /// Resolvers by packet id; a DUP resend adds a second one
    in_flight: HashMap<u16, Vec<DeliveryResolver>>,
    queue: VecDeque<Queued>,
    closed: bool,
    not_writable_queue_size: usize,
    drop_qos0_when_not_writable: bool,
}

impl OutboundWindow {
    #[must_use]
    pub fn new(capacity: u16, config: &EngineConfig) -> Self {
        Self {
            capacity: usize::from(capacity.max(1)),
            in_flight: HashMap::new(),
            queue: VecDeque::new(),
            closed: false,
            not_writable_queue_size: config.not_writable_queue_size,
            drop_qos0_when_not_writable: config.drop_qos0_when_not_writable,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_in_flight(&self, packet_id: u16) -> bool {
        self.in_flight.contains_key(&packet_id)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Packet ids of the queued publishes, front first
    pub fn queued_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.queue.iter().map(|q| q.packet_id)
    }

    /// Writes `packet` now or queues it behind the full window
    ///
    /// QoS 0 publishes and acknowledgements bypass the window and resolve as
    /// soon as the write was handed over.
    pub fn submit<W: PacketSink + ?Sized>(&mut self, sink: &mut W, packet: OutboundPacket) -> Submission {
        let (resolver, handle) = delivery_channel();

        if self.closed {
            resolver.resolve(DeliveryStatus::NotConnected);
            return Submission {
                handle,
                queued: false,
            };
        }

        let queued = match packet {
            OutboundPacket::Publish(publish) if publish.qos != QoS::AtMostOnce => {
                self.submit_publish(sink, publish, resolver)
            }
            OutboundPacket::Publish(publish) => {
                self.submit_qos0(sink, publish, resolver);
                false
            }
            other => {
                let status = match sink.write(other) {
                    Ok(()) => DeliveryStatus::Delivered,
                    Err(_) => DeliveryStatus::Failed,
                };
                resolver.resolve(status);
                false
            }
        };

        Submission { handle, queued }
    }

    fn submit_qos0<W: PacketSink + ?Sized>(
        &mut self,
        sink: &mut W,
        publish: PublishPacket,
        resolver: DeliveryResolver,
    ) {
        if self.drop_qos0_when_not_writable
            && !sink.is_writable()
            && sink.pending_writes() > self.not_writable_queue_size
        {
            trace!(
                topic = %publish.topic_name,
                pending = sink.pending_writes(),
                "dropping QoS 0 publish, connection not writable"
            );
            resolver.resolve(DeliveryStatus::ChannelNotWritable);
            return;
        }

        let status = match sink.write(OutboundPacket::Publish(publish)) {
            Ok(()) => DeliveryStatus::Delivered,
            Err(_) => DeliveryStatus::Failed,
        };
        resolver.resolve(status);
    }

    fn submit_publish<W: PacketSink + ?Sized>(
        &mut self,
        sink: &mut W,
        publish: PublishPacket,
        resolver: DeliveryResolver,
    ) -> bool {
        let Some(packet_id) = publish.packet_id else {
            warn!(topic = %publish.topic_name, "QoS 1/2 publish without packet identifier");
            resolver.resolve(DeliveryStatus::Failed);
            return false;
        };

        // resends of an in-flight message skip the queue
        if publish.dup {
            if let Some(resolvers) = self.in_flight.get_mut(&packet_id) {
                resolvers.push(resolver);
                if let Err(e) = sink.write(OutboundPacket::Publish(publish)) {
                    self.fail_in_flight(packet_id, &e);
                    self.release_queued(sink);
                }
                return false;
            }
        }

        let has_slot = self.queue.is_empty()
            && self.in_flight.len() < self.capacity
            && !self.in_flight.contains_key(&packet_id);

        if !has_slot {
            trace!(
                packet_id,
                in_flight = self.in_flight.len(),
                queued = self.queue.len() + 1,
                "window full, queueing publish"
            );
            self.queue.push_back(Queued {
                packet_id,
                publish,
                resolver,
            });
            return true;
        }

        self.in_flight.insert(packet_id, vec![resolver]);
        if let Err(e) = sink.write(OutboundPacket::Publish(publish)) {
            self.fail_in_flight(packet_id, &e);
        }
        false
    }

    /// Ends the flow of `packet_id` and refills the window from the queue
    ///
    /// Returns whether `packet_id` was in flight.
    pub fn complete<W: PacketSink + ?Sized>(&mut self, sink: &mut W, packet_id: u16) -> bool {
        let found = match self.in_flight.remove(&packet_id) {
            Some(resolvers) => {
                for resolver in resolvers {
                    resolver.resolve(DeliveryStatus::Delivered);
                }
                true
            }
            None => {
                trace!(packet_id, "completion for a packet id not in flight");
                false
            }
        };

        self.release_queued(sink);
        found
    }

    /// Resolves every queued and in-flight message as not connected
    ///
    /// Returns how many handles were resolved. Later submits resolve
    /// immediately.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let mut resolved = 0;

        for queued in self.queue.drain(..) {
            queued.resolver.resolve(DeliveryStatus::NotConnected);
            resolved += 1;
        }
        for (_, resolvers) in self.in_flight.drain() {
            for resolver in resolvers {
                resolver.resolve(DeliveryStatus::NotConnected);
                resolved += 1;
            }
        }
        resolved
    }

    fn release_queued<W: PacketSink + ?Sized>(&mut self, sink: &mut W) {
        while !self.closed && self.in_flight.len() < self.capacity {
            let Some(front) = self.queue.front() else {
                break;
            };
            // the previous flow of this id must end first
            if self.in_flight.contains_key(&front.packet_id) {
                break;
            }
            let Some(queued) = self.queue.pop_front() else {
                break;
            };

            trace!(packet_id = queued.packet_id, "releasing queued publish");
            self.in_flight.insert(queued.packet_id, vec![queued.resolver]);
            if let Err(e) = sink.write(OutboundPacket::Publish(queued.publish)) {
                self.fail_in_flight(queued.packet_id, &e);
            }
        }
    }

    fn fail_in_flight(&mut self, packet_id: u16, error: &MqttError) {
        warn!(packet_id, error = %error, "writing publish failed");
        if let Some(resolvers) = self.in_flight.remove(&packet_id) {
            for resolver in resolvers {
                resolver.resolve(DeliveryStatus::Failed);
            }
        }
    }
}
