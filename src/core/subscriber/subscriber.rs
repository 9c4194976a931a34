use std::fmt;
use std::io::Cursor;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::KernelError;
use crate::core::kernel::{OutboundDelivery, TopicDistributor};
use crate::core::message::{DeliverableMessage, DestinationType, MessageMetadata};
use crate::core::qos::QosLevel;

pub const DIRECT_EXCHANGE_NAME: &str = "amq.direct";
pub const TOPIC_EXCHANGE_NAME: &str = "amq.topic";

/// Unique identifier of one subscriber channel, stable for a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionChannelId(pub Uuid);

impl SubscriptionChannelId {
    pub fn new() -> Self {
        SubscriptionChannelId(Uuid::new_v4())
    }
}

impl Default for SubscriptionChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for SubscriptionChannelId {
    fn from(id: Uuid) -> Self {
        SubscriptionChannelId(id)
    }
}

impl Deref for SubscriptionChannelId {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Content filter evaluated against a message before it is fanned out.
pub trait MessageSelector: Send + Sync + fmt::Debug {
    fn accepts(&self, metadata: &MessageMetadata) -> bool;
}

/// A subscription is durable only when the client asked for a persistent
/// session *and* at-least-once or better delivery.
#[inline]
pub fn is_durable(clean_session: bool, qos: QosLevel) -> bool {
    !clean_session && qos > QosLevel::AtMostOnce
}

/// Name of the queue backing a durable subscription.
pub fn queue_name_for(client_id: &str, topic: &str) -> String {
    format!("{client_id}:{topic}")
}

/// Subscription record exchanged with the kernel on open/close.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscribed destination, possibly a topic filter.
    pub destination: String,
    pub channel_id: SubscriptionChannelId,
    /// Protocol-level identity of the owning client.
    pub client_id: String,
    pub durable: bool,
    pub clean_session: bool,
    pub qos: QosLevel,
    /// Milliseconds since the Unix epoch.
    pub subscribe_time: u64,
    pub active: bool,
    pub node_id: String,
    /// Durable queue name when durable, the topic otherwise.
    pub target_queue: String,
    pub target_queue_owner: String,
    pub bound_exchange: &'static str,
    pub auto_delete: bool,
    pub destination_type: DestinationType,
    pub has_external_subscriptions: bool,
    pub selector: Option<Arc<dyn MessageSelector>>,
}

/// A subscription attached to this node, with its flow-control state and
/// the transport used to reach the subscriber.
#[derive(Debug)]
pub struct LocalSubscription {
    record: Subscription,
    active: AtomicBool,
    unacked: AtomicUsize,
    max_unacked: usize,
    outbound: Arc<dyn TopicDistributor>,
}

impl LocalSubscription {
    pub fn new(record: Subscription, max_unacked: usize, outbound: Arc<dyn TopicDistributor>) -> Self {
        let active = record.active;
        Self {
            record,
            active: AtomicBool::new(active),
            unacked: AtomicUsize::new(0),
            max_unacked,
            outbound,
        }
    }

    #[inline]
    pub fn record(&self) -> &Subscription {
        &self.record
    }

    #[inline]
    pub fn channel_id(&self) -> SubscriptionChannelId {
        self.record.channel_id
    }

    #[inline]
    pub fn destination(&self) -> &str {
        &self.record.destination
    }

    #[inline]
    pub fn is_durable(&self) -> bool {
        self.record.durable
    }

    #[inline]
    pub fn subscribe_time(&self) -> u64 {
        self.record.subscribe_time
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_message_accepted_by_selector(&self, message: &DeliverableMessage) -> bool {
        match &self.record.selector {
            Some(selector) => selector.accepts(message.metadata()),
            None => true,
        }
    }

    /// Backpressure predicate: room exists while unacked deliveries stay
    /// below the configured bound.
    #[inline]
    pub fn has_room_to_accept_messages(&self) -> bool {
        self.unacked.load(Ordering::Acquire) < self.max_unacked
    }

    #[inline]
    pub fn unacked_count(&self) -> usize {
        self.unacked.load(Ordering::Acquire)
    }

    /// Counts one scheduled delivery as unacked until `on_ack` or
    /// `on_reject` releases it. Taken when the delivery is scheduled, not
    /// when the transport gets to it.
    pub fn reserve(&self) {
        self.unacked.fetch_add(1, Ordering::AcqRel);
    }

    /// Hands one copy of `message` to the transport. A failed send releases
    /// the slot taken by `reserve`.
    pub fn send(&self, message: &DeliverableMessage) -> Result<(), KernelError> {
        let metadata = message.metadata();
        let delivery = OutboundDelivery {
            topic: metadata.destination.clone(),
            payload: Cursor::new(message.content()),
            message_id: metadata.message_id,
            qos: metadata.qos,
            retain: metadata.retain,
            subscription_id: self.record.client_id.clone(),
            qos_requested: self.record.qos,
            channel_id: self.record.channel_id,
            metadata: metadata.clone(),
        };
        let result = self.outbound.distribute_to_subscriber(delivery);
        if result.is_err() {
            self.release();
        }
        result
    }

    /// Called by the kernel for every live ack on this subscription.
    pub fn on_ack(&self) {
        self.release();
    }

    pub fn on_reject(&self) {
        self.release();
    }

    fn release(&self) {
        let _ = self
            .unacked
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
