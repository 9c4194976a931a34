use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::qos::QosLevel;
use crate::core::subscriber::SubscriptionChannelId;

/// Broker-assigned message identifier, unique per cluster.
///
/// `MessageId::UNASSIGNED` is used on the publish path; the kernel allocates
/// the real id when the message is received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    pub const UNASSIGNED: MessageId = MessageId(0);

    pub fn new(value: u64) -> Self {
        MessageId(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    Mqtt,
    Amqp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationType {
    Queue,
    Topic,
    DurableTopic,
}

/// Protocol properties attached on the publish path, used for publisher acks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub client_id: Option<String>,
    pub protocol_message_id: Option<u16>,
    pub qos: Option<QosLevel>,
}

/// Delivery metadata of a message. Cloned freely; content lives beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub message_id: MessageId,
    pub destination: String,
    /// Milliseconds since the Unix epoch.
    pub arrival_time: u64,
    pub retain: bool,
    pub qos: QosLevel,
    pub content_length: usize,
    pub protocol: ProtocolType,
    pub properties: MessageProperties,
}

/// A message as submitted to the kernel's receive path.
#[derive(Debug, Clone)]
pub struct Message {
    pub metadata: MessageMetadata,
    pub content: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Buffered,
    ScheduledToDeliver,
    Acknowledged,
    Rejected,
    Dropped,
    Deleted,
}

#[derive(Debug)]
struct DeliveryRecord {
    state: DeliveryState,
    scheduled_to: Vec<SubscriptionChannelId>,
}

/// A buffered message awaiting a delivery decision.
///
/// Metadata and content are immutable; the delivery record moves forward
/// only. Once scheduled a message never returns to `Buffered`.
#[derive(Debug)]
pub struct DeliverableMessage {
    metadata: MessageMetadata,
    content: Bytes,
    record: Mutex<DeliveryRecord>,
}

impl DeliverableMessage {
    pub fn new(metadata: MessageMetadata, content: Bytes) -> Self {
        Self {
            metadata,
            content,
            record: Mutex::new(DeliveryRecord {
                state: DeliveryState::Buffered,
                scheduled_to: Vec::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> MessageId {
        self.metadata.message_id
    }

    #[inline]
    pub fn destination(&self) -> &str {
        &self.metadata.destination
    }

    #[inline]
    pub fn arrival_time(&self) -> u64 {
        self.metadata.arrival_time
    }

    #[inline]
    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    #[inline]
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn state(&self) -> DeliveryState {
        self.record.lock().state
    }

    /// Channels the message was scheduled to, empty unless scheduled.
    pub fn scheduled_channels(&self) -> Vec<SubscriptionChannelId> {
        self.record.lock().scheduled_to.clone()
    }

    /// Fixes the subscriber set and moves `Buffered → ScheduledToDeliver`.
    pub fn mark_as_scheduled_to_deliver<I>(&self, channels: I) -> bool
    where
        I: IntoIterator<Item = SubscriptionChannelId>,
    {
        let mut record = self.record.lock();
        if record.state != DeliveryState::Buffered {
            return false;
        }
        record.state = DeliveryState::ScheduledToDeliver;
        record.scheduled_to = channels.into_iter().collect();
        true
    }

    pub fn mark_as_dropped(&self) -> bool {
        self.transition(&[DeliveryState::Buffered], DeliveryState::Dropped)
    }

    pub fn mark_as_acknowledged(&self) -> bool {
        self.transition(&[DeliveryState::ScheduledToDeliver], DeliveryState::Acknowledged)
    }

    pub fn mark_as_rejected(&self) -> bool {
        self.transition(&[DeliveryState::ScheduledToDeliver], DeliveryState::Rejected)
    }

    pub fn mark_as_deleted(&self) -> bool {
        self.transition(
            &[
                DeliveryState::Dropped,
                DeliveryState::Acknowledged,
                DeliveryState::Rejected,
            ],
            DeliveryState::Deleted,
        )
    }

    fn transition(&self, from: &[DeliveryState], to: DeliveryState) -> bool {
        let mut record = self.record.lock();
        if from.contains(&record.state) {
            record.state = to;
            true
        } else {
            false
        }
    }
}

pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
