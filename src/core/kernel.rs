//! Interfaces to the collaborators that sit around the delivery core.
//!
//! The kernel owns queues, subscriptions and the ack accounting; the message
//! store owns message content and retained messages; the transport reaches
//! the subscriber. None of them is implemented here.

use std::fmt::Debug;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::core::error::KernelError;
use crate::core::message::{
    DeliverableMessage, DestinationType, Message, MessageId, MessageMetadata, ProtocolType,
};
use crate::core::qos::{AckData, QosLevel};
use crate::core::subscriber::{LocalSubscription, Subscription, SubscriptionChannelId};

/// Message content with a read position. Readers start from `position()`.
pub type ContentBuffer = Cursor<Bytes>;

/// One point-to-point send to a subscriber.
#[derive(Debug, Clone)]
pub struct OutboundDelivery {
    pub topic: String,
    pub payload: ContentBuffer,
    pub message_id: MessageId,
    /// QoS the message was published with.
    pub qos: QosLevel,
    pub retain: bool,
    /// Protocol-level subscription (client) identifier.
    pub subscription_id: String,
    /// QoS the subscriber asked for.
    pub qos_requested: QosLevel,
    pub channel_id: SubscriptionChannelId,
    pub metadata: MessageMetadata,
}

/// Transport side: pushes a delivery onto a subscriber's connection.
pub trait TopicDistributor: Send + Sync + Debug {
    fn distribute_to_subscriber(&self, delivery: OutboundDelivery) -> Result<(), KernelError>;
}

/// Queue lifecycle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub name: String,
    pub owner: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub protocol: ProtocolType,
    pub destination_type: DestinationType,
}

/// Broker-level flow-control handle registered for a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowChannel {
    pub id: Uuid,
    /// Remote address of the publisher, or the configured default.
    pub identifier: String,
    pub destination: String,
}

/// Called by the kernel once a published message is persisted or refused.
pub trait PubAckHandler: Send + Sync {
    fn ack(&self, metadata: &MessageMetadata);
    fn nack(&self, metadata: &MessageMetadata);
}

pub trait Kernel: Send + Sync {
    fn create_queue(&self, event: &QueueEvent) -> Result<(), KernelError>;

    /// Deleting a queue also removes every subscription bound to it.
    fn delete_queue(&self, event: &QueueEvent) -> Result<(), KernelError>;

    fn client_connection_created(&self, channel_id: SubscriptionChannelId) -> Result<(), KernelError>;

    fn client_connection_closed(&self, channel_id: SubscriptionChannelId) -> Result<(), KernelError>;

    /// The kernel keeps `subscription` and owns its flow-control slots from
    /// here on; see [`Kernel::ack_received`].
    fn open_subscription(&self, subscription: Arc<LocalSubscription>) -> Result<(), KernelError>;

    fn close_subscription(&self, subscription: &Subscription) -> Result<(), KernelError>;

    fn create_channel(
        &self,
        identifier: &str,
        cluster_id: Uuid,
        destination: &str,
    ) -> Result<FlowChannel, KernelError>;

    /// Receive path; the kernel allocates the message id.
    fn message_received(
        &self,
        message: Message,
        channel: &FlowChannel,
        ack_handler: Arc<dyn PubAckHandler>,
    ) -> Result<(), KernelError>;

    /// Live ack from a subscriber. The kernel releases the slot reserved
    /// when the message was scheduled by calling [`LocalSubscription::on_ack`]
    /// on the subscription it opened for `ack.channel_id`; the bridge never
    /// does. Idle delivery workers pick up destinations stalled on that
    /// subscription once the slot is free.
    fn ack_received(&self, ack: AckData) -> Result<(), KernelError>;

    /// Like [`Kernel::ack_received`], the kernel releases the slot, through
    /// [`LocalSubscription::on_reject`].
    fn message_rejected(
        &self,
        metadata: &MessageMetadata,
        channel_id: SubscriptionChannelId,
    ) -> Result<(), KernelError>;
}

pub trait MessageStore: Send + Sync {
    /// Blocking batch deletion.
    fn delete_messages(&self, messages: &[Arc<DeliverableMessage>]) -> Result<(), KernelError>;

    /// Retained metadata for every literal topic matching `topic`.
    fn retained_metadata_by_topic(&self, topic: &str) -> Result<Vec<MessageMetadata>, KernelError>;

    fn retained_message_content(&self, metadata: &MessageMetadata) -> Result<ContentBuffer, KernelError>;
}

/// Read-mostly view of the active local subscriptions.
pub trait SubscriptionDirectory: Send + Sync {
    /// Point-in-time snapshot of the active subscriptions bound to the
    /// literal `destination`, one entry per subscriber channel.
    fn active_local_subscribers(
        &self,
        destination: &str,
        protocol: ProtocolType,
        destination_type: DestinationType,
    ) -> Vec<Arc<LocalSubscription>>;
}
