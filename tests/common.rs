#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use tidemq::core::delivery::MessageFlusher;
use tidemq::core::error::KernelError;
use tidemq::core::kernel::{
    ContentBuffer, FlowChannel, Kernel, MessageStore, OutboundDelivery, PubAckHandler, QueueEvent,
    TopicDistributor,
};
use tidemq::core::message::{
    DeliverableMessage, DestinationType, Message, MessageId, MessageMetadata, MessageProperties,
    ProtocolType,
};
use tidemq::core::qos::{AckData, QosLevel};
use tidemq::core::subscriber::{
    LocalSubscription, MessageSelector, Subscription, SubscriptionChannelId, TOPIC_EXCHANGE_NAME,
};
use tidemq::core::topics::SubscriptionRegistry;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tidemq::logging::init_logging();
    });
}

// ───────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingDistributor {
    pub deliveries: Mutex<Vec<OutboundDelivery>>,
    pub fail: AtomicBool,
}

impl RecordingDistributor {
    pub fn failing() -> Self {
        let d = Self::default();
        d.fail.store(true, Ordering::SeqCst);
        d
    }

    pub fn message_ids(&self) -> Vec<u64> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| d.message_id.value())
            .collect()
    }
}

impl TopicDistributor for RecordingDistributor {
    fn distribute_to_subscriber(&self, delivery: OutboundDelivery) -> Result<(), KernelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KernelError::Transport("connection reset".into()));
        }
        self.deliveries.lock().push(delivery);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────
// Flusher
// ───────────────────────────────────────────────────────────

/// Records what was scheduled without sending it.
#[derive(Default)]
pub struct RecordingFlusher {
    pub scheduled: Mutex<Vec<(SubscriptionChannelId, u64)>>,
}

impl RecordingFlusher {
    pub fn ids_for(&self, channel: SubscriptionChannelId) -> Vec<u64> {
        self.scheduled
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, id)| *id)
            .collect()
    }
}

impl MessageFlusher for RecordingFlusher {
    fn deliver_asynchronously(&self, subscription: Arc<LocalSubscription>, message: Arc<DeliverableMessage>) {
        self.scheduled
            .lock()
            .push((subscription.channel_id(), message.id().value()));
    }
}

// ───────────────────────────────────────────────────────────
// Message store
// ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub retained: Mutex<Vec<(MessageMetadata, Bytes)>>,
    pub deleted_batches: Mutex<Vec<Vec<u64>>>,
    pub fail_delete: AtomicBool,
    pub fail_metadata: AtomicBool,
    /// Content lookups for this message id fail.
    pub broken_content: Mutex<Option<MessageId>>,
    /// Position the store leaves content cursors at.
    pub dirty_position: Mutex<u64>,
}

impl MemoryStore {
    pub fn retain(&self, id: u64, topic: &str, qos: QosLevel, payload: &'static [u8]) {
        let mut meta = metadata(id, topic, 0);
        meta.qos = qos;
        meta.retain = false;
        meta.content_length = payload.len();
        self.retained.lock().push((meta, Bytes::from_static(payload)));
    }

    pub fn deleted_ids(&self) -> Vec<u64> {
        self.deleted_batches.lock().iter().flatten().copied().collect()
    }
}

impl MessageStore for MemoryStore {
    fn delete_messages(&self, messages: &[Arc<DeliverableMessage>]) -> Result<(), KernelError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(KernelError::Store("disk full".into()));
        }
        self.deleted_batches
            .lock()
            .push(messages.iter().map(|m| m.id().value()).collect());
        Ok(())
    }

    fn retained_metadata_by_topic(&self, topic: &str) -> Result<Vec<MessageMetadata>, KernelError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(KernelError::Store("retained index unavailable".into()));
        }
        Ok(self
            .retained
            .lock()
            .iter()
            .filter(|(meta, _)| tidemq::core::topics::topic_matches_filter(&meta.destination, topic))
            .map(|(meta, _)| meta.clone())
            .collect())
    }

    fn retained_message_content(&self, metadata: &MessageMetadata) -> Result<ContentBuffer, KernelError> {
        if *self.broken_content.lock() == Some(metadata.message_id) {
            return Err(KernelError::Store("content missing".into()));
        }
        let retained = self.retained.lock();
        let (_, content) = retained
            .iter()
            .find(|(meta, _)| meta.message_id == metadata.message_id)
            .ok_or_else(|| KernelError::Store("content missing".into()))?;
        let mut cursor = Cursor::new(content.clone());
        cursor.set_position(*self.dirty_position.lock());
        Ok(cursor)
    }
}

// ───────────────────────────────────────────────────────────
// Kernel
// ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum KernelCall {
    CreateQueue(QueueEvent),
    DeleteQueue(QueueEvent),
    ConnectionCreated(SubscriptionChannelId),
    ConnectionClosed(SubscriptionChannelId),
    OpenSubscription(Subscription),
    CloseSubscription(Subscription),
    CreateChannel { identifier: String, destination: String },
    MessageReceived(Message),
    Ack(AckData),
    Rejected(MessageId, SubscriptionChannelId),
}

/// Kernel double that records every call and keeps opened subscriptions in a
/// [`SubscriptionRegistry`].
pub struct RecordingKernel {
    pub calls: Mutex<Vec<KernelCall>>,
    pub registry: SubscriptionRegistry,
    pub reject_duplicates: AtomicBool,
    pub fail_create_queue: AtomicBool,
    pub fail_message_received: AtomicBool,
}

impl Default for RecordingKernel {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            registry: SubscriptionRegistry::new(ProtocolType::Mqtt),
            reject_duplicates: AtomicBool::new(true),
            fail_create_queue: AtomicBool::new(false),
            fail_message_received: AtomicBool::new(false),
        }
    }
}

impl RecordingKernel {
    pub fn calls(&self) -> Vec<KernelCall> {
        self.calls.lock().clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .iter()
            .map(|call| match call {
                KernelCall::CreateQueue(_) => "create_queue",
                KernelCall::DeleteQueue(_) => "delete_queue",
                KernelCall::ConnectionCreated(_) => "client_connection_created",
                KernelCall::ConnectionClosed(_) => "client_connection_closed",
                KernelCall::OpenSubscription(_) => "open_subscription",
                KernelCall::CloseSubscription(_) => "close_subscription",
                KernelCall::CreateChannel { .. } => "create_channel",
                KernelCall::MessageReceived(_) => "message_received",
                KernelCall::Ack(_) => "ack_received",
                KernelCall::Rejected(..) => "message_rejected",
            })
            .collect()
    }

    fn record(&self, call: KernelCall) {
        self.calls.lock().push(call);
    }

    fn release_slot(&self, channel_id: SubscriptionChannelId, release: fn(&LocalSubscription)) {
        if let Some(sub) = self
            .registry
            .find_by_channel(&channel_id)
            .into_iter()
            .find(|sub| sub.unacked_count() > 0)
        {
            release(&sub);
        }
    }
}

impl Kernel for RecordingKernel {
    fn create_queue(&self, event: &QueueEvent) -> Result<(), KernelError> {
        if self.fail_create_queue.load(Ordering::SeqCst) {
            return Err(KernelError::Internal("queue creation refused".into()));
        }
        self.record(KernelCall::CreateQueue(event.clone()));
        Ok(())
    }

    fn delete_queue(&self, event: &QueueEvent) -> Result<(), KernelError> {
        self.record(KernelCall::DeleteQueue(event.clone()));
        Ok(())
    }

    fn client_connection_created(&self, channel_id: SubscriptionChannelId) -> Result<(), KernelError> {
        self.record(KernelCall::ConnectionCreated(channel_id));
        Ok(())
    }

    fn client_connection_closed(&self, channel_id: SubscriptionChannelId) -> Result<(), KernelError> {
        self.record(KernelCall::ConnectionClosed(channel_id));
        Ok(())
    }

    fn open_subscription(&self, subscription: Arc<LocalSubscription>) -> Result<(), KernelError> {
        let channel_id = subscription.channel_id();
        let destination = subscription.destination().to_string();
        if self.reject_duplicates.load(Ordering::SeqCst)
            && self.registry.find(&destination, &channel_id).is_some()
        {
            return Err(KernelError::SubscriptionAlreadyExists {
                destination,
                channel_id,
            });
        }
        self.record(KernelCall::OpenSubscription(subscription.record().clone()));
        self.registry.add(subscription);
        Ok(())
    }

    fn close_subscription(&self, subscription: &Subscription) -> Result<(), KernelError> {
        self.record(KernelCall::CloseSubscription(subscription.clone()));
        self.registry
            .remove(&subscription.destination, &subscription.channel_id);
        Ok(())
    }

    fn create_channel(
        &self,
        identifier: &str,
        cluster_id: Uuid,
        destination: &str,
    ) -> Result<FlowChannel, KernelError> {
        self.record(KernelCall::CreateChannel {
            identifier: identifier.to_string(),
            destination: destination.to_string(),
        });
        Ok(FlowChannel {
            id: cluster_id,
            identifier: identifier.to_string(),
            destination: destination.to_string(),
        })
    }

    fn message_received(
        &self,
        message: Message,
        _channel: &FlowChannel,
        ack_handler: Arc<dyn PubAckHandler>,
    ) -> Result<(), KernelError> {
        if self.fail_message_received.load(Ordering::SeqCst) {
            ack_handler.nack(&message.metadata);
            return Err(KernelError::Store("journal unavailable".into()));
        }
        ack_handler.ack(&message.metadata);
        self.record(KernelCall::MessageReceived(message));
        Ok(())
    }

    fn ack_received(&self, ack: AckData) -> Result<(), KernelError> {
        self.release_slot(ack.channel_id, LocalSubscription::on_ack);
        self.record(KernelCall::Ack(ack));
        Ok(())
    }

    fn message_rejected(
        &self,
        metadata: &MessageMetadata,
        channel_id: SubscriptionChannelId,
    ) -> Result<(), KernelError> {
        self.release_slot(channel_id, LocalSubscription::on_reject);
        self.record(KernelCall::Rejected(metadata.message_id, channel_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPubAcks {
    pub acked: Mutex<Vec<Option<u16>>>,
    pub nacked: Mutex<Vec<Option<u16>>>,
}

impl PubAckHandler for RecordingPubAcks {
    fn ack(&self, metadata: &MessageMetadata) {
        self.acked.lock().push(metadata.properties.protocol_message_id);
    }

    fn nack(&self, metadata: &MessageMetadata) {
        self.nacked.lock().push(metadata.properties.protocol_message_id);
    }
}

// ───────────────────────────────────────────────────────────
// Builders
// ───────────────────────────────────────────────────────────

pub fn metadata(id: u64, topic: &str, arrival_time: u64) -> MessageMetadata {
    MessageMetadata {
        message_id: MessageId::new(id),
        destination: topic.to_string(),
        arrival_time,
        retain: false,
        qos: QosLevel::AtLeastOnce,
        content_length: 4,
        protocol: ProtocolType::Mqtt,
        properties: MessageProperties::default(),
    }
}

pub fn message(id: u64, topic: &str, arrival_time: u64) -> Arc<DeliverableMessage> {
    Arc::new(DeliverableMessage::new(
        metadata(id, topic, arrival_time),
        Bytes::from_static(b"data"),
    ))
}

pub struct SubscriptionBuilder {
    record: Subscription,
    max_unacked: usize,
}

impl SubscriptionBuilder {
    pub fn new(destination: &str) -> Self {
        Self {
            record: Subscription {
                destination: destination.to_string(),
                channel_id: SubscriptionChannelId::new(),
                client_id: "client".into(),
                durable: false,
                clean_session: true,
                qos: QosLevel::AtLeastOnce,
                subscribe_time: 0,
                active: true,
                node_id: "node-1".into(),
                target_queue: destination.to_string(),
                target_queue_owner: String::new(),
                bound_exchange: TOPIC_EXCHANGE_NAME,
                auto_delete: true,
                destination_type: DestinationType::Topic,
                has_external_subscriptions: true,
                selector: None,
            },
            max_unacked: 100,
        }
    }

    pub fn subscribed_at(mut self, time: u64) -> Self {
        self.record.subscribe_time = time;
        self
    }

    pub fn max_unacked(mut self, max: usize) -> Self {
        self.max_unacked = max;
        self
    }

    pub fn durable(mut self) -> Self {
        self.record.durable = true;
        self.record.clean_session = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.record.active = false;
        self
    }

    pub fn selector(mut self, selector: Arc<dyn MessageSelector>) -> Self {
        self.record.selector = Some(selector);
        self
    }

    pub fn build(self, outbound: Arc<dyn TopicDistributor>) -> Arc<LocalSubscription> {
        Arc::new(LocalSubscription::new(self.record, self.max_unacked, outbound))
    }
}
