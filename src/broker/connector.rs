//! Subscription lifecycle bridge.
//!
//! Converts protocol events into kernel operations: queue create/delete for
//! durable subscriptions, subscription open/close, client connection
//! notifications and message submission for publishers. Acks come back
//! through the [`AckRouter`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::broker::ack::AckRouter;
use crate::config::Config;
use crate::core::error::{BridgeError, KernelError};
use crate::core::kernel::{Kernel, MessageStore, PubAckHandler, QueueEvent, TopicDistributor};
use crate::core::message::{
    current_timestamp, DestinationType, Message, MessageId, MessageMetadata, MessageProperties,
    ProtocolType,
};
use crate::core::publisher::PublisherChannelRegistry;
use crate::core::qos::QosLevel;
use crate::core::retained::{RetainedAckTracker, RetainedReplayer};
use crate::core::subscriber::{
    is_durable, queue_name_for, LocalSubscription, MessageSelector, Subscription,
    SubscriptionChannelId, DIRECT_EXCHANGE_NAME, TOPIC_EXCHANGE_NAME,
};

/// A message published by a client.
pub struct PublishContext {
    pub publisher_id: String,
    pub topic: String,
    pub qos: QosLevel,
    pub retain: bool,
    /// Protocol-local packet id, echoed back in the publisher ack.
    pub protocol_message_id: u16,
    /// Remote address of the publisher's transport, if it has one.
    pub remote_addr: Option<SocketAddr>,
    pub pub_ack_handler: Arc<dyn PubAckHandler>,
}

/// A client subscribing to a destination.
pub struct SubscribeEvent {
    pub topic: String,
    pub client_id: String,
    pub username: String,
    pub clean_session: bool,
    pub qos: QosLevel,
    pub channel_id: SubscriptionChannelId,
    /// Transport the subscriber is reached through.
    pub distributor: Arc<dyn TopicDistributor>,
    pub selector: Option<Arc<dyn MessageSelector>>,
}

/// A client leaving a destination, by unsubscribe or lost connection.
#[derive(Debug, Clone)]
pub struct UnsubscribeEvent {
    pub topic: String,
    pub client_id: String,
    pub username: String,
    pub clean_session: bool,
    pub qos: QosLevel,
    pub channel_id: SubscriptionChannelId,
}

pub struct PersistenceConnector {
    kernel: Arc<dyn Kernel>,
    publishers: PublisherChannelRegistry,
    tracker: Arc<RetainedAckTracker>,
    retained: RetainedReplayer,
    acks: AckRouter,
    node_id: String,
    max_unacked: usize,
}

impl PersistenceConnector {
    pub fn new(kernel: Arc<dyn Kernel>, store: Arc<dyn MessageStore>, config: &Config) -> Self {
        let tracker = Arc::new(RetainedAckTracker::new(
            config.retained.max_tracked_acks_per_subscription,
        ));
        Self {
            publishers: PublisherChannelRegistry::new(
                Arc::clone(&kernel),
                config.publisher.default_channel_identifier.clone(),
            ),
            retained: RetainedReplayer::new(store, Arc::clone(&tracker)),
            acks: AckRouter::new(Arc::clone(&kernel), Arc::clone(&tracker)),
            tracker,
            kernel,
            node_id: config.node.node_id.clone(),
            max_unacked: config.delivery.max_unacked_per_subscription,
        }
    }

    pub fn publishers(&self) -> &PublisherChannelRegistry {
        &self.publishers
    }

    pub fn retained_tracker(&self) -> &Arc<RetainedAckTracker> {
        &self.tracker
    }

    /// Submits a published message to the kernel.
    ///
    /// The payload must be one contiguous buffer; anything else is refused
    /// before any state is touched.
    pub fn on_publish<B: Buf>(&self, ctx: PublishContext, mut payload: B) -> Result<(), BridgeError> {
        if payload.chunk().len() != payload.remaining() {
            return Err(BridgeError::InvalidPayload(
                "message content is not backed by a single contiguous buffer".to_string(),
            ));
        }
        let content = payload.copy_to_bytes(payload.remaining());

        let publisher = self
            .publishers
            .get_or_create(&ctx.publisher_id, ctx.remote_addr, &ctx.topic)
            .map_err(|e| log_and_wrap("registering publisher channel", e))?;

        let metadata = MessageMetadata {
            message_id: MessageId::UNASSIGNED,
            destination: ctx.topic,
            arrival_time: current_timestamp(),
            retain: ctx.retain,
            qos: ctx.qos,
            content_length: content.len(),
            protocol: ProtocolType::Mqtt,
            properties: MessageProperties {
                client_id: Some(ctx.publisher_id),
                protocol_message_id: Some(ctx.protocol_message_id),
                qos: Some(ctx.qos),
            },
        };

        self.kernel
            .message_received(
                Message { metadata, content },
                publisher.flow_channel(),
                ctx.pub_ack_handler,
            )
            .map_err(|e| log_and_wrap("submitting published message", e))?;

        debug!(
            target: "tidemq::bridge",
            protocol_message_id = ctx.protocol_message_id,
            "message added"
        );
        Ok(())
    }

    /// Registers a subscription.
    ///
    /// Durable subscriptions get their queue before anything else so that no
    /// message is routed to a missing queue. Retained messages are replayed
    /// before the subscription is opened for live delivery.
    ///
    /// If the replay or the open fails, the connection registered for this
    /// subscribe is closed again. A durable queue stays in place for the
    /// session to re-attach, and retained messages already sent stay tracked
    /// until the channel unsubscribes or disconnects. A duplicate leaves the
    /// existing subscription and its connection untouched.
    pub fn on_subscribe(&self, event: SubscribeEvent) -> Result<(), BridgeError> {
        let durable = is_durable(event.clean_session, event.qos);

        if durable {
            let queue = QueueEvent {
                name: queue_name_for(&event.client_id, &event.topic),
                owner: event.username.clone(),
                durable: true,
                auto_delete: false,
                protocol: ProtocolType::Mqtt,
                destination_type: DestinationType::Topic,
            };
            self.kernel
                .create_queue(&queue)
                .map_err(|e| log_and_wrap("creating durable subscription queue", e))?;
        }

        self.kernel
            .client_connection_created(event.channel_id)
            .map_err(|e| log_and_wrap("registering client connection", e))?;

        let channel_id = event.channel_id;
        self.attach_subscription(event, durable).inspect_err(|e| {
            if !matches!(e, BridgeError::SubscriptionAlreadyExists { .. }) {
                self.abandon_connection(channel_id);
            }
        })
    }

    fn attach_subscription(&self, event: SubscribeEvent, durable: bool) -> Result<(), BridgeError> {
        self.retained.send_retained_messages(
            &event.topic,
            &event.client_id,
            event.qos,
            event.channel_id,
            event.distributor.as_ref(),
        )?;

        let mut record = self.subscription_record(
            &event.topic,
            &event.client_id,
            event.channel_id,
            event.qos,
            event.clean_session,
            true,
        );
        record.selector = event.selector;

        let subscription = Arc::new(LocalSubscription::new(
            record,
            self.max_unacked,
            event.distributor,
        ));
        self.kernel
            .open_subscription(subscription)
            .map_err(|e| log_and_wrap("opening subscription", e))?;

        debug!(
            target: "tidemq::bridge",
            topic = %event.topic,
            client_id = %event.client_id,
            durable,
            "subscription registered"
        );
        Ok(())
    }

    fn abandon_connection(&self, channel_id: SubscriptionChannelId) {
        if let Err(e) = self.kernel.client_connection_closed(channel_id) {
            warn!(
                target: "tidemq::bridge",
                channel_id = %channel_id,
                error = %e,
                "failed to close connection of a failed subscribe"
            );
        }
    }

    /// Explicit unsubscribe. A durable subscription's queue is deleted and
    /// the kernel removes the subscriptions bound to it; a non-durable one is
    /// closed.
    pub fn on_unsubscribe(&self, event: UnsubscribeEvent) -> Result<(), BridgeError> {
        if is_durable(event.clean_session, event.qos) {
            let queue = QueueEvent {
                name: queue_name_for(&event.client_id, &event.topic),
                owner: event.username.clone(),
                durable: true,
                auto_delete: false,
                protocol: ProtocolType::Mqtt,
                destination_type: DestinationType::DurableTopic,
            };
            self.kernel
                .delete_queue(&queue)
                .map_err(|e| log_and_wrap("deleting durable subscription queue", e))?;
        } else {
            self.close_subscription(&event)?;
        }

        self.release_retained_entries(event.channel_id);
        debug!(
            target: "tidemq::bridge",
            topic = %event.topic,
            client_id = %event.client_id,
            "subscriber removed"
        );
        Ok(())
    }

    /// Lost connection. The subscription is closed either way; a durable
    /// queue stays in place for the client to re-attach to.
    pub fn on_disconnect(&self, event: UnsubscribeEvent) -> Result<(), BridgeError> {
        self.close_subscription(&event)?;
        self.release_retained_entries(event.channel_id);
        debug!(
            target: "tidemq::bridge",
            topic = %event.topic,
            client_id = %event.client_id,
            "subscriber disconnected"
        );
        Ok(())
    }

    pub fn on_ack(&self, message_id: MessageId, channel_id: SubscriptionChannelId) -> Result<(), BridgeError> {
        self.acks.on_ack(message_id, channel_id)
    }

    pub fn on_nack(&self, metadata: &MessageMetadata, channel_id: SubscriptionChannelId) -> Result<(), BridgeError> {
        self.acks.on_nack(metadata, channel_id)
    }

    /// Replays retained messages for `topic` to one subscriber. Called by
    /// [`on_subscribe`](Self::on_subscribe); exposed for re-attaching
    /// sessions.
    pub fn send_retained_messages(
        &self,
        topic: &str,
        subscription_id: &str,
        qos: QosLevel,
        channel_id: SubscriptionChannelId,
        distributor: &dyn TopicDistributor,
    ) -> Result<usize, BridgeError> {
        self.retained
            .send_retained_messages(topic, subscription_id, qos, channel_id, distributor)
    }

    /// Forgets a publisher, returning its cluster id for cleanup.
    pub fn remove_publisher(&self, publisher_id: &str) -> Option<Uuid> {
        self.publishers.remove(publisher_id)
    }

    fn close_subscription(&self, event: &UnsubscribeEvent) -> Result<(), BridgeError> {
        let mut record = self.subscription_record(
            &event.topic,
            &event.client_id,
            event.channel_id,
            event.qos,
            event.clean_session,
            false,
        );
        record.has_external_subscriptions = false;

        self.kernel
            .close_subscription(&record)
            .map_err(|e| log_and_wrap("closing subscription", e))?;
        self.kernel
            .client_connection_closed(event.channel_id)
            .map_err(|e| log_and_wrap("closing client connection", e))?;
        Ok(())
    }

    fn release_retained_entries(&self, channel_id: SubscriptionChannelId) {
        let purged = self.tracker.purge_channel(channel_id);
        if purged > 0 {
            debug!(
                target: "tidemq::bridge",
                channel_id = %channel_id,
                purged,
                "dropped unacknowledged retained entries"
            );
        }
    }

    fn subscription_record(
        &self,
        topic: &str,
        client_id: &str,
        channel_id: SubscriptionChannelId,
        qos: QosLevel,
        clean_session: bool,
        active: bool,
    ) -> Subscription {
        let durable = is_durable(clean_session, qos);
        let (target_queue, bound_exchange, destination_type) = if durable {
            (
                queue_name_for(client_id, topic),
                DIRECT_EXCHANGE_NAME,
                DestinationType::DurableTopic,
            )
        } else {
            (topic.to_string(), TOPIC_EXCHANGE_NAME, DestinationType::Topic)
        };

        Subscription {
            destination: topic.to_string(),
            channel_id,
            client_id: client_id.to_string(),
            durable,
            clean_session,
            qos,
            subscribe_time: current_timestamp(),
            active,
            node_id: self.node_id.clone(),
            target_queue,
            target_queue_owner: String::new(),
            bound_exchange,
            auto_delete: !durable,
            destination_type,
            has_external_subscriptions: true,
            selector: None,
        }
    }
}

fn log_and_wrap(context: &'static str, err: KernelError) -> BridgeError {
    error!(target: "tidemq::bridge", error = %err, "{context}");
    BridgeError::from_kernel(context, err)
}
