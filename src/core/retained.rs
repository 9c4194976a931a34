//! Retained-message replay and the ack tracking that goes with it.
//!
//! A retained message replayed to a new subscriber is not part of the
//! kernel's live ack accounting, so its ack is swallowed here. Entries are
//! keyed per subscription channel and purged when the subscription goes
//! away. A replay stops once its channel holds the configured number of
//! unacknowledged entries, so every retained message sent stays tracked.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, warn};

use crate::core::error::BridgeError;
use crate::core::kernel::{MessageStore, OutboundDelivery, TopicDistributor};
use crate::core::message::MessageId;
use crate::core::qos::QosLevel;
use crate::core::subscriber::SubscriptionChannelId;
use crate::metrics;

#[derive(Debug)]
pub struct RetainedAckTracker {
    pending: DashMap<SubscriptionChannelId, BTreeSet<MessageId>>,
    max_per_subscription: usize,
}

impl RetainedAckTracker {
    pub fn new(max_per_subscription: usize) -> Self {
        Self {
            pending: DashMap::new(),
            max_per_subscription: max_per_subscription.max(1),
        }
    }

    /// Records that a retained message is being sent on `channel_id`.
    /// Returns `false`, tracking nothing, when the channel is already at
    /// the cap.
    pub fn track(&self, message_id: MessageId, channel_id: SubscriptionChannelId) -> bool {
        let mut ids = self.pending.entry(channel_id).or_default();
        if ids.contains(&message_id) {
            return true;
        }
        if ids.len() >= self.max_per_subscription {
            return false;
        }
        ids.insert(message_id)
    }

    /// Removes the entry if present. Each entry is taken at most once.
    pub fn take(&self, message_id: MessageId, channel_id: SubscriptionChannelId) -> bool {
        let removed = match self.pending.get_mut(&channel_id) {
            Some(mut ids) => ids.remove(&message_id),
            None => return false,
        };
        if removed {
            self.pending.remove_if(&channel_id, |_, ids| ids.is_empty());
        }
        removed
    }

    pub fn contains(&self, message_id: MessageId, channel_id: SubscriptionChannelId) -> bool {
        self.pending
            .get(&channel_id)
            .map(|ids| ids.contains(&message_id))
            .unwrap_or(false)
    }

    /// Drops every entry of a subscription channel, returning how many.
    pub fn purge_channel(&self, channel_id: SubscriptionChannelId) -> usize {
        self.pending
            .remove(&channel_id)
            .map(|(_, ids)| ids.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Replays retained messages point-to-point to one new subscriber.
pub struct RetainedReplayer {
    store: Arc<dyn MessageStore>,
    tracker: Arc<RetainedAckTracker>,
}

impl RetainedReplayer {
    pub fn new(store: Arc<dyn MessageStore>, tracker: Arc<RetainedAckTracker>) -> Self {
        Self { store, tracker }
    }

    /// Sends every retained message matching `topic` to the subscriber on
    /// `channel_id` and returns how many were sent.
    ///
    /// Store failures are logged and end the replay without failing the
    /// subscription; a transport failure is returned to the caller.
    pub fn send_retained_messages(
        &self,
        topic: &str,
        subscription_id: &str,
        qos: QosLevel,
        channel_id: SubscriptionChannelId,
        distributor: &dyn TopicDistributor,
    ) -> Result<usize, BridgeError> {
        let metadata_list = match self.store.retained_metadata_by_topic(topic) {
            Ok(list) => list,
            Err(e) => {
                error!(
                    target: "tidemq::retained",
                    topic,
                    error = %e,
                    "failed to fetch retained metadata"
                );
                return Ok(0);
            }
        };

        let mut sent = 0usize;
        for mut metadata in metadata_list {
            let mut content = match self.store.retained_message_content(&metadata) {
                Ok(content) => content,
                Err(e) => {
                    error!(
                        target: "tidemq::retained",
                        topic,
                        message_id = %metadata.message_id,
                        error = %e,
                        "failed to fetch retained content"
                    );
                    break;
                }
            };

            // Readers start at the cursor position, not wherever the store left it.
            content.set_position(0);
            metadata.retain = true;

            let message_id = metadata.message_id;
            // Tracked before the send so an early ack is still swallowed.
            if !self.tracker.track(message_id, channel_id) {
                metrics::inc_retained_replay_truncated(1);
                warn!(
                    target: "tidemq::retained",
                    topic,
                    channel_id = %channel_id,
                    message_id = %message_id,
                    sent,
                    "too many unacknowledged retained messages; replay stopped"
                );
                break;
            }

            let delivery = OutboundDelivery {
                topic: metadata.destination.clone(),
                payload: content,
                message_id,
                qos: metadata.qos,
                retain: metadata.retain,
                subscription_id: subscription_id.to_string(),
                qos_requested: qos,
                channel_id,
                metadata,
            };
            if let Err(e) = distributor.distribute_to_subscriber(delivery) {
                self.tracker.take(message_id, channel_id);
                error!(
                    target: "tidemq::retained",
                    topic,
                    message_id = %message_id,
                    error = %e,
                    "failed to send retained message to new subscription"
                );
                return Err(BridgeError::from_kernel(
                    "sending retained messages to new subscription",
                    e,
                ));
            }
            sent += 1;
        }

        if sent > 0 {
            metrics::inc_retained_replayed(sent as u64);
            debug!(
                target: "tidemq::retained",
                topic,
                channel_id = %channel_id,
                count = sent,
                "replayed retained messages"
            );
        }
        Ok(sent)
    }
}
