use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::delivery::buffer::{BufferEntry, MessageDeliveryInfo};
use crate::core::delivery::flusher::MessageFlusher;
use crate::core::delivery::DeliveryStrategy;
use crate::core::error::DeliveryError;
use crate::core::kernel::{MessageStore, SubscriptionDirectory};
use crate::core::message::DeliverableMessage;
use crate::core::subscriber::LocalSubscription;
use crate::metrics;

/// Topic fan-out paced by the slowest subscriber.
///
/// A message is scheduled only when every eligible subscriber has room; the
/// first message that cannot be scheduled ends the pass so later messages
/// never overtake it. A subscriber too slow for its peers should use a
/// durable subscription instead.
pub struct SlowestSubscriberStrategy {
    directory: Arc<dyn SubscriptionDirectory>,
    flusher: Arc<dyn MessageFlusher>,
    store: Arc<dyn MessageStore>,
}

impl SlowestSubscriberStrategy {
    pub fn new(
        directory: Arc<dyn SubscriptionDirectory>,
        flusher: Arc<dyn MessageFlusher>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            directory,
            flusher,
            store,
        }
    }

    /// Subscribers that should receive `message` through the fan-out path.
    ///
    /// Durable subscriptions get topic messages through their own queue, and
    /// a subscription only sees messages that arrived after it subscribed.
    fn eligible_subscribers(
        &self,
        info: &MessageDeliveryInfo,
        message: &DeliverableMessage,
    ) -> Vec<Arc<LocalSubscription>> {
        let mut subscribers = self.directory.active_local_subscribers(
            message.destination(),
            message.metadata().protocol,
            info.destination_type(),
        );
        subscribers.retain(|sub| {
            sub.is_active()
                && !sub.is_durable()
                && sub.subscribe_time() <= message.arrival_time()
                && sub.is_message_accepted_by_selector(message)
        });
        subscribers
    }
}

impl DeliveryStrategy for SlowestSubscriberStrategy {
    fn deliver(&self, info: &MessageDeliveryInfo) -> Result<usize, DeliveryError> {
        let Some(_pass) = info.try_begin_pass() else {
            debug!(
                target: "tidemq::delivery",
                destination = info.destination(),
                "delivery pass already running"
            );
            return Ok(0);
        };

        let buffer = info.read_but_undelivered_messages();
        let mut scheduled = 0usize;
        let mut dropped: Vec<Arc<DeliverableMessage>> = Vec::new();

        for entry in buffer.snapshot() {
            let message = match entry {
                BufferEntry::Present(message) => message,
                BufferEntry::Vanished(id) => {
                    // Removed concurrently; later entries are still eligible.
                    metrics::inc_vanished_entries(1);
                    warn!(
                        target: "tidemq::delivery",
                        destination = info.destination(),
                        message_id = %id,
                        "buffered message vanished during pass"
                    );
                    continue;
                }
            };

            let subscribers = self.eligible_subscribers(info, &message);

            if subscribers.is_empty() {
                buffer.remove(message.id());
                message.mark_as_dropped();
                dropped.push(message);
                continue;
            }

            if subscribers.iter().any(|sub| !sub.has_room_to_accept_messages()) {
                metrics::inc_backpressure_stalls(1);
                debug!(
                    target: "tidemq::delivery",
                    destination = info.destination(),
                    message_id = %message.id(),
                    "subscriber at max unacked messages; stopping pass"
                );
                break;
            }

            message.mark_as_scheduled_to_deliver(subscribers.iter().map(|sub| sub.channel_id()));
            for subscription in subscribers {
                subscription.reserve();
                self.flusher
                    .deliver_asynchronously(subscription, Arc::clone(&message));
            }
            buffer.remove(message.id());
            scheduled += 1;
            debug!(
                target: "tidemq::delivery",
                message_id = %message.id(),
                "removed scheduled message from buffer"
            );
        }

        if !dropped.is_empty() {
            self.store
                .delete_messages(&dropped)
                .map_err(DeliveryError::Store)?;
            for message in &dropped {
                message.mark_as_deleted();
            }
            metrics::inc_dropped_no_subscribers(dropped.len() as u64);
            debug!(
                target: "tidemq::delivery",
                destination = info.destination(),
                count = dropped.len(),
                "deleted messages without subscribers"
            );
        }

        metrics::inc_scheduled(scheduled as u64);
        Ok(scheduled)
    }
}
