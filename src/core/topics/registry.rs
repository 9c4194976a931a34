use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::kernel::SubscriptionDirectory;
use crate::core::message::{DestinationType, ProtocolType};
use crate::core::subscriber::{LocalSubscription, SubscriptionChannelId};
use crate::core::topics::topic::{topic_matches_filter, Topic, TopicName};

/// [`SubscriptionRegistry`] is a thread-safe directory of the local
/// subscriptions of one protocol, grouped by subscribed destination.
///
/// Uses DashMap internally so lookups from delivery workers do not contend
/// with subscribe/unsubscribe traffic on other destinations.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    protocol: ProtocolType,
    topics: DashMap<TopicName, Arc<Topic>>,
}

impl SubscriptionRegistry {
    pub fn new(protocol: ProtocolType) -> Self {
        Self {
            protocol,
            topics: DashMap::new(),
        }
    }

    /// Returns an existing topic or creates a new one if it doesn't exist.
    pub fn create_or_get_topic(&self, name: &str) -> Arc<Topic> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(target: "tidemq::directory", topic = name, "creating topic entry");
                Arc::new(Topic::new(name))
            })
            .clone()
    }

    pub fn get_topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).map(|entry| Arc::clone(&*entry))
    }

    pub fn add(&self, subscription: Arc<LocalSubscription>) -> Option<Arc<LocalSubscription>> {
        self.create_or_get_topic(subscription.destination())
            .subscribe(subscription)
    }

    /// Removes the subscription of `channel_id` on `destination` and marks it
    /// inactive so in-flight passes skip it.
    pub fn remove(
        &self,
        destination: &str,
        channel_id: &SubscriptionChannelId,
    ) -> Option<Arc<LocalSubscription>> {
        let topic = self.get_topic(destination)?;
        let removed = topic.unsubscribe(channel_id);
        if let Some(sub) = &removed {
            sub.deactivate();
        }
        if topic.is_empty() {
            self.topics.remove_if(destination, |_, t| t.is_empty());
        }
        removed
    }

    /// Looks up a subscription without removing it.
    pub fn find(
        &self,
        destination: &str,
        channel_id: &SubscriptionChannelId,
    ) -> Option<Arc<LocalSubscription>> {
        let topic = self.get_topic(destination)?;
        topic
            .active_subscribers()
            .into_iter()
            .find(|sub| sub.channel_id() == *channel_id)
    }

    /// Finds any subscription of `channel_id`, across destinations.
    pub fn find_by_channel(&self, channel_id: &SubscriptionChannelId) -> Vec<Arc<LocalSubscription>> {
        self.topics
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .active_subscribers()
                    .into_iter()
                    .find(|sub| sub.channel_id() == *channel_id)
            })
            .collect()
    }

    /// Lists all subscribed destinations currently registered.
    pub fn list_topics(&self) -> Vec<TopicName> {
        self.topics
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl SubscriptionDirectory for SubscriptionRegistry {
    fn active_local_subscribers(
        &self,
        destination: &str,
        protocol: ProtocolType,
        destination_type: DestinationType,
    ) -> Vec<Arc<LocalSubscription>> {
        if protocol != self.protocol {
            return Vec::new();
        }

        let wants_queue = destination_type == DestinationType::Queue;
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for entry in self.topics.iter() {
            if !topic_matches_filter(destination, entry.key()) {
                continue;
            }
            for sub in entry.value().active_subscribers() {
                let is_queue = sub.record().destination_type == DestinationType::Queue;
                if is_queue != wants_queue {
                    continue;
                }
                if seen.insert(sub.channel_id()) {
                    result.push(sub);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::KernelError;
    use crate::core::kernel::{OutboundDelivery, TopicDistributor};
    use crate::core::qos::QosLevel;
    use crate::core::subscriber::{Subscription, TOPIC_EXCHANGE_NAME};

    #[derive(Debug)]
    struct Discard;

    impl TopicDistributor for Discard {
        fn distribute_to_subscriber(&self, _delivery: OutboundDelivery) -> Result<(), KernelError> {
            Ok(())
        }
    }

    fn subscription(destination: &str, channel_id: SubscriptionChannelId) -> Arc<LocalSubscription> {
        Arc::new(LocalSubscription::new(
            Subscription {
                destination: destination.into(),
                channel_id,
                client_id: "c".into(),
                durable: false,
                clean_session: true,
                qos: QosLevel::AtMostOnce,
                subscribe_time: 0,
                active: true,
                node_id: "node-1".into(),
                target_queue: destination.into(),
                target_queue_owner: String::new(),
                bound_exchange: TOPIC_EXCHANGE_NAME,
                auto_delete: true,
                destination_type: DestinationType::Topic,
                has_external_subscriptions: true,
                selector: None,
            },
            10,
            Arc::new(Discard),
        ))
    }

    #[test]
    fn wildcard_and_literal_bindings_are_deduplicated_per_channel() {
        let registry = SubscriptionRegistry::new(ProtocolType::Mqtt);
        let shared = SubscriptionChannelId::new();
        registry.add(subscription("sensors/a", shared));
        registry.add(subscription("sensors/+", shared));
        registry.add(subscription("sensors/#", SubscriptionChannelId::new()));
        registry.add(subscription("other", SubscriptionChannelId::new()));

        let subs =
            registry.active_local_subscribers("sensors/a", ProtocolType::Mqtt, DestinationType::Topic);
        assert_eq!(subs.len(), 2);
        assert!(registry
            .active_local_subscribers("sensors/a", ProtocolType::Amqp, DestinationType::Topic)
            .is_empty());
    }

    #[test]
    fn removal_deactivates_and_drops_empty_topics() {
        let registry = SubscriptionRegistry::new(ProtocolType::Mqtt);
        let channel = SubscriptionChannelId::new();
        registry.add(subscription("orders", channel));
        assert!(registry.find("orders", &channel).is_some());

        let removed = registry.remove("orders", &channel).unwrap();
        assert!(!removed.is_active());
        assert!(registry.list_topics().is_empty());
        assert!(registry.find_by_channel(&channel).is_empty());
    }
}
