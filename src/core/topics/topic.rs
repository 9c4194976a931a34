use dashmap::DashMap;
use std::sync::Arc;

use crate::core::subscriber::{LocalSubscription, SubscriptionChannelId};

/// Alias for a topic name or topic filter.
pub type TopicName = String;

/// Subscriptions bound to one subscribed destination (a literal topic or a
/// filter such as `sensors/+/temp`).
#[derive(Debug)]
pub struct Topic {
    name: TopicName,

    /// Concurrent map of subscriber channel to its subscription.
    subscribers: DashMap<SubscriptionChannelId, Arc<LocalSubscription>>,
}

impl Topic {
    /// Creates a new topic with a name.
    pub fn new(name: impl Into<TopicName>) -> Self {
        Self {
            name: name.into(),
            subscribers: DashMap::new(),
        }
    }

    /// Returns the topic's name.
    pub fn name(&self) -> &TopicName {
        &self.name
    }

    /// Binds a subscription, returning the one it replaced on the same channel.
    pub fn subscribe(&self, subscription: Arc<LocalSubscription>) -> Option<Arc<LocalSubscription>> {
        self.subscribers
            .insert(subscription.channel_id(), subscription)
    }

    pub fn contains(&self, channel_id: &SubscriptionChannelId) -> bool {
        self.subscribers.contains_key(channel_id)
    }

    /// Removes a subscription by channel.
    pub fn unsubscribe(&self, channel_id: &SubscriptionChannelId) -> Option<Arc<LocalSubscription>> {
        self.subscribers.remove(channel_id).map(|(_, sub)| sub)
    }

    /// Snapshot of the subscriptions whose active flag is still set.
    pub fn active_subscribers(&self) -> Vec<Arc<LocalSubscription>> {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().is_active())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Check if a topic matches a topic filter (which may contain wildcards).
///
/// `+` matches exactly one level, `#` matches the remaining levels.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut ti = 0;
    let mut fi = 0;

    while fi < filter_levels.len() {
        let filter_level = filter_levels[fi];

        if filter_level == "#" {
            return true;
        }

        if ti >= topic_levels.len() {
            return false;
        }

        if filter_level == "+" || filter_level == topic_levels[ti] {
            ti += 1;
            fi += 1;
        } else {
            return false;
        }
    }

    ti == topic_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_wildcard_filters() {
        assert!(topic_matches_filter("orders", "orders"));
        assert!(!topic_matches_filter("orders", "orders/eu"));
        assert!(topic_matches_filter("sensors/a/temp", "sensors/+/temp"));
        assert!(!topic_matches_filter("sensors/a/b/temp", "sensors/+/temp"));
        assert!(topic_matches_filter("sensors/a/b/temp", "sensors/#"));
        assert!(topic_matches_filter("sensors", "sensors/#"));
        assert!(!topic_matches_filter("actuators/a", "sensors/#"));
    }
}
