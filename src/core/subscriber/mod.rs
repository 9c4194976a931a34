//! Subscription records and per-subscriber flow control.
//!
//! Provides the `Subscription` record handed to the kernel, the
//! `LocalSubscription` used by the delivery engine, and the unique
//! `SubscriptionChannelId` correlating deliveries with acks.

#[allow(clippy::module_inception)]
pub mod subscriber;

pub use subscriber::{
    is_durable, queue_name_for, LocalSubscription, MessageSelector, Subscription,
    SubscriptionChannelId, DIRECT_EXCHANGE_NAME, TOPIC_EXCHANGE_NAME,
};
