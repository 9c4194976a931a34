//! Topic message delivery.
//!
//! A [`DeliveryStrategy`] consumes the buffered messages of one destination
//! and schedules them onto subscribers. The strategy is chosen from
//! configuration through [`DeliveryStrategyKind`].

pub mod buffer;
pub mod flusher;
pub mod slowest;
pub mod worker;

pub use buffer::{BufferEntry, DestinationBuffer, MessageDeliveryInfo};
pub use flusher::{AsyncFlusher, MessageFlusher};
pub use slowest::SlowestSubscriberStrategy;
pub use worker::DeliveryWorkerPool;

use std::sync::Arc;

use serde::Deserialize;

use crate::core::error::DeliveryError;
use crate::core::kernel::{MessageStore, SubscriptionDirectory};

pub trait DeliveryStrategy: Send + Sync {
    /// Runs one pass over `info`'s buffer and returns how many messages were
    /// scheduled.
    fn deliver(&self, info: &MessageDeliveryInfo) -> Result<usize, DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategyKind {
    #[default]
    SlowestSubscriber,
}

pub fn build_strategy(
    kind: DeliveryStrategyKind,
    directory: Arc<dyn SubscriptionDirectory>,
    flusher: Arc<dyn MessageFlusher>,
    store: Arc<dyn MessageStore>,
) -> Arc<dyn DeliveryStrategy> {
    match kind {
        DeliveryStrategyKind::SlowestSubscriber => {
            Arc::new(SlowestSubscriberStrategy::new(directory, flusher, store))
        }
    }
}
