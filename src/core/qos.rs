//! Quality of Service levels and subscriber acknowledgments.
//!
//! - QoS 0: at most once
//! - QoS 1: at least once
//! - QoS 2: exactly-once intent

use serde::{Deserialize, Serialize};

use crate::core::message::MessageId;
use crate::core::subscriber::SubscriptionChannelId;

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QosLevel {
    /// At most once - fire and forget
    AtMostOnce = 0,
    /// At least once - acknowledged delivery
    AtLeastOnce = 1,
    /// Exactly once intent
    ExactlyOnce = 2,
}

impl QosLevel {
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl From<u8> for QosLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => QosLevel::AtMostOnce,
            1 => QosLevel::AtLeastOnce,
            2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce, // Default to most basic
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        qos as u8
    }
}

/// A subscriber acknowledgment handed to the kernel's live ack path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckData {
    pub channel_id: SubscriptionChannelId,
    pub message_id: MessageId,
}

impl AckData {
    pub fn new(channel_id: SubscriptionChannelId, message_id: MessageId) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}
