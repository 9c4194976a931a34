use thiserror::Error;

use crate::core::subscriber::SubscriptionChannelId;

/// Failures reported by the kernel, the message store or the transport.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("subscription to '{destination}' on channel {channel_id} already exists")]
    SubscriptionAlreadyExists {
        destination: String,
        channel_id: SubscriptionChannelId,
    },
    #[error("queue '{0}' not found")]
    QueueNotFound(String),
    #[error("message store error: {0}")]
    Store(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Protocol-facing errors surfaced by the subscription lifecycle bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("subscription to '{destination}' on channel {channel_id} already exists")]
    SubscriptionAlreadyExists {
        destination: String,
        channel_id: SubscriptionChannelId,
    },
    #[error("{context}: {source}")]
    Protocol {
        context: &'static str,
        #[source]
        source: KernelError,
    },
}

impl BridgeError {
    /// Wraps a kernel failure, keeping duplicate registrations distinguishable.
    pub fn from_kernel(context: &'static str, err: KernelError) -> Self {
        match err {
            KernelError::SubscriptionAlreadyExists {
                destination,
                channel_id,
            } => BridgeError::SubscriptionAlreadyExists {
                destination,
                channel_id,
            },
            other => BridgeError::Protocol {
                context,
                source: other,
            },
        }
    }
}

/// Errors raised by a delivery pass.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to delete dropped messages: {0}")]
    Store(#[source] KernelError),
}
