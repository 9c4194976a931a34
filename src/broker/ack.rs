use std::sync::Arc;

use tracing::{debug, error};

use crate::core::error::BridgeError;
use crate::core::kernel::Kernel;
use crate::core::message::{MessageId, MessageMetadata};
use crate::core::qos::AckData;
use crate::core::retained::RetainedAckTracker;
use crate::core::subscriber::SubscriptionChannelId;
use crate::metrics;

/// Routes subscriber acknowledgments.
///
/// Acks for retained replays end here; everything else goes to the kernel.
/// Retained replays never take a flow-control slot, and the kernel releases
/// the slot of a live message when it handles the ack or nack.
pub struct AckRouter {
    kernel: Arc<dyn Kernel>,
    tracker: Arc<RetainedAckTracker>,
}

impl AckRouter {
    pub fn new(kernel: Arc<dyn Kernel>, tracker: Arc<RetainedAckTracker>) -> Self {
        Self { kernel, tracker }
    }

    pub fn on_ack(&self, message_id: MessageId, channel_id: SubscriptionChannelId) -> Result<(), BridgeError> {
        if self.tracker.take(message_id, channel_id) {
            metrics::inc_retained_acks_suppressed(1);
            debug!(
                target: "tidemq::bridge",
                message_id = %message_id,
                channel_id = %channel_id,
                "retained message acknowledged"
            );
            return Ok(());
        }

        self.kernel
            .ack_received(AckData::new(channel_id, message_id))
            .map_err(|e| {
                error!(
                    target: "tidemq::bridge",
                    message_id = %message_id,
                    channel_id = %channel_id,
                    error = %e,
                    "kernel rejected ack"
                );
                BridgeError::from_kernel("processing message ack", e)
            })
    }

    /// Nacks always reach the kernel; retained replays are not nack-tracked.
    pub fn on_nack(&self, metadata: &MessageMetadata, channel_id: SubscriptionChannelId) -> Result<(), BridgeError> {
        self.kernel
            .message_rejected(metadata, channel_id)
            .map_err(|e| {
                error!(
                    target: "tidemq::bridge",
                    message_id = %metadata.message_id,
                    channel_id = %channel_id,
                    error = %e,
                    "kernel rejected nack"
                );
                BridgeError::from_kernel("processing message rejection", e)
            })
    }
}
