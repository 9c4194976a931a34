use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::core::message::DeliverableMessage;
use crate::core::subscriber::LocalSubscription;

/// Fire-and-forget hand-off of one message copy to one subscriber.
///
/// Implementations must not block on the transport: the outcome of the send
/// comes back later as an ack or nack on the subscriber channel.
pub trait MessageFlusher: Send + Sync {
    fn deliver_asynchronously(&self, subscription: Arc<LocalSubscription>, message: Arc<DeliverableMessage>);
}

type FlushJob = (Arc<LocalSubscription>, Arc<DeliverableMessage>);

/// Flusher backed by a background tokio task draining a flume channel.
#[derive(Debug)]
pub struct AsyncFlusher {
    jobs: flume::Sender<FlushJob>,
}

impl AsyncFlusher {
    /// Spawns the send task on the current tokio runtime. The task exits once
    /// the flusher is dropped and the queue is drained.
    pub fn spawn() -> (Arc<Self>, JoinHandle<()>) {
        let (jobs, rx) = flume::unbounded::<FlushJob>();

        let handle = tokio::spawn(async move {
            while let Ok((subscription, message)) = rx.recv_async().await {
                match subscription.send(&message) {
                    Ok(()) => {
                        trace!(
                            target: "tidemq::delivery",
                            message_id = %message.id(),
                            channel_id = %subscription.channel_id(),
                            "message handed to transport"
                        );
                    }
                    Err(e) => {
                        crate::metrics::inc_send_failures(1);
                        warn!(
                            target: "tidemq::delivery",
                            message_id = %message.id(),
                            channel_id = %subscription.channel_id(),
                            error = %e,
                            "transport refused scheduled message"
                        );
                    }
                }
            }
        });

        (Arc::new(Self { jobs }), handle)
    }

    /// Number of sends queued but not yet handed to the transport.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }
}

impl MessageFlusher for AsyncFlusher {
    fn deliver_asynchronously(&self, subscription: Arc<LocalSubscription>, message: Arc<DeliverableMessage>) {
        if let Err(flume::SendError((subscription, message))) = self.jobs.send((subscription, message)) {
            subscription.on_reject();
            warn!(
                target: "tidemq::delivery",
                message_id = %message.id(),
                "flusher stopped; scheduled message not sent"
            );
        }
    }
}
