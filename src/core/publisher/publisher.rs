use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::KernelError;
use crate::core::kernel::{FlowChannel, Kernel};

/// Flow-controlled channel of one connected publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherChannel {
    publisher_id: String,
    cluster_id: Uuid,
    flow: FlowChannel,
}

impl PublisherChannel {
    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    pub fn flow_channel(&self) -> &FlowChannel {
        &self.flow
    }
}

/// Registry of publisher channels, keyed by protocol-level publisher id.
///
/// Channels are created lazily on the first message of a publisher and live
/// until [`remove`](Self::remove) is called on disconnect.
pub struct PublisherChannelRegistry {
    kernel: Arc<dyn Kernel>,
    default_identifier: String,
    publishers: DashMap<String, Arc<PublisherChannel>>,
}

impl PublisherChannelRegistry {
    pub fn new(kernel: Arc<dyn Kernel>, default_identifier: impl Into<String>) -> Self {
        Self {
            kernel,
            default_identifier: default_identifier.into(),
            publishers: DashMap::new(),
        }
    }

    pub fn get(&self, publisher_id: &str) -> Option<Arc<PublisherChannel>> {
        self.publishers.get(publisher_id).map(|entry| Arc::clone(&*entry))
    }

    /// Returns the publisher's channel, registering a new flow channel with
    /// the kernel the first time `publisher_id` is seen.
    pub fn get_or_create(
        &self,
        publisher_id: &str,
        remote_addr: Option<SocketAddr>,
        destination: &str,
    ) -> Result<Arc<PublisherChannel>, KernelError> {
        if let Some(existing) = self.get(publisher_id) {
            return Ok(existing);
        }

        match self.publishers.entry(publisher_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let identifier = remote_addr
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| self.default_identifier.clone());
                let cluster_id = Uuid::new_v4();
                let flow = self
                    .kernel
                    .create_channel(&identifier, cluster_id, destination)?;

                let channel = Arc::new(PublisherChannel {
                    publisher_id: publisher_id.to_string(),
                    cluster_id,
                    flow,
                });
                entry.insert(Arc::clone(&channel));

                crate::metrics::inc_publishers_registered(1);
                debug!(
                    target: "tidemq::publisher",
                    publisher_id,
                    cluster_id = %cluster_id,
                    identifier = %identifier,
                    "registered publisher channel"
                );
                Ok(channel)
            }
        }
    }

    /// Forgets a publisher and returns its cluster id for cleanup, or `None`
    /// if it was never registered.
    pub fn remove(&self, publisher_id: &str) -> Option<Uuid> {
        self.publishers
            .remove(publisher_id)
            .map(|(_, channel)| channel.cluster_id)
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}
