use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::core::message::{DeliverableMessage, DestinationType, MessageId, ProtocolType};

/// Ordered buffer of read-but-undelivered messages of one destination.
///
/// Producers, expiry and delivery passes mutate it concurrently. Iteration
/// works on a snapshot of the ids taken when the pass starts; an id whose
/// entry is gone by the time the pass reaches it is reported as
/// [`BufferEntry::Vanished`].
#[derive(Debug, Default)]
pub struct DestinationBuffer {
    entries: RwLock<BTreeMap<MessageId, Arc<DeliverableMessage>>>,
}

/// One step of a buffer snapshot.
#[derive(Debug)]
pub enum BufferEntry {
    Present(Arc<DeliverableMessage>),
    Vanished(MessageId),
}

impl DestinationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a message in id (arrival) order.
    pub fn push(&self, message: Arc<DeliverableMessage>) {
        self.entries.write().insert(message.id(), message);
    }

    pub fn get(&self, id: MessageId) -> Option<Arc<DeliverableMessage>> {
        self.entries.read().get(&id).cloned()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn remove(&self, id: MessageId) -> Option<Arc<DeliverableMessage>> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Ids currently buffered, in order.
    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.read().keys().copied().collect()
    }

    /// Weakly consistent traversal: ids are fixed at call time, entries are
    /// resolved lazily as the iterator advances.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            buffer: self,
            ids: self.ids().into_iter(),
        }
    }
}

pub struct Snapshot<'a> {
    buffer: &'a DestinationBuffer,
    ids: std::vec::IntoIter<MessageId>,
}

impl Iterator for Snapshot<'_> {
    type Item = BufferEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(match self.buffer.get(id) {
            Some(message) => BufferEntry::Present(message),
            None => BufferEntry::Vanished(id),
        })
    }
}

/// Everything a delivery pass needs for one destination.
#[derive(Debug)]
pub struct MessageDeliveryInfo {
    destination: String,
    destination_type: DestinationType,
    protocol: ProtocolType,
    buffer: DestinationBuffer,
    pass: Mutex<()>,
    pending: AtomicBool,
}

impl MessageDeliveryInfo {
    pub fn new(
        destination: impl Into<String>,
        destination_type: DestinationType,
        protocol: ProtocolType,
    ) -> Self {
        Self {
            destination: destination.into(),
            destination_type,
            protocol,
            buffer: DestinationBuffer::new(),
            pass: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[inline]
    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    #[inline]
    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }

    #[inline]
    pub fn read_but_undelivered_messages(&self) -> &DestinationBuffer {
        &self.buffer
    }

    /// At most one pass per destination; `None` while another pass runs.
    ///
    /// A refused attempt leaves a pending request behind, which the running
    /// pass observes through [`has_pending_pass`](Self::has_pending_pass)
    /// once it finishes.
    pub fn try_begin_pass(&self) -> Option<MutexGuard<'_, ()>> {
        self.pending.store(true, Ordering::SeqCst);
        let guard = self.pass.try_lock()?;
        self.pending.store(false, Ordering::SeqCst);
        Some(guard)
    }

    pub fn has_pending_pass(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_pass_running(&self) -> bool {
        self.pass.is_locked()
    }
}
