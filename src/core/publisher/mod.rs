//! Publisher channel registry.
//! Correlates protocol-level publisher ids with cluster ids and the
//! kernel flow-control channel registered for them.
#[allow(clippy::module_inception)]
pub mod publisher;

pub use publisher::{PublisherChannel, PublisherChannelRegistry};
