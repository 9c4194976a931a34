//! Topic module containing the in-memory subscription directory and topic
//! filter matching.

pub mod registry;
pub mod topic;

pub use registry::SubscriptionRegistry;
pub use topic::{topic_matches_filter, Topic, TopicName};
