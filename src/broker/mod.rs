//! # Broker Module
//!
//! Bridges protocol-level subscriber and publisher events into the delivery
//! core.
//!
//! - `connector`: publish/subscribe/unsubscribe/disconnect handling against
//!   the kernel, including retained-message replay for new subscribers.
//! - `ack`: routes subscriber acks and nacks either to the retained-ack
//!   tracker or to the kernel's live ack path.

pub mod ack;
pub mod connector;

pub use self::ack::AckRouter;
pub use self::connector::{PersistenceConnector, PublishContext, SubscribeEvent, UnsubscribeEvent};
