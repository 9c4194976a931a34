pub mod delivery;
pub mod error;
pub mod kernel;
pub mod message;
pub mod publisher;
pub mod qos;
pub mod retained;
pub mod subscriber;
pub mod topics;
