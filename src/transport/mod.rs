//! Loopback transport layer: wire envelope, channel, and adapter.

pub(crate) mod adapter;
pub mod channel;
pub mod envelope;

pub use channel::TransportClient;
