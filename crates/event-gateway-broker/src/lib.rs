//! # Event Gateway Broker
//!
//! Artemis connectivity for the gateway core. The broker is spoken over
//! STOMP 1.2: a small frame codec on top of `tokio-util`, a connection
//! that negotiates heartbeats and client-individual acknowledgement, and
//! a listener fleet binding one durable-multicast (FQQN) or anycast
//! subscription per configured address.
//!
//! Broker loss never fails the process: listeners reconnect with
//! exponential backoff and resume their subscriptions.

pub mod connection;
pub mod fleet;
pub mod frame;
pub mod listener;
pub mod reconnect;

pub use connection::{InboundMessage, StompConnection};
pub use fleet::{FleetStatus, ListenerFleet, ListenerStatus};
pub use listener::MessageSink;
pub use reconnect::ReconnectSchedule;
