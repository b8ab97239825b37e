//! # Event Gateway Ingest
//!
//! The persistence and egress half of the gateway core: the raw event
//! store keyed by message id, the stream publisher that forwards every
//! ingested event to its mapped stream on the bus, the per-message
//! pipeline driven by the broker listeners, and the replay controller
//! that re-emits persisted events.

pub mod pipeline;
pub mod publisher;
pub mod replay;
pub mod schema;
pub mod store;

pub use pipeline::GatewayPipeline;
pub use publisher::StreamPublisher;
pub use replay::ReplayController;
pub use store::{EventFilter, RawEventRecord, RawEventStore, UpsertOutcome};
