//! # Event Gateway Streams
//!
//! The consumer half of the platform: a generic orchestrator that binds
//! declared stream processors to consumer groups on the bus, drives
//! at-least-once consumption with acknowledge-on-success, and a
//! processor template that deduplicates on application-level message
//! ids, honors explicit resends, enriches from the unit reference data,
//! and persists typed ingestion rows transactionally.

pub mod dedup;
pub mod enrichment;
pub mod orchestrator;
pub mod parsing;
pub mod processors;
pub mod schema;
pub mod template;

pub use enrichment::{CachedUnitLookup, UnitEnrichment, UnitLookup};
pub use orchestrator::{StreamOrchestrator, StreamProcessor};
pub use template::{ProcessorTemplate, RecordProcessor};
