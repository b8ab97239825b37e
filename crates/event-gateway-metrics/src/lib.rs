//! # Event Gateway Metrics
//!
//! The query-metrics core: a polling follower of a growing SQL
//! execution log with rotation detection and a durable read offset, a
//! parser that fingerprints normalized queries, and an aggregator that
//! keeps a bounded sample window per fingerprint in the key/value
//! store, recomputes percentile metrics on every write, and answers
//! ranking queries.

pub mod aggregator;
pub mod parser;
pub mod position;
pub mod tailer;
pub mod types;

pub use aggregator::{ExecutionSink, QueryAggregator, QueryOverview};
pub use parser::{ParsedExecution, QueryLogParser};
pub use position::{PositionStore, RedisPositionStore};
pub use tailer::{LogTailer, TailerStatus};
pub use types::{ExecutionPoint, QueryMetric};
