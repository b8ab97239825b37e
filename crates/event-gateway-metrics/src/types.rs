// File: src/types.rs
//
// Value types of the query-metrics core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPoint {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
    pub row_count: i64,
    pub method: String,
}

/// Aggregated view of one query fingerprint, recomputed from the
/// current sample window on every write. Percentiles are stored
/// truncated to whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetric {
    pub query_hash: String,
    pub query_pattern: String,
    pub execution_count: u64,
    pub avg_ms: f64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub p50: i64,
    pub p95: i64,
    pub p99: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
