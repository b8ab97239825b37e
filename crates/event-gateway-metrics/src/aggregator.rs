// File: src/aggregator.rs
//
// Per-fingerprint sample windows, percentile metrics, and rankings

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;

use event_gateway_core::error::GatewayResult;

use crate::types::{ExecutionPoint, QueryMetric};

/// Membership set of all known fingerprints.
const INDEX_KEY: &str = "q:index";

/// Samples returned by a detail query.
const DETAIL_SAMPLES: isize = 100;

fn samples_key(hash: &str) -> String {
    format!("q:{}:samples", hash)
}

fn metric_key(hash: &str) -> String {
    format!("q:{}:metric", hash)
}

/// Receiver of parsed executions; the tailer forwards through this
/// seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn record(&self, query_hash: &str, query_pattern: &str, point: ExecutionPoint) -> GatewayResult<()>;
}

/// Aggregated totals across every tracked fingerprint.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryOverview {
    pub total_tracked: usize,
    pub total_executions: u64,
    /// Weighted by execution count across fingerprints.
    pub avg_duration_ms: f64,
    pub slowest_p95: i64,
    pub slowest_hash: Option<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Keeps a bounded, newest-first sample window per fingerprint in the
/// key/value store and recomputes the full metric from that window on
/// every write. All keys carry a sliding TTL.
pub struct QueryAggregator {
    redis: ConnectionManager,
    ttl: Duration,
    max_samples: usize,
}

impl QueryAggregator {
    pub fn new(redis: ConnectionManager, ttl: Duration, max_samples: usize) -> Self {
        Self {
            redis,
            ttl,
            max_samples: max_samples.max(1),
        }
    }

    /// All metrics currently tracked, in no particular order.
    pub async fn all_metrics(&self) -> GatewayResult<Vec<QueryMetric>> {
        let mut conn = self.redis.clone();
        let hashes: Vec<String> = conn.smembers(INDEX_KEY).await?;

        let mut metrics = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let raw: Option<String> = conn.get(metric_key(&hash)).await?;
            // Expired metrics linger in the index until their hash ages out
            if let Some(metric) = raw.as_deref().and_then(tolerant_parse::<QueryMetric>) {
                metrics.push(metric);
            }
        }
        Ok(metrics)
    }

    /// Fingerprints ranked by p95 descending.
    pub async fn slowest(&self, limit: usize) -> GatewayResult<Vec<QueryMetric>> {
        let mut metrics = self.all_metrics().await?;
        metrics.sort_by(|a, b| b.p95.cmp(&a.p95));
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Fingerprints ranked by execution count descending.
    pub async fn most_frequent(&self, limit: usize) -> GatewayResult<Vec<QueryMetric>> {
        let mut metrics = self.all_metrics().await?;
        metrics.sort_by(|a, b| b.execution_count.cmp(&a.execution_count));
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Metric plus the first hundred samples, newest first.
    pub async fn detail(&self, hash: &str) -> GatewayResult<Option<(QueryMetric, Vec<ExecutionPoint>)>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(metric_key(hash)).await?;
        let metric = match raw.as_deref().and_then(tolerant_parse::<QueryMetric>) {
            Some(metric) => metric,
            None => return Ok(None),
        };

        let raw_samples: Vec<String> = conn.lrange(samples_key(hash), 0, DETAIL_SAMPLES - 1).await?;
        let samples = raw_samples
            .iter()
            .filter_map(|raw| tolerant_parse::<ExecutionPoint>(raw))
            .collect();
        Ok(Some((metric, samples)))
    }

    /// Totals across all tracked fingerprints.
    pub async fn overview(&self) -> GatewayResult<QueryOverview> {
        let metrics = self.all_metrics().await?;

        let total_executions: u64 = metrics.iter().map(|m| m.execution_count).sum();
        let weighted_sum: f64 = metrics
            .iter()
            .map(|m| m.avg_ms * m.execution_count as f64)
            .sum();
        let slowest = metrics.iter().max_by_key(|m| m.p95);

        Ok(QueryOverview {
            total_tracked: metrics.len(),
            total_executions,
            avg_duration_ms: if total_executions > 0 {
                weighted_sum / total_executions as f64
            } else {
                0.0
            },
            slowest_p95: slowest.map(|m| m.p95).unwrap_or(0),
            slowest_hash: slowest.map(|m| m.query_hash.clone()),
            first_seen: metrics.iter().map(|m| m.first_seen).min(),
            last_seen: metrics.iter().map(|m| m.last_seen).max(),
        })
    }
}

#[async_trait]
impl ExecutionSink for QueryAggregator {
    async fn record(&self, query_hash: &str, query_pattern: &str, point: ExecutionPoint) -> GatewayResult<()> {
        let mut conn = self.redis.clone();
        let skey = samples_key(query_hash);
        let ttl_secs = self.ttl.as_secs();

        let encoded = serde_json::to_string(&point)?;
        conn.lpush::<_, _, ()>(&skey, encoded).await?;
        conn.ltrim::<_, ()>(&skey, 0, self.max_samples as isize - 1).await?;
        conn.expire::<_, ()>(&skey, ttl_secs as i64).await?;

        let raw_samples: Vec<String> = conn.lrange(&skey, 0, -1).await?;
        let samples: Vec<ExecutionPoint> = raw_samples
            .iter()
            .filter_map(|raw| tolerant_parse::<ExecutionPoint>(raw))
            .collect();

        if let Some(metric) = compute_metric(query_hash, query_pattern, &samples) {
            conn.set_ex::<_, _, ()>(metric_key(query_hash), serde_json::to_string(&metric)?, ttl_secs)
                .await?;
        }

        conn.sadd::<_, _, ()>(INDEX_KEY, query_hash).await?;
        conn.expire::<_, ()>(INDEX_KEY, ttl_secs as i64).await?;
        Ok(())
    }
}

/// Linear-interpolated percentile over an ascending-sorted slice:
/// `i = (p/100)(n-1)`, interpolating between the neighbouring samples.
pub fn percentile(sorted: &[i64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let i = (p / 100.0) * (n - 1) as f64;
            let lo = i.floor() as usize;
            let hi = i.ceil() as usize;
            sorted[lo] as f64 + (sorted[hi] - sorted[lo]) as f64 * (i - lo as f64)
        }
    }
}

/// Derive the full metric from the current sample window. An empty
/// window yields nothing — a zeroed metric is never written.
pub fn compute_metric(query_hash: &str, query_pattern: &str, samples: &[ExecutionPoint]) -> Option<QueryMetric> {
    if samples.is_empty() {
        return None;
    }

    let mut durations: Vec<i64> = samples.iter().map(|s| s.duration_ms).collect();
    durations.sort_unstable();
    let sum: i64 = durations.iter().sum();

    Some(QueryMetric {
        query_hash: query_hash.to_string(),
        query_pattern: query_pattern.to_string(),
        execution_count: samples.len() as u64,
        avg_ms: sum as f64 / samples.len() as f64,
        min_ms: durations[0],
        max_ms: durations[durations.len() - 1],
        p50: percentile(&durations, 50.0) as i64,
        p95: percentile(&durations, 95.0) as i64,
        p99: percentile(&durations, 99.0) as i64,
        first_seen: samples.iter().map(|s| s.timestamp).min()?,
        last_seen: samples.iter().map(|s| s.timestamp).max()?,
    })
}

fn tolerant_parse<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Some(value);
    }
    // Legacy writers double-encode: a JSON string holding the object
    serde_json::from_str::<String>(raw)
        .ok()
        .and_then(|inner| serde_json::from_str(&inner).ok())
}
