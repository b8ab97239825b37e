// File: src/publisher.rs
//
// Forwarding ingested events to named streams on the bus

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use event_gateway_core::error::GatewayResult;
use event_gateway_core::record::StreamRecord;

/// Egress to the stream bus: one structured record per call.
///
/// At most one network write per call and no retry inside; the caller
/// decides whether a failure forces broker redelivery (the pipeline) or
/// aborts a batch (the replay controller).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamEgress: Send + Sync {
    /// Write the record to the named stream; returns the bus-assigned
    /// entry id.
    async fn publish(&self, stream: &str, record: &StreamRecord) -> GatewayResult<String>;
}

/// Redis-streams implementation of [`StreamEgress`].
#[derive(Clone)]
pub struct StreamPublisher {
    redis: ConnectionManager,
}

impl StreamPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl StreamEgress for StreamPublisher {
    async fn publish(&self, stream: &str, record: &StreamRecord) -> GatewayResult<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (field, value) in record.to_wire_fields() {
            cmd.arg(field).arg(value);
        }

        let mut conn = self.redis.clone();
        let entry_id: String = cmd.query_async(&mut conn).await?;

        tracing::debug!(
            stream = %stream,
            message_id = %record.message_id,
            entry_id = %entry_id,
            "record published to stream"
        );
        Ok(entry_id)
    }
}
