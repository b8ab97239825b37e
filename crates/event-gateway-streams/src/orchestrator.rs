// File: src/orchestrator.rs
//
// Binding declared stream processors to consumer groups on the bus

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use event_gateway_core::error::GatewayResult;

/// Poll timeout at the bus; the only place a processor loop suspends.
const BLOCK_MS: usize = 1000;

/// Records fetched per poll.
const READ_COUNT: usize = 16;

/// A processor the orchestrator can bind: where it reads, which group
/// owns its offset, and how one record is handled.
///
/// An `Ok` return acknowledges the record to the group; any error
/// leaves it in the pending-entries list for inspection or redelivery.
#[async_trait]
pub trait StreamProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn stream_key(&self) -> &str;

    fn consumer_group(&self) -> &str;

    async fn process(&self, fields: &HashMap<String, String>) -> GatewayResult<()>;
}

/// Discovers registered processors, ensures their consumer groups
/// exist, and drives one poll loop per processor with
/// acknowledge-on-success semantics.
pub struct StreamOrchestrator {
    redis: ConnectionManager,
    consumer_name: String,
    processors: Vec<Arc<dyn StreamProcessor>>,
    shutdown: watch::Receiver<bool>,
}

impl StreamOrchestrator {
    pub fn new(
        redis: ConnectionManager,
        consumer_name: String,
        processors: Vec<Arc<dyn StreamProcessor>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            redis,
            consumer_name,
            processors,
            shutdown,
        }
    }

    /// Ensure every group exists, then spawn one consumer loop per
    /// processor. Returns the task handles so the caller can await the
    /// drain on shutdown.
    pub async fn start(&self) -> GatewayResult<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            ensure_group(
                &mut self.redis.clone(),
                processor.stream_key(),
                processor.consumer_group(),
            )
            .await?;

            let worker = ProcessorWorker {
                redis: self.redis.clone(),
                consumer_name: self.consumer_name.clone(),
                processor: Arc::clone(processor),
                shutdown: self.shutdown.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        tracing::info!(processors = self.processors.len(), "stream orchestrator started");
        Ok(handles)
    }
}

/// Create the consumer group at the stream head, creating the stream
/// itself if needed. Existing-group errors are expected and suppressed.
async fn ensure_group(
    redis: &mut ConnectionManager,
    stream_key: &str,
    group: &str,
) -> GatewayResult<()> {
    let created: Result<String, redis::RedisError> = redis
        .xgroup_create_mkstream(stream_key, group, "$")
        .await;
    match created {
        Ok(_) => {
            tracing::info!(stream = stream_key, group, "consumer group created");
            Ok(())
        }
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => {
            tracing::error!(stream = stream_key, group, error = %e, "creating consumer group failed");
            Err(e.into())
        }
    }
}

struct ProcessorWorker {
    redis: ConnectionManager,
    consumer_name: String,
    processor: Arc<dyn StreamProcessor>,
    shutdown: watch::Receiver<bool>,
}

impl ProcessorWorker {
    async fn run(mut self) {
        let stream_key = self.processor.stream_key().to_string();
        let group = self.processor.consumer_group().to_string();
        tracing::info!(
            processor = self.processor.name(),
            stream = %stream_key,
            group = %group,
            consumer = %self.consumer_name,
            "processor loop started"
        );

        while !*self.shutdown.borrow() {
            let options = StreamReadOptions::default()
                .group(&group, &self.consumer_name)
                .block(BLOCK_MS)
                .count(READ_COUNT);
            let reply: Result<StreamReadReply, redis::RedisError> = self
                .redis
                .xread_options(&[stream_key.as_str()], &[">"], &options)
                .await;

            let reply = match reply {
                Ok(reply) => reply,
                Err(error) => {
                    tracing::warn!(
                        processor = self.processor.name(),
                        error = %error,
                        "bus poll failed, backing off"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(BLOCK_MS as u64)).await;
                    continue;
                }
            };

            for stream in reply.keys {
                for entry in stream.ids {
                    let fields = stringify_fields(&entry.map);
                    match self.processor.process(&fields).await {
                        Ok(()) => {
                            let acked: Result<i64, redis::RedisError> = self
                                .redis
                                .xack(&stream_key, &group, &[&entry.id])
                                .await;
                            if let Err(error) = acked {
                                tracing::error!(
                                    processor = self.processor.name(),
                                    entry_id = %entry.id,
                                    error = %error,
                                    "acknowledge failed, record stays pending"
                                );
                            }
                        }
                        Err(error) => {
                            // Left in the PEL for manual inspection or
                            // redelivery
                            tracing::error!(
                                processor = self.processor.name(),
                                stream = %stream_key,
                                entry_id = %entry.id,
                                error = %error,
                                "record processing failed, not acknowledged"
                            );
                        }
                    }
                }
            }
        }
        tracing::info!(processor = self.processor.name(), "processor loop stopped");
    }
}

/// Stream entry values arrive as raw redis values; everything on this
/// bus is string-typed.
fn stringify_fields(map: &HashMap<String, redis::Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(key, value)| match value {
            redis::Value::Data(bytes) => {
                Some((key.clone(), String::from_utf8_lossy(bytes).into_owned()))
            }
            redis::Value::Status(s) => Some((key.clone(), s.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_keeps_only_string_shaped_values() {
        let map = HashMap::from([
            (
                "message_id".to_string(),
                redis::Value::Data(b"\"k1\"".to_vec()),
            ),
            ("weird".to_string(), redis::Value::Int(5)),
        ]);
        let fields = stringify_fields(&map);
        assert_eq!(fields.get("message_id").unwrap(), "\"k1\"");
        assert!(!fields.contains_key("weird"));
    }
}
