// File: src/pipeline.rs
//
// Per-message gateway flow: parse, persist, dispatch, forward

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use event_gateway_broker::connection::InboundMessage;
use event_gateway_broker::listener::MessageSink;
use event_gateway_core::error::{GatewayError, GatewayResult};
use event_gateway_core::event::GatewayEvent;
use event_gateway_core::handler::HandlerRegistry;
use event_gateway_core::message_id;
use event_gateway_core::record::StreamRecord;
use event_gateway_core::retry::{interruptible_sleep, RetryPolicy};

use crate::publisher::StreamEgress;
use crate::store::RawEvents;

/// The gateway pipeline: for each broker message, obtain an id, persist
/// the raw event, dispatch to the typed handler with bounded retry, and
/// forward to the mapped stream on the bus.
///
/// Returning `Ok` from [`MessageSink::on_message`] acknowledges the
/// broker message; every error path leaves it un-acknowledged so the
/// broker redelivers and the upsert-by-id store keeps persistence
/// exactly-once.
pub struct GatewayPipeline {
    store: Arc<dyn RawEvents>,
    registry: Arc<HandlerRegistry>,
    publisher: Arc<dyn StreamEgress>,
    stream_mapping: RwLock<HashMap<String, String>>,
    retry: Arc<RetryPolicy>,
    shutdown: watch::Receiver<bool>,
    ack_disabled: AtomicBool,
}

impl GatewayPipeline {
    pub fn new(
        store: Arc<dyn RawEvents>,
        registry: Arc<HandlerRegistry>,
        publisher: Arc<dyn StreamEgress>,
        stream_mapping: HashMap<String, String>,
        retry: Arc<RetryPolicy>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
            stream_mapping: RwLock::new(stream_mapping),
            retry,
            shutdown,
            ack_disabled: AtomicBool::new(false),
        }
    }

    /// Swap the address-to-stream mapping at runtime (reconfigure path).
    pub fn set_stream_mapping(&self, mapping: HashMap<String, String>) {
        *self.stream_mapping.write().expect("stream mapping lock poisoned") = mapping;
    }

    /// Development aid only: when set, processed messages are left
    /// un-acknowledged so the broker keeps redelivering them.
    pub fn set_ack_disabled(&self, disabled: bool) {
        self.ack_disabled.store(disabled, Ordering::Relaxed);
    }

    fn stream_for(&self, address: &str) -> Option<String> {
        self.stream_mapping
            .read()
            .expect("stream mapping lock poisoned")
            .get(address)
            .cloned()
    }

    async fn dispatch_with_retry(&self, event: &GatewayEvent) -> GatewayResult<()> {
        let handler = self.registry.get(&event.event_type);
        // Knobs are re-read per attempt so runtime changes apply mid-flight
        let attempts = self.retry.attempts();
        let mut shutdown = self.shutdown.clone();

        for attempt in 1..=attempts {
            match handler.handle(event).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt < attempts => {
                    tracing::warn!(
                        handler = handler.name(),
                        message_id = %event.message_id,
                        attempt,
                        attempts,
                        error = %error,
                        "handler failed, retrying"
                    );
                    interruptible_sleep(self.retry.delay(), &mut shutdown).await?;
                }
                Err(error) => {
                    return Err(GatewayError::handler(format!(
                        "handler '{}' failed after {} attempts for {}: {}",
                        handler.name(),
                        attempts,
                        event.message_id,
                        error
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSink for GatewayPipeline {
    async fn on_message(&self, address: &str, message: &InboundMessage) -> GatewayResult<()> {
        // Broker-supplied id when present; deterministic fallback so
        // redelivery collides on the same id
        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| message_id::synthesize(address, &message.body));

        let payload: Value = serde_json::from_str(&message.body).map_err(|e| {
            tracing::warn!(
                address = %address,
                message_id = %message_id,
                error = %e,
                "discarding message with unparseable payload"
            );
            GatewayError::parse(format!("payload on '{}' is not valid JSON: {}", address, e))
        })?;

        let event = GatewayEvent::new(message_id, address, message.body.clone());

        self.store.upsert(&event, &payload).await?;
        self.dispatch_with_retry(&event).await?;

        let stream = self.stream_for(address).ok_or_else(|| {
            GatewayError::configuration(format!("address '{}' has no stream mapping", address))
        })?;
        let record = StreamRecord::new(
            event.message_id.clone(),
            event.event_type.clone(),
            event.payload.clone(),
            "{}",
        );
        self.publisher.publish(&stream, &record).await?;

        if self.ack_disabled.load(Ordering::Relaxed) {
            return Err(GatewayError::RedeliveryForced);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use event_gateway_core::handler::EventHandler;

    use crate::publisher::MockStreamEgress;
    use crate::store::{MockRawEvents, UpsertOutcome};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_types(&self) -> Vec<String> {
            Vec::new()
        }

        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _event: &GatewayEvent) -> GatewayResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(GatewayError::handler("transient"))
            } else {
                Ok(())
            }
        }
    }

    fn inbound(body: &str, message_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            message_id: message_id.map(str::to_string),
            ack_id: "ack-1".to_string(),
            destination: "ADDR_X".to_string(),
            body: body.to_string(),
            redelivered: false,
        }
    }

    fn pipeline_with(
        store: MockRawEvents,
        publisher: MockStreamEgress,
        fail_first: u32,
        calls: Arc<AtomicU32>,
    ) -> GatewayPipeline {
        let registry = Arc::new(
            HandlerRegistry::new(vec![Arc::new(CountingHandler { calls, fail_first })]).unwrap(),
        );
        let (_tx, rx) = watch::channel(false);
        GatewayPipeline::new(
            Arc::new(store),
            registry,
            Arc::new(publisher),
            HashMap::from([("ADDR_X".to_string(), "stream-x".to_string())]),
            Arc::new(RetryPolicy::new(3, 0)),
            rx,
        )
    }

    #[tokio::test]
    async fn happy_path_persists_dispatches_and_publishes() {
        let mut store = MockRawEvents::new();
        store
            .expect_upsert()
            .withf(|event, _| event.message_id == "broker-id" && event.event_type == "ADDR_X")
            .times(1)
            .returning(|_, _| Ok(UpsertOutcome::Inserted));
        let mut publisher = MockStreamEgress::new();
        publisher
            .expect_publish()
            .withf(|stream, record| {
                stream == "stream-x" && record.message_id == "broker-id" && record.metadata == "{}"
            })
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));

        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = pipeline_with(store, publisher, 0, Arc::clone(&calls));
        let result = pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, Some("broker-id")))
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_broker_id_synthesizes_deterministic_fallback() {
        let expected = message_id::synthesize("ADDR_X", r#"{"a":1}"#);
        let expected_for_store = expected.clone();

        let mut store = MockRawEvents::new();
        store
            .expect_upsert()
            .withf(move |event, _| event.message_id == expected_for_store)
            .times(1)
            .returning(|_, _| Ok(UpsertOutcome::Inserted));
        let mut publisher = MockStreamEgress::new();
        let expected_for_publish = expected.clone();
        publisher
            .expect_publish()
            .withf(move |_, record| record.message_id == expected_for_publish)
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));

        let pipeline = pipeline_with(store, publisher, 0, Arc::new(AtomicU32::new(0)));
        pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unparseable_payload_is_a_parse_error_before_persistence() {
        let mut store = MockRawEvents::new();
        store.expect_upsert().times(0);
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(0);

        let pipeline = pipeline_with(store, publisher, 0, Arc::new(AtomicU32::new(0)));
        let result = pipeline.on_message("ADDR_X", &inbound("not json", None)).await;
        assert!(matches!(result, Err(GatewayError::Parse { .. })));
    }

    #[tokio::test]
    async fn handler_retries_then_succeeds() {
        let mut store = MockRawEvents::new();
        store.expect_upsert().returning(|_, _| Ok(UpsertOutcome::Inserted));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(1).returning(|_, _| Ok("1-0".to_string()));

        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = pipeline_with(store, publisher, 2, Arc::clone(&calls));
        pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, Some("m1")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handler_exhaustion_surfaces_and_skips_publish() {
        let mut store = MockRawEvents::new();
        store.expect_upsert().returning(|_, _| Ok(UpsertOutcome::Inserted));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(0);

        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = pipeline_with(store, publisher, 99, Arc::clone(&calls));
        let result = pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, Some("m1")))
            .await;
        assert!(matches!(result, Err(GatewayError::Handler { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ack_disabled_forces_redelivery_after_processing() {
        let mut store = MockRawEvents::new();
        store.expect_upsert().times(1).returning(|_, _| Ok(UpsertOutcome::Inserted));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(1).returning(|_, _| Ok("1-0".to_string()));

        let pipeline = pipeline_with(store, publisher, 0, Arc::new(AtomicU32::new(0)));
        pipeline.set_ack_disabled(true);
        let result = pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, Some("m1")))
            .await;
        assert!(matches!(result, Err(GatewayError::RedeliveryForced)));
    }

    #[tokio::test]
    async fn store_failure_propagates_for_redelivery() {
        let mut store = MockRawEvents::new();
        store
            .expect_upsert()
            .returning(|_, _| Err(GatewayError::store("connection refused")));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(0);

        let pipeline = pipeline_with(store, publisher, 0, Arc::new(AtomicU32::new(0)));
        let result = pipeline
            .on_message("ADDR_X", &inbound(r#"{"a":1}"#, Some("m1")))
            .await;
        assert!(matches!(result, Err(GatewayError::Store { .. })));
    }
}
