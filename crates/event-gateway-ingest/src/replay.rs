// File: src/replay.rs
//
// Re-emitting persisted raw events onto the stream bus

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use event_gateway_core::error::GatewayResult;
use event_gateway_core::message_id;
use event_gateway_core::record::StreamRecord;

use crate::publisher::StreamEgress;
use crate::store::{EventFilter, RawEventRecord, RawEvents};

/// Replay batches are read from the store page by page.
const REPLAY_PAGE_SIZE: i64 = 200;

/// Reads raw events back from the store and re-enqueues them through
/// the publisher.
///
/// With `force_new_message_id` a fresh id is minted so downstream dedup
/// treats every entry as new; otherwise the original id is kept and the
/// record is marked `{"resend": true}` so downstream replaces its
/// existing rows instead of skipping.
pub struct ReplayController {
    store: Arc<dyn RawEvents>,
    publisher: Arc<dyn StreamEgress>,
    stream_mapping: HashMap<String, String>,
}

impl ReplayController {
    pub fn new(
        store: Arc<dyn RawEvents>,
        publisher: Arc<dyn StreamEgress>,
        stream_mapping: HashMap<String, String>,
    ) -> Self {
        Self {
            store,
            publisher,
            stream_mapping,
        }
    }

    /// Replay the given message ids. Returns the number of records
    /// actually published.
    pub async fn resend_by_ids(
        &self,
        message_ids: &[String],
        force_new_message_id: bool,
    ) -> GatewayResult<usize> {
        let records = self.store.find_by_message_ids(message_ids).await?;
        self.resend_records(records, force_new_message_id).await
    }

    /// Replay everything matching the filter, paging through the store.
    pub async fn resend_by_filter(
        &self,
        filter: &EventFilter,
        force_new_message_id: bool,
    ) -> GatewayResult<usize> {
        let mut total = 0;
        let mut page = 0;
        loop {
            let records = self.store.search(filter, page, REPLAY_PAGE_SIZE).await?;
            let batch_len = records.len();
            if batch_len == 0 {
                break;
            }
            total += self.resend_records(records, force_new_message_id).await?;
            if (batch_len as i64) < REPLAY_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(total)
    }

    async fn resend_records(
        &self,
        records: Vec<RawEventRecord>,
        force_new_message_id: bool,
    ) -> GatewayResult<usize> {
        let mut published = 0;
        for record in records {
            let stream = match self.stream_mapping.get(&record.event_type) {
                Some(stream) => stream,
                None => {
                    // Event types no longer routed anywhere are skipped,
                    // not fatal: replays commonly reach back past a
                    // mapping change.
                    tracing::warn!(
                        message_id = %record.message_id,
                        event_type = %record.event_type,
                        "no stream mapping for replayed event type, skipping"
                    );
                    continue;
                }
            };

            let (message_id, metadata) = if force_new_message_id {
                (message_id::resend_id(Utc::now().timestamp_millis()), "{}".to_string())
            } else {
                (record.message_id.clone(), r#"{"resend":true}"#.to_string())
            };

            let payload = serde_json::to_string(&record.payload)?;
            let stream_record = StreamRecord::new(message_id, record.event_type.clone(), payload, metadata);
            let entry_id = self.publisher.publish(stream, &stream_record).await?;
            tracing::info!(
                message_id = %stream_record.message_id,
                original_id = %record.message_id,
                stream = %stream,
                entry_id = %entry_id,
                "raw event replayed"
            );
            published += 1;
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::publisher::MockStreamEgress;
    use crate::store::MockRawEvents;

    fn record(message_id: &str, event_type: &str) -> RawEventRecord {
        RawEventRecord {
            id_event: 1,
            message_id: message_id.to_string(),
            event_type: event_type.to_string(),
            event_time: Utc::now(),
            payload: json!({"unit_number": "U"}),
            checksum: "0".repeat(32),
            processed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn mapping() -> HashMap<String, String> {
        HashMap::from([("ADDR_X".to_string(), "stream-x".to_string())])
    }

    #[tokio::test]
    async fn preserved_ids_carry_the_resend_marker() {
        let mut store = MockRawEvents::new();
        store
            .expect_find_by_message_ids()
            .returning(|_| Ok(vec![record("m1", "ADDR_X")]));
        let mut publisher = MockStreamEgress::new();
        publisher
            .expect_publish()
            .withf(|stream, rec| {
                stream == "stream-x"
                    && rec.message_id == "m1"
                    && rec.is_resend().unwrap()
            })
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));

        let controller = ReplayController::new(Arc::new(store), Arc::new(publisher), mapping());
        let count = controller
            .resend_by_ids(&["m1".to_string()], false)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn forced_ids_are_fresh_and_unmarked() {
        let mut store = MockRawEvents::new();
        store
            .expect_find_by_message_ids()
            .returning(|_| Ok(vec![record("m1", "ADDR_X"), record("m2", "ADDR_X"), record("m3", "ADDR_X")]));
        let mut publisher = MockStreamEgress::new();
        publisher
            .expect_publish()
            .withf(|_, rec| {
                rec.message_id.starts_with(message_id::RESEND_PREFIX) && !rec.is_resend().unwrap()
            })
            .times(3)
            .returning(|_, _| Ok("1-0".to_string()));

        let controller = ReplayController::new(Arc::new(store), Arc::new(publisher), mapping());
        let count = controller
            .resend_by_ids(
                &["m1".to_string(), "m2".to_string(), "m3".to_string()],
                true,
            )
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn unmapped_event_types_are_skipped_not_fatal() {
        let mut store = MockRawEvents::new();
        store
            .expect_find_by_message_ids()
            .returning(|_| Ok(vec![record("m1", "ADDR_GONE"), record("m2", "ADDR_X")]));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(1).returning(|_, _| Ok("1-0".to_string()));

        let controller = ReplayController::new(Arc::new(store), Arc::new(publisher), mapping());
        let count = controller
            .resend_by_ids(&["m1".to_string(), "m2".to_string()], false)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn filter_replay_pages_until_short_batch() {
        let mut store = MockRawEvents::new();
        store
            .expect_search()
            .withf(|_, page, _| *page == 0)
            .returning(|_, _, _| Ok(vec![record("m1", "ADDR_X")]));
        let mut publisher = MockStreamEgress::new();
        publisher.expect_publish().times(1).returning(|_, _| Ok("1-0".to_string()));

        let controller = ReplayController::new(Arc::new(store), Arc::new(publisher), mapping());
        let count = controller
            .resend_by_filter(&EventFilter::default(), false)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
