// End-to-end processor-template behavior over wire-encoded records:
// a duplicate publish is a no-op, a resend replaces the existing row.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use event_gateway_core::error::GatewayResult;
use event_gateway_core::record::StreamRecord;
use event_gateway_streams::enrichment::{UnitEnrichment, UnitLookup};
use event_gateway_streams::orchestrator::StreamProcessor;
use event_gateway_streams::template::{ProcessorTemplate, RecordProcessor};

#[derive(Debug, Clone)]
struct Row {
    surrogate_id: i64,
    message_id: String,
    container_number: Option<String>,
}

#[derive(Default)]
struct InMemoryTable {
    rows: Mutex<Vec<Row>>,
    next_id: AtomicI64,
}

struct TableProcessor {
    table: Arc<InMemoryTable>,
}

#[async_trait]
impl RecordProcessor for TableProcessor {
    type Model = Row;

    fn name(&self) -> &str {
        "table"
    }

    fn stream_key(&self) -> &str {
        "stream-s"
    }

    fn consumer_group(&self) -> &str {
        "grp-table"
    }

    async fn exists_by_message_id(&self, message_id: &str) -> GatewayResult<bool> {
        Ok(self
            .table
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|row| row.message_id == message_id))
    }

    async fn delete_by_message_id(&self, message_id: &str) -> GatewayResult<usize> {
        let mut rows = self.table.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.message_id != message_id);
        Ok(before - rows.len())
    }

    fn build_models(&self, record: &StreamRecord, _payload: &Value) -> GatewayResult<Vec<Row>> {
        Ok(vec![Row {
            surrogate_id: self.table.next_id.fetch_add(1, Ordering::SeqCst),
            message_id: record.message_id.clone(),
            container_number: None,
        }])
    }

    fn apply_enrichment(&self, model: &mut Row, enrichment: &UnitEnrichment) {
        model.container_number = enrichment.container_number.clone();
    }

    async fn persist_all(&self, models: Vec<Row>) -> GatewayResult<()> {
        self.table.rows.lock().unwrap().extend(models);
        Ok(())
    }
}

struct NoReferenceData;

#[async_trait]
impl UnitLookup for NoReferenceData {
    async fn lookup_unit(&self, _unit_number: &str, _unit_type: &str) -> GatewayResult<UnitEnrichment> {
        Ok(UnitEnrichment::default())
    }
}

fn wire(record: StreamRecord) -> HashMap<String, String> {
    record
        .to_wire_fields()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[tokio::test]
async fn duplicate_then_resend_leaves_exactly_one_fresh_row() {
    let table = Arc::new(InMemoryTable::default());
    let template = ProcessorTemplate::new(
        TableProcessor {
            table: Arc::clone(&table),
        },
        Arc::new(NoReferenceData),
    );

    let payload = r#"{"unit_number":"U"}"#;

    // R1: first delivery inserts
    template
        .process(&wire(StreamRecord::new("k1", "T", payload, "{}")))
        .await
        .unwrap();
    let first_id = {
        let rows = table.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        rows[0].surrogate_id
    };

    // R2: identical record is a silent no-op
    template
        .process(&wire(StreamRecord::new("k1", "T", payload, "{}")))
        .await
        .unwrap();
    {
        let rows = table.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].surrogate_id, first_id);
    }

    // R3: the resend marker replaces the row, with a new surrogate key
    template
        .process(&wire(StreamRecord::new(
            "k1",
            "T",
            payload,
            r#"{"resend":true}"#,
        )))
        .await
        .unwrap();
    let rows = table.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message_id, "k1");
    assert_ne!(rows[0].surrogate_id, first_id);
}

#[tokio::test]
async fn forced_new_ids_accumulate_rows() {
    let table = Arc::new(InMemoryTable::default());
    let template = ProcessorTemplate::new(
        TableProcessor {
            table: Arc::clone(&table),
        },
        Arc::new(NoReferenceData),
    );

    let payload = r#"{"unit_number":"U"}"#;
    for message_id in ["RESEND:1:aa", "RESEND:1:bb", "RESEND:1:cc"] {
        template
            .process(&wire(StreamRecord::new(message_id, "T", payload, "{}")))
            .await
            .unwrap();
    }
    assert_eq!(table.rows.lock().unwrap().len(), 3);
}
