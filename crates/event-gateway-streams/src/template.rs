// File: src/template.rs
//
// The dedup / resend / parse / enrich / persist processor template

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use event_gateway_core::error::{GatewayError, GatewayResult};
use event_gateway_core::record::StreamRecord;

use crate::enrichment::{UnitEnrichment, UnitLookup};
use crate::orchestrator::StreamProcessor;
use crate::parsing;

/// Hooks a concrete processor supplies to the template: where it reads
/// from, its dedup index operations, model construction from the
/// payload, and the transactional persist.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    type Model: Send + 'static;

    fn name(&self) -> &str;

    fn stream_key(&self) -> &str;

    fn consumer_group(&self) -> &str;

    async fn exists_by_message_id(&self, message_id: &str) -> GatewayResult<bool>;

    async fn delete_by_message_id(&self, message_id: &str) -> GatewayResult<usize>;

    /// Build zero or more target models from the parsed payload. An
    /// empty list is a valid no-op.
    fn build_models(&self, record: &StreamRecord, payload: &Value) -> GatewayResult<Vec<Self::Model>>;

    /// Stamp the enrichment columns on one model.
    fn apply_enrichment(&self, model: &mut Self::Model, enrichment: &UnitEnrichment);

    /// Persist all models in one transaction; a partial failure must
    /// leave the target table as if none had been inserted.
    async fn persist_all(&self, models: Vec<Self::Model>) -> GatewayResult<()>;
}

/// Drives a [`RecordProcessor`] through the shared per-record flow:
///
/// 1. drop records without a message id (with a warning);
/// 2. detect the resend marker in the metadata;
/// 3. resend deletes prior rows, otherwise an existing id skips;
/// 4. parse the payload; failures stay un-acknowledged;
/// 5. build models (empty is a no-op);
/// 6. one enrichment lookup per message, stamped on every model;
/// 7. persist transactionally.
pub struct ProcessorTemplate<P: RecordProcessor> {
    processor: P,
    lookup: Arc<dyn UnitLookup>,
}

impl<P: RecordProcessor> ProcessorTemplate<P> {
    pub fn new(processor: P, lookup: Arc<dyn UnitLookup>) -> Self {
        Self { processor, lookup }
    }

    async fn enrichment_for(&self, payload: &Value) -> GatewayResult<Option<UnitEnrichment>> {
        let unit_number = parsing::optional_str(payload, "unit_number");
        let unit_type = parsing::optional_str(payload, "unit_type_code");
        match (unit_number, unit_type) {
            (Some(unit_number), Some(unit_type)) => {
                let enrichment = self.lookup.lookup_unit(&unit_number, &unit_type).await?;
                Ok(enrichment.has_data.then_some(enrichment))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl<P: RecordProcessor> StreamProcessor for ProcessorTemplate<P> {
    fn name(&self) -> &str {
        self.processor.name()
    }

    fn stream_key(&self) -> &str {
        self.processor.stream_key()
    }

    fn consumer_group(&self) -> &str {
        self.processor.consumer_group()
    }

    async fn process(&self, fields: &HashMap<String, String>) -> GatewayResult<()> {
        let record = StreamRecord::from_wire_fields(fields);

        if record.message_id.is_empty() {
            tracing::warn!(
                processor = self.processor.name(),
                stream = self.processor.stream_key(),
                "dropping record without message id"
            );
            return Ok(());
        }

        let resend = record.is_resend().map_err(|e| {
            tracing::warn!(
                processor = self.processor.name(),
                message_id = %record.message_id,
                error = %e,
                "record metadata unreadable"
            );
            e
        })?;

        if resend {
            let deleted = self.processor.delete_by_message_id(&record.message_id).await?;
            tracing::info!(
                processor = self.processor.name(),
                message_id = %record.message_id,
                deleted,
                "resend: prior rows removed before re-ingestion"
            );
        } else if self.processor.exists_by_message_id(&record.message_id).await? {
            tracing::debug!(
                processor = self.processor.name(),
                message_id = %record.message_id,
                "duplicate message id, skipping"
            );
            return Ok(());
        }

        let payload: Value = serde_json::from_str(&record.payload).map_err(|e| {
            tracing::warn!(
                processor = self.processor.name(),
                message_id = %record.message_id,
                error = %e,
                "record payload is not valid JSON"
            );
            GatewayError::parse(format!("payload of {} is not valid JSON: {}", record.message_id, e))
        })?;

        let mut models = self.processor.build_models(&record, &payload)?;
        if models.is_empty() {
            tracing::debug!(
                processor = self.processor.name(),
                message_id = %record.message_id,
                "no models built, nothing to persist"
            );
            return Ok(());
        }

        if let Some(enrichment) = self.enrichment_for(&payload).await? {
            for model in &mut models {
                self.processor.apply_enrichment(model, &enrichment);
            }
        }

        self.processor.persist_all(models).await
    }
}
