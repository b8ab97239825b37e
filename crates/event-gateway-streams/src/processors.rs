// File: src/processors.rs
//
// The shipped stream processors: unit positions and unit statuses

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use rust_decimal::Decimal;
use serde_json::Value;

use event_gateway_core::error::{GatewayError, GatewayResult};
use event_gateway_core::record::StreamRecord;

use crate::dedup::{UnitPositionIndex, UnitStatusIndex};
use crate::enrichment::UnitEnrichment;
use crate::parsing;
use crate::schema::{evt_unit_positions, evt_unit_statuses};
use crate::template::RecordProcessor;

type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = evt_unit_positions)]
pub struct NewUnitPosition {
    pub message_id: String,
    pub unit_number: String,
    pub unit_type_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub speed_kmh: Option<i32>,
    pub ignition_on: Option<bool>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub container_number: Option<String>,
    pub id_trailer: Option<i64>,
    pub id_vehicle: Option<i64>,
}

/// Ingests position reports into `evt_unit_positions`.
pub struct UnitPositionProcessor {
    pool: Arc<PgPool>,
    index: UnitPositionIndex,
    stream_key: String,
    group: String,
}

impl UnitPositionProcessor {
    pub fn new(pool: Arc<PgPool>, stream_key: impl Into<String>) -> Self {
        Self {
            index: UnitPositionIndex::new(Arc::clone(&pool)),
            pool,
            stream_key: stream_key.into(),
            group: "grp-unit-positions".to_string(),
        }
    }
}

#[async_trait]
impl RecordProcessor for UnitPositionProcessor {
    type Model = NewUnitPosition;

    fn name(&self) -> &str {
        "unit-positions"
    }

    fn stream_key(&self) -> &str {
        &self.stream_key
    }

    fn consumer_group(&self) -> &str {
        &self.group
    }

    async fn exists_by_message_id(&self, message_id: &str) -> GatewayResult<bool> {
        self.index.exists_by_message_id(message_id)
    }

    async fn delete_by_message_id(&self, message_id: &str) -> GatewayResult<usize> {
        self.index.delete_by_message_id(message_id)
    }

    fn build_models(&self, record: &StreamRecord, payload: &Value) -> GatewayResult<Vec<NewUnitPosition>> {
        Ok(vec![NewUnitPosition {
            message_id: record.message_id.clone(),
            unit_number: parsing::require_str(payload, "unit_number")?,
            unit_type_code: parsing::optional_str(payload, "unit_type_code"),
            latitude: parsing::optional_decimal(payload, "latitude")?,
            longitude: parsing::optional_decimal(payload, "longitude")?,
            speed_kmh: parsing::optional_i32(payload, "speed_kmh")?,
            ignition_on: parsing::optional_bool(payload, "ignition_on")?,
            recorded_at: parsing::optional_instant(payload, "recorded_at")?,
            container_number: None,
            id_trailer: None,
            id_vehicle: None,
        }])
    }

    fn apply_enrichment(&self, model: &mut NewUnitPosition, enrichment: &UnitEnrichment) {
        model.container_number = enrichment.container_number.clone();
        model.id_trailer = enrichment.id_trailer;
        model.id_vehicle = enrichment.id_vehicle;
    }

    async fn persist_all(&self, models: Vec<NewUnitPosition>) -> GatewayResult<()> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, GatewayError, _>(|conn| {
            for model in &models {
                diesel::insert_into(evt_unit_positions::table)
                    .values(model)
                    .execute(conn)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = evt_unit_statuses)]
pub struct NewUnitStatus {
    pub message_id: String,
    pub unit_number: String,
    pub unit_type_code: Option<String>,
    pub status_code: String,
    pub status_time: Option<DateTime<Utc>>,
    pub container_number: Option<String>,
    pub id_trailer: Option<i64>,
    pub id_vehicle: Option<i64>,
}

/// Ingests status transitions into `evt_unit_statuses`.
pub struct UnitStatusProcessor {
    pool: Arc<PgPool>,
    index: UnitStatusIndex,
    stream_key: String,
    group: String,
}

impl UnitStatusProcessor {
    pub fn new(pool: Arc<PgPool>, stream_key: impl Into<String>) -> Self {
        Self {
            index: UnitStatusIndex::new(Arc::clone(&pool)),
            pool,
            stream_key: stream_key.into(),
            group: "grp-unit-statuses".to_string(),
        }
    }
}

#[async_trait]
impl RecordProcessor for UnitStatusProcessor {
    type Model = NewUnitStatus;

    fn name(&self) -> &str {
        "unit-statuses"
    }

    fn stream_key(&self) -> &str {
        &self.stream_key
    }

    fn consumer_group(&self) -> &str {
        &self.group
    }

    async fn exists_by_message_id(&self, message_id: &str) -> GatewayResult<bool> {
        self.index.exists_by_message_id(message_id)
    }

    async fn delete_by_message_id(&self, message_id: &str) -> GatewayResult<usize> {
        self.index.delete_by_message_id(message_id)
    }

    fn build_models(&self, record: &StreamRecord, payload: &Value) -> GatewayResult<Vec<NewUnitStatus>> {
        Ok(vec![NewUnitStatus {
            message_id: record.message_id.clone(),
            unit_number: parsing::require_str(payload, "unit_number")?,
            unit_type_code: parsing::optional_str(payload, "unit_type_code"),
            status_code: parsing::require_str(payload, "status_code")?,
            status_time: parsing::optional_instant(payload, "status_time")?,
            container_number: None,
            id_trailer: None,
            id_vehicle: None,
        }])
    }

    fn apply_enrichment(&self, model: &mut NewUnitStatus, enrichment: &UnitEnrichment) {
        model.container_number = enrichment.container_number.clone();
        model.id_trailer = enrichment.id_trailer;
        model.id_vehicle = enrichment.id_vehicle;
    }

    async fn persist_all(&self, models: Vec<NewUnitStatus>) -> GatewayResult<()> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, GatewayError, _>(|conn| {
            for model in &models {
                diesel::insert_into(evt_unit_statuses::table)
                    .values(model)
                    .execute(conn)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Model construction is pure; exercise it without a database by
    // reaching through the RecordProcessor hook on a pool-less stub.
    fn position_models(payload: Value) -> GatewayResult<Vec<NewUnitPosition>> {
        let record = StreamRecord::new("m1", "UNIT_POSITION", payload.to_string(), "{}");
        // build_models does not touch the pool
        let processor = UnitPositionProcessor {
            pool: test_pool(),
            index: UnitPositionIndex::new(test_pool()),
            stream_key: "stream-x".to_string(),
            group: "grp-unit-positions".to_string(),
        };
        processor.build_models(&record, &payload)
    }

    fn test_pool() -> Arc<PgPool> {
        // Unconnected pool; fine for the pure hooks under test
        Arc::new(
            Pool::builder()
                .max_size(1)
                .min_idle(Some(0))
                .test_on_check_out(false)
                .build_unchecked(ConnectionManager::new("postgresql://localhost/unused")),
        )
    }

    #[test]
    fn position_payload_parses_typed_columns() {
        let models = position_models(json!({
            "unit_number": "U7",
            "unit_type_code": "TRAILER",
            "latitude": "45.4642",
            "longitude": 9.19,
            "speed_kmh": "88",
            "ignition_on": "TRUE",
            "recorded_at": "2026-07-30T12:00:00Z"
        }))
        .unwrap();

        let model = &models[0];
        assert_eq!(model.unit_number, "U7");
        assert_eq!(model.latitude.unwrap().to_string(), "45.4642");
        assert_eq!(model.longitude.unwrap().to_string(), "9.19");
        assert_eq!(model.speed_kmh, Some(88));
        assert_eq!(model.ignition_on, Some(true));
        assert!(model.recorded_at.is_some());
        assert!(model.container_number.is_none());
    }

    #[test]
    fn position_requires_unit_number() {
        let err = position_models(json!({"latitude": 1.0})).unwrap_err();
        assert!(matches!(err, GatewayError::Parse { .. }));
    }

    #[test]
    fn enrichment_stamps_all_three_columns() {
        let mut models = position_models(json!({"unit_number": "U7"})).unwrap();
        let processor = UnitPositionProcessor {
            pool: test_pool(),
            index: UnitPositionIndex::new(test_pool()),
            stream_key: "stream-x".to_string(),
            group: "grp-unit-positions".to_string(),
        };
        processor.apply_enrichment(
            &mut models[0],
            &UnitEnrichment {
                container_number: Some("C1".to_string()),
                id_trailer: Some(3),
                id_vehicle: Some(9),
                has_data: true,
            },
        );
        assert_eq!(models[0].container_number.as_deref(), Some("C1"));
        assert_eq!(models[0].id_trailer, Some(3));
        assert_eq!(models[0].id_vehicle, Some(9));
    }
}
