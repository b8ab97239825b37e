// File: src/store.rs
//
// PostgreSQL-backed raw event store, upsert-by-message-id

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use serde_json::Value;

use event_gateway_core::error::GatewayResult;
use event_gateway_core::event::GatewayEvent;

use crate::schema::evt_raw_events;

/// Hard cap on search page size; callers asking for more get this.
const MAX_PAGE_SIZE: i64 = 500;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Result of an upsert: whether the message id was new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Search filter over the raw store. All criteria are optional and
/// conjunctive; results sort by event time descending.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One persisted raw event.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = evt_raw_events)]
pub struct RawEventRecord {
    pub id_event: i64,
    pub message_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub payload: Value,
    pub checksum: String,
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Raw event persistence interface.
///
/// All downstream replay depends on this single source of truth keyed
/// by message id; the checksum enables integrity checks without parsing
/// the blob.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RawEvents: Send + Sync {
    /// Insert or replace the raw event for `event.message_id`. Never
    /// fails on duplicates; conflicts replace payload, event type,
    /// event time and checksum, and stamp `processed_at`.
    async fn upsert(&self, event: &GatewayEvent, payload: &Value) -> GatewayResult<UpsertOutcome>;

    async fn find_by_message_id(&self, message_id: &str) -> GatewayResult<Option<RawEventRecord>>;

    async fn find_by_message_ids(&self, message_ids: &[String]) -> GatewayResult<Vec<RawEventRecord>>;

    /// One page of matches, newest first. `page` is zero-based and the
    /// page size is capped server-side.
    async fn search(
        &self,
        filter: &EventFilter,
        page: i64,
        page_size: i64,
    ) -> GatewayResult<Vec<RawEventRecord>>;

    async fn count_search(&self, filter: &EventFilter) -> GatewayResult<i64>;

    async fn distinct_event_types(&self) -> GatewayResult<Vec<String>>;
}

#[derive(QueryableByName)]
struct UpsertRow {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    inserted: bool,
}

/// Diesel/PostgreSQL implementation of [`RawEvents`].
///
/// Uniqueness on `message_id` is enforced by the unique index, so
/// concurrent redelivery can never leave more than one row per id.
pub struct RawEventStore {
    pool: Arc<PgPool>,
}

impl RawEventStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn connection(&self) -> GatewayResult<PooledConnection<ConnectionManager<PgConnection>>> {
        Ok(self.pool.get()?)
    }

    fn apply_filter(
        filter: &EventFilter,
    ) -> evt_raw_events::BoxedQuery<'static, diesel::pg::Pg> {
        let mut query = evt_raw_events::table.into_boxed();
        if let Some(event_type) = filter.event_type.clone() {
            query = query.filter(evt_raw_events::event_type.eq(event_type));
        }
        if let Some(from) = filter.from {
            query = query.filter(evt_raw_events::event_time.ge(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(evt_raw_events::event_time.le(to));
        }
        query
    }
}

#[async_trait]
impl RawEvents for RawEventStore {
    async fn upsert(&self, event: &GatewayEvent, payload: &Value) -> GatewayResult<UpsertOutcome> {
        let mut conn = self.connection()?;

        // xmax = 0 discriminates a fresh insert from a conflict update
        let row: UpsertRow = diesel::sql_query(
            r#"
            INSERT INTO evt_raw_events
                (message_id, event_type, event_time, payload, checksum, processed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (message_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                event_time = EXCLUDED.event_time,
                payload = EXCLUDED.payload,
                checksum = EXCLUDED.checksum,
                processed_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind::<diesel::sql_types::Text, _>(&event.message_id)
        .bind::<diesel::sql_types::Text, _>(&event.event_type)
        .bind::<diesel::sql_types::Timestamptz, _>(event.event_time)
        .bind::<diesel::sql_types::Jsonb, _>(payload)
        .bind::<diesel::sql_types::Varchar, _>(event.payload_checksum())
        .get_result(&mut conn)?;

        let outcome = if row.inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        };
        tracing::debug!(
            message_id = %event.message_id,
            event_type = %event.event_type,
            outcome = ?outcome,
            "raw event persisted"
        );
        Ok(outcome)
    }

    async fn find_by_message_id(&self, message_id: &str) -> GatewayResult<Option<RawEventRecord>> {
        let mut conn = self.connection()?;
        Ok(evt_raw_events::table
            .filter(evt_raw_events::message_id.eq(message_id))
            .select(RawEventRecord::as_select())
            .first(&mut conn)
            .optional()?)
    }

    async fn find_by_message_ids(&self, message_ids: &[String]) -> GatewayResult<Vec<RawEventRecord>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        Ok(evt_raw_events::table
            .filter(evt_raw_events::message_id.eq_any(message_ids))
            .order(evt_raw_events::event_time.desc())
            .select(RawEventRecord::as_select())
            .load(&mut conn)?)
    }

    async fn search(
        &self,
        filter: &EventFilter,
        page: i64,
        page_size: i64,
    ) -> GatewayResult<Vec<RawEventRecord>> {
        let mut conn = self.connection()?;
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        Ok(Self::apply_filter(filter)
            .order(evt_raw_events::event_time.desc())
            .offset(page.max(0) * page_size)
            .limit(page_size)
            .select(RawEventRecord::as_select())
            .load(&mut conn)?)
    }

    async fn count_search(&self, filter: &EventFilter) -> GatewayResult<i64> {
        let mut conn = self.connection()?;
        Ok(Self::apply_filter(filter).count().get_result(&mut conn)?)
    }

    async fn distinct_event_types(&self) -> GatewayResult<Vec<String>> {
        let mut conn = self.connection()?;
        Ok(evt_raw_events::table
            .select(evt_raw_events::event_type)
            .distinct()
            .order(evt_raw_events::event_type.asc())
            .load(&mut conn)?)
    }
}
