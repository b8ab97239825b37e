// File: src/enrichment.rs
//
// Cached lookup from (unit_number, unit_type) to downstream identifiers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use tokio::sync::RwLock;

use event_gateway_core::error::GatewayResult;

use crate::schema::ref_units;

/// Result of a unit lookup. `has_data` distinguishes a resolved-empty
/// answer from reference data that simply was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitEnrichment {
    pub container_number: Option<String>,
    pub id_trailer: Option<i64>,
    pub id_vehicle: Option<i64>,
    pub has_data: bool,
}

/// Lookup seam used by the processor template.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnitLookup: Send + Sync {
    async fn lookup_unit(&self, unit_number: &str, unit_type: &str) -> GatewayResult<UnitEnrichment>;
}

#[derive(Queryable)]
struct UnitRow {
    container_number: Option<String>,
    id_trailer: Option<i64>,
    id_vehicle: Option<i64>,
}

/// Diesel-backed lookup against the `ref_units` reference table.
pub struct DieselUnitLookup {
    pool: Arc<Pool<ConnectionManager<PgConnection>>>,
}

impl DieselUnitLookup {
    pub fn new(pool: Arc<Pool<ConnectionManager<PgConnection>>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitLookup for DieselUnitLookup {
    async fn lookup_unit(&self, unit_number: &str, unit_type: &str) -> GatewayResult<UnitEnrichment> {
        let mut conn = self.pool.get()?;

        let row: Option<UnitRow> = ref_units::table
            .filter(ref_units::unit_number.eq(unit_number))
            .filter(ref_units::unit_type_code.eq(unit_type))
            .select((
                ref_units::container_number,
                ref_units::id_trailer,
                ref_units::id_vehicle,
            ))
            .first(&mut conn)
            .optional()?;

        Ok(match row {
            Some(row) => UnitEnrichment {
                container_number: row.container_number,
                id_trailer: row.id_trailer,
                id_vehicle: row.id_vehicle,
                has_data: true,
            },
            None => UnitEnrichment::default(),
        })
    }
}

struct CacheEntry {
    value: UnitEnrichment,
    expires_at: Instant,
}

/// Read-through cache in front of any [`UnitLookup`].
///
/// Positive results live longer than negative ones so a missing unit
/// cannot hammer the reference table, while late-arriving reference
/// rows still become visible within the negative TTL.
pub struct CachedUnitLookup {
    inner: Arc<dyn UnitLookup>,
    cache: RwLock<HashMap<(String, String), CacheEntry>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl CachedUnitLookup {
    pub fn new(inner: Arc<dyn UnitLookup>) -> Self {
        Self::with_ttls(inner, Duration::from_secs(600), Duration::from_secs(60))
    }

    pub fn with_ttls(inner: Arc<dyn UnitLookup>, positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            positive_ttl,
            negative_ttl,
        }
    }
}

#[async_trait]
impl UnitLookup for CachedUnitLookup {
    async fn lookup_unit(&self, unit_number: &str, unit_type: &str) -> GatewayResult<UnitEnrichment> {
        let key = (unit_number.to_string(), unit_type.to_string());

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = self.inner.lookup_unit(unit_number, unit_type).await?;
        let ttl = if value.has_data {
            self.positive_ttl
        } else {
            self.negative_ttl
        };
        self.cache.write().await.insert(
            key,
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn positive_results_are_cached() {
        let mut inner = MockUnitLookup::new();
        inner
            .expect_lookup_unit()
            .times(1)
            .returning(|_, _| {
                Ok(UnitEnrichment {
                    container_number: Some("C1".to_string()),
                    id_trailer: Some(7),
                    id_vehicle: None,
                    has_data: true,
                })
            });

        let cached = CachedUnitLookup::new(Arc::new(inner));
        let first = cached.lookup_unit("U1", "TRAILER").await.unwrap();
        let second = cached.lookup_unit("U1", "TRAILER").await.unwrap();
        assert_eq!(first, second);
        assert!(first.has_data);
    }

    #[tokio::test]
    async fn negative_results_expire_sooner() {
        let mut inner = MockUnitLookup::new();
        inner
            .expect_lookup_unit()
            .times(2)
            .returning(|_, _| Ok(UnitEnrichment::default()));

        let cached = CachedUnitLookup::with_ttls(
            Arc::new(inner),
            Duration::from_secs(600),
            Duration::from_millis(10),
        );
        let miss = cached.lookup_unit("U2", "VEHICLE").await.unwrap();
        assert!(!miss.has_data);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Negative entry has expired; the inner lookup runs again
        cached.lookup_unit("U2", "VEHICLE").await.unwrap();
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let mut inner = MockUnitLookup::new();
        inner
            .expect_lookup_unit()
            .times(2)
            .returning(|unit, _| {
                Ok(UnitEnrichment {
                    container_number: Some(unit.to_string()),
                    has_data: true,
                    ..UnitEnrichment::default()
                })
            });

        let cached = CachedUnitLookup::new(Arc::new(inner));
        let a = cached.lookup_unit("U1", "TRAILER").await.unwrap();
        let b = cached.lookup_unit("U1", "VEHICLE").await.unwrap();
        assert_eq!(a.container_number.as_deref(), Some("U1"));
        assert_eq!(b.container_number.as_deref(), Some("U1"));
    }
}
