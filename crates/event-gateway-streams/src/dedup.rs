// File: src/dedup.rs
//
// Per-table dedup helpers over the unique message_id index

/// Generates the dedup index for one ingestion table: existence check,
/// delete, and surrogate-key lookup by `message_id`, all expressed
/// against the table's unique secondary index. No business logic lives
/// here; the processor template decides what a hit means.
macro_rules! dedup_index {
    ($(#[$doc:meta])* $name:ident, $table:ident) => {
        $(#[$doc])*
        pub struct $name {
            pool: std::sync::Arc<diesel::r2d2::Pool<diesel::r2d2::ConnectionManager<diesel::PgConnection>>>,
        }

        impl $name {
            pub fn new(
                pool: std::sync::Arc<
                    diesel::r2d2::Pool<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
                >,
            ) -> Self {
                Self { pool }
            }

            pub fn exists_by_message_id(
                &self,
                message_id: &str,
            ) -> event_gateway_core::error::GatewayResult<bool> {
                use diesel::prelude::*;
                let mut conn = self.pool.get()?;
                Ok(diesel::select(diesel::dsl::exists(
                    crate::schema::$table::table
                        .filter(crate::schema::$table::message_id.eq(message_id)),
                ))
                .get_result(&mut conn)?)
            }

            pub fn delete_by_message_id(
                &self,
                message_id: &str,
            ) -> event_gateway_core::error::GatewayResult<usize> {
                use diesel::prelude::*;
                let mut conn = self.pool.get()?;
                Ok(diesel::delete(
                    crate::schema::$table::table
                        .filter(crate::schema::$table::message_id.eq(message_id)),
                )
                .execute(&mut conn)?)
            }

            pub fn find_by_message_id(
                &self,
                message_id: &str,
            ) -> event_gateway_core::error::GatewayResult<Vec<i64>> {
                use diesel::prelude::*;
                let mut conn = self.pool.get()?;
                Ok(crate::schema::$table::table
                    .filter(crate::schema::$table::message_id.eq(message_id))
                    .select(crate::schema::$table::id)
                    .load(&mut conn)?)
            }
        }
    };
}

dedup_index!(
    /// Dedup index over `evt_unit_positions.message_id`.
    UnitPositionIndex,
    evt_unit_positions
);

dedup_index!(
    /// Dedup index over `evt_unit_statuses.message_id`.
    UnitStatusIndex,
    evt_unit_statuses
);
