// File: src/schema.rs
//
// Diesel schema for the raw event store

diesel::table! {
    /// Single source of truth for everything the gateway has ingested,
    /// keyed by the application-level message id.
    evt_raw_events (id_event) {
        id_event -> Int8,
        message_id -> Text,
        event_type -> Text,
        event_time -> Timestamptz,
        payload -> Jsonb,
        #[max_length = 32]
        checksum -> Varchar,
        processed_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}
