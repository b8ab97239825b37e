// File: src/schema.rs
//
// Diesel schema for the ingestion tables and the unit reference data

diesel::table! {
    /// Position reports, one row per message id.
    evt_unit_positions (id) {
        id -> Int8,
        message_id -> Text,
        unit_number -> Text,
        unit_type_code -> Nullable<Text>,
        latitude -> Nullable<Numeric>,
        longitude -> Nullable<Numeric>,
        speed_kmh -> Nullable<Int4>,
        ignition_on -> Nullable<Bool>,
        recorded_at -> Nullable<Timestamptz>,
        container_number -> Nullable<Text>,
        id_trailer -> Nullable<Int8>,
        id_vehicle -> Nullable<Int8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Status transitions, one row per message id.
    evt_unit_statuses (id) {
        id -> Int8,
        message_id -> Text,
        unit_number -> Text,
        unit_type_code -> Nullable<Text>,
        status_code -> Text,
        status_time -> Nullable<Timestamptz>,
        container_number -> Nullable<Text>,
        id_trailer -> Nullable<Int8>,
        id_vehicle -> Nullable<Int8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Reference data mapping (unit_number, unit_type_code) to the
    /// downstream identifiers used for enrichment.
    ref_units (id) {
        id -> Int8,
        unit_number -> Text,
        unit_type_code -> Text,
        container_number -> Nullable<Text>,
        id_trailer -> Nullable<Int8>,
        id_vehicle -> Nullable<Int8>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(evt_unit_positions, evt_unit_statuses, ref_units);
