//! Mirror of the three relations the hosted store exposes to this
//! application. The schema itself (and its row-level security policies) is
//! owned by the store, not by this repository.

diesel::table! {
    sav_tickets (id) {
        id -> Uuid,
        user_id -> Uuid,
        customer_name -> Varchar,
        email -> Varchar,
        phone -> Varchar,
        product_type -> Varchar,
        serial_number -> Varchar,
        description -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sav_notes (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        name -> Varchar,
        company -> Varchar,
        role -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(sav_notes -> sav_tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(sav_tickets, sav_notes, profiles);
