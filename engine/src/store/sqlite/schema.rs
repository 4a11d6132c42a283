diesel::table! {
    fleet_transactions (id) {
        id -> Text,
        status -> Integer,
        template_json -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    fleet_targets (id) {
        id -> Text,
        transaction_id -> Text,
        member_id -> Text,
        wallet_address -> Text,
        resolved_call_json -> Nullable<Text>,
        op_handle -> Nullable<Text>,
        chain_tx_hash -> Nullable<Text>,
        status -> Integer,
        error -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(fleet_transactions, fleet_targets);
