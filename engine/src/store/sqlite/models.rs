use diesel::prelude::{AsChangeset, Identifiable, Insertable, Queryable};
use serde::{Deserialize, Serialize};

use super::schema::{fleet_targets, fleet_transactions};

#[derive(Queryable, Insertable, Identifiable, AsChangeset, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = fleet_transactions)]
pub struct TransactionRow {
    pub id: String,
    pub status: i32,
    pub template_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Queryable, Insertable, Identifiable, AsChangeset, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = fleet_targets, treat_none_as_null = true)]
pub struct TargetRow {
    pub id: String,
    pub transaction_id: String,
    pub member_id: String,
    pub wallet_address: String,
    pub resolved_call_json: Option<String>,
    pub op_handle: Option<String>,
    pub chain_tx_hash: Option<String>,
    pub status: i32,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
