use anyhow::Result;
use async_trait::async_trait;
use fleetcast_core::state::{TargetStatus, TxStatus};

pub mod memory;
pub mod sqlite;

/// One dispatch, as persisted. `status` is always derivable from the target
/// set; it is stored so readers never need a join to answer "where is this
/// dispatch".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: String,
    pub status: TxStatus,
    pub template_json: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One member's leg of a dispatch. Never deleted; this is the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: String,
    pub transaction_id: String,
    pub member_id: String,
    pub wallet_address: String,
    pub resolved_call_json: Option<String>,
    pub op_handle: Option<String>,
    pub chain_tx_hash: Option<String>,
    pub status: TargetStatus,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct TransactionWithTargets {
    pub transaction: TransactionRecord,
    pub targets: Vec<TargetRecord>,
}

/// Persistence boundary for the engine. Every operation is individually
/// atomic; the engine's forward-only status transitions make last-writer-wins
/// safe without cross-operation transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetStore: Send + Sync {
    async fn create_transaction(&self, row: TransactionRecord) -> Result<()>;
    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>>;
    async fn update_transaction_status(&self, id: &str, next: TxStatus) -> Result<()>;
    async fn create_target(&self, row: TargetRecord) -> Result<()>;
    async fn update_target(&self, row: TargetRecord) -> Result<()>;
    async fn list_targets(&self, transaction_id: &str) -> Result<Vec<TargetRecord>>;
    async fn list_targets_by_status(&self, status: TargetStatus, limit: usize) -> Result<Vec<TargetRecord>>;
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
