use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use fleetcast_core::state::{TargetStatus, TxStatus};

use super::{FleetStore, TargetRecord, TransactionRecord, now_secs};

/// In-process store for tests and ephemeral runs. Same contract as the
/// sqlite store, no durability.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    transactions: HashMap<String, TransactionRecord>,
    targets: HashMap<String, TargetRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn create_transaction(&self, row: TransactionRecord) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.transactions.contains_key(&row.id) {
            anyhow::bail!("transaction {} already exists", row.id);
        }
        inner.transactions.insert(row.id.clone(), row);
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        Ok(self.lock()?.transactions.get(id).cloned())
    }

    async fn update_transaction_status(&self, id: &str, next: TxStatus) -> Result<()> {
        let mut inner = self.lock()?;
        let row = inner
            .transactions
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("no transaction {id}"))?;
        row.status = next;
        row.updated_at = now_secs();
        Ok(())
    }

    async fn create_target(&self, row: TargetRecord) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.targets.contains_key(&row.id) {
            anyhow::bail!("target {} already exists", row.id);
        }
        inner.targets.insert(row.id.clone(), row);
        Ok(())
    }

    async fn update_target(&self, row: TargetRecord) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.targets.contains_key(&row.id) {
            anyhow::bail!("no target {}", row.id);
        }
        inner.targets.insert(row.id.clone(), row);
        Ok(())
    }

    async fn list_targets(&self, transaction_id: &str) -> Result<Vec<TargetRecord>> {
        let inner = self.lock()?;
        let mut rows: Vec<TargetRecord> = inner
            .targets
            .values()
            .filter(|t| t.transaction_id == transaction_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_targets_by_status(&self, status: TargetStatus, limit: usize) -> Result<Vec<TargetRecord>> {
        let inner = self.lock()?;
        let mut rows: Vec<TargetRecord> = inner
            .targets
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            status: TxStatus::Pending,
            template_json: "{}".to_string(),
            created_at: now_secs(),
            updated_at: now_secs(),
        }
    }

    fn target(id: &str, tx_id: &str, status: TargetStatus) -> TargetRecord {
        TargetRecord {
            id: id.to_string(),
            transaction_id: tx_id.to_string(),
            member_id: format!("member-{id}"),
            wallet_address: "0x00000000000000000000000000000000000000aa".to_string(),
            resolved_call_json: None,
            op_handle: None,
            chain_tx_hash: None,
            status,
            error: None,
            created_at: now_secs(),
            updated_at: now_secs(),
        }
    }

    #[tokio::test]
    async fn round_trips_transactions_and_targets() {
        let store = MemoryStore::new();
        store.create_transaction(tx("t1")).await.unwrap();
        store.create_target(target("a", "t1", TargetStatus::Pending)).await.unwrap();
        store.create_target(target("b", "t1", TargetStatus::Submitted)).await.unwrap();
        store.create_target(target("c", "t2", TargetStatus::Pending)).await.unwrap();

        assert_eq!(store.get_transaction("t1").await.unwrap().unwrap().status, TxStatus::Pending);
        assert_eq!(store.list_targets("t1").await.unwrap().len(), 2);

        let submitted = store.list_targets_by_status(TargetStatus::Submitted, 10).await.unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].id, "b");
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.create_transaction(tx("t1")).await.unwrap();
        assert!(store.create_transaction(tx("t1")).await.is_err());
    }

    #[tokio::test]
    async fn update_target_replaces_the_row() {
        let store = MemoryStore::new();
        store.create_target(target("a", "t1", TargetStatus::Pending)).await.unwrap();

        let mut updated = target("a", "t1", TargetStatus::Failed);
        updated.error = Some("no balance to transfer".to_string());
        store.update_target(updated).await.unwrap();

        let rows = store.list_targets("t1").await.unwrap();
        assert_eq!(rows[0].status, TargetStatus::Failed);
        assert_eq!(rows[0].error.as_deref(), Some("no balance to transfer"));
    }
}
