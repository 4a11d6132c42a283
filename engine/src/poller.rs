use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, instrument, warn};

use fleetcast_connectors::bundler::{BundlerClient, OperationStatus};
use fleetcast_core::state::TargetStatus;

use crate::driver::rederive_transaction;
use crate::store::{FleetStore, TargetRecord, now_secs};

const POLL_BATCH_LIMIT: usize = 100;

/// Walks submitted targets on a fixed interval and settles them against the
/// bundler. Runs concurrently with dispatches; it only ever touches rows in
/// `Submitted`, so it cannot race a driver write into a wrong state.
pub struct ConfirmationPoller<B, D>
where
    B: BundlerClient,
    D: FleetStore,
{
    pub store: Arc<D>,
    pub bundler: Arc<B>,
    pub poll_interval: Duration,
}

impl<B, D> ConfirmationPoller<B, D>
where
    B: BundlerClient + Send + Sync,
    D: FleetStore + Send + Sync,
{
    pub fn new(store: Arc<D>, bundler: Arc<B>, poll_interval: Duration) -> Self {
        Self {
            store,
            bundler,
            poll_interval,
        }
    }

    pub async fn run(self) {
        loop {
            if let Err(err) = self.tick().await {
                warn!("[confirmation] tick error: {err}");
            }
            sleep(self.poll_interval).await;
        }
    }

    pub(crate) async fn tick(&self) -> Result<(), String> {
        let rows = self
            .store
            .list_targets_by_status(TargetStatus::Submitted, POLL_BATCH_LIMIT)
            .await
            .map_err(|e| e.to_string())?;

        for row in rows {
            if let Err(err) = self.process_row(row).await {
                warn!("[confirmation] row processing failed: {err}");
            }
        }
        Ok(())
    }

    #[instrument(name = "confirmation.process_row", skip_all, err, fields(target_id = %row.id))]
    async fn process_row(&self, mut row: TargetRecord) -> Result<(), String> {
        let Some(handle) = row.op_handle.clone() else {
            // A submitted target without a handle cannot ever confirm.
            row.status = TargetStatus::Failed;
            row.error = Some("submitted target has no operation handle".to_string());
            row.updated_at = now_secs();
            let transaction_id = row.transaction_id.clone();
            self.store.update_target(row).await.map_err(|e| e.to_string())?;
            return rederive_transaction(self.store.as_ref(), &transaction_id)
                .await
                .map_err(|e| e.to_string());
        };

        // A transport error leaves the row Submitted; the next tick retries.
        let status = self
            .bundler
            .operation_status(&handle)
            .await
            .map_err(|e| format!("operation_status({handle}): {e}"))?;

        match status {
            OperationStatus::Pending => Ok(()),
            OperationStatus::Confirmed { tx_hash } => {
                info!(member = %row.member_id, tx_hash = %tx_hash, "target confirmed");
                row.status = TargetStatus::Confirmed;
                row.chain_tx_hash = Some(tx_hash);
                row.updated_at = now_secs();
                let transaction_id = row.transaction_id.clone();
                self.store.update_target(row).await.map_err(|e| e.to_string())?;
                rederive_transaction(self.store.as_ref(), &transaction_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            OperationStatus::Failed { reason } => {
                warn!(member = %row.member_id, reason = %reason, "target failed on-chain");
                row.status = TargetStatus::Failed;
                row.error = Some(reason);
                row.updated_at = now_secs();
                let transaction_id = row.transaction_id.clone();
                self.store.update_target(row).await.map_err(|e| e.to_string())?;
                rederive_transaction(self.store.as_ref(), &transaction_id)
                    .await
                    .map_err(|e| e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use fleetcast_connectors::ConnectorError;
    use fleetcast_connectors::bundler::MockBundlerClient;
    use fleetcast_core::state::TxStatus;
    use mockall::predicate::eq;

    use crate::store::memory::MemoryStore;
    use crate::store::{FleetStore, TransactionRecord};

    fn tx(id: &str, status: TxStatus) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            status,
            template_json: "{}".to_string(),
            created_at: now_secs(),
            updated_at: now_secs(),
        }
    }

    fn submitted_target(id: &str, tx_id: &str, handle: Option<&str>) -> TargetRecord {
        TargetRecord {
            id: id.to_string(),
            transaction_id: tx_id.to_string(),
            member_id: format!("member-{id}"),
            wallet_address: "0x00000000000000000000000000000000000000aa".to_string(),
            resolved_call_json: Some("{}".to_string()),
            op_handle: handle.map(str::to_string),
            chain_tx_hash: None,
            status: TargetStatus::Submitted,
            error: None,
            created_at: now_secs(),
            updated_at: now_secs(),
        }
    }

    async fn seeded_store(targets: Vec<TargetRecord>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_transaction(tx("t1", TxStatus::Processing)).await.unwrap();
        for target in targets {
            store.create_target(target).await.unwrap();
        }
        store
    }

    fn poller(store: Arc<MemoryStore>, bundler: MockBundlerClient) -> ConfirmationPoller<MockBundlerClient, MemoryStore> {
        ConfirmationPoller::new(store, Arc::new(bundler), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn confirms_targets_and_completes_the_parent() {
        let store = seeded_store(vec![
            submitted_target("a", "t1", Some("0xop-a")),
            submitted_target("b", "t1", Some("0xop-b")),
        ])
        .await;

        let mut bundler = MockBundlerClient::new();
        bundler
            .expect_operation_status()
            .with(eq("0xop-a"))
            .times(1)
            .returning(|_| {
                Ok(OperationStatus::Confirmed {
                    tx_hash: "0xaaa".to_string(),
                })
            });
        bundler
            .expect_operation_status()
            .with(eq("0xop-b"))
            .times(1)
            .returning(|_| {
                Ok(OperationStatus::Confirmed {
                    tx_hash: "0xbbb".to_string(),
                })
            });

        let poller = poller(Arc::clone(&store), bundler);
        poller.tick().await.expect("tick");

        let targets = store.list_targets("t1").await.unwrap();
        assert!(targets.iter().all(|t| t.status == TargetStatus::Confirmed));
        assert_eq!(targets[0].chain_tx_hash.as_deref(), Some("0xaaa"));

        let parent = store.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(parent.status, TxStatus::Completed);
    }

    #[tokio::test]
    async fn onchain_failure_fails_target_and_parent_when_all_terminal() {
        let store = seeded_store(vec![submitted_target("a", "t1", Some("0xop-a"))]).await;

        let mut bundler = MockBundlerClient::new();
        bundler.expect_operation_status().times(1).returning(|_| {
            Ok(OperationStatus::Failed {
                reason: "AA21 didn't pay prefund".to_string(),
            })
        });

        let poller = poller(Arc::clone(&store), bundler);
        poller.tick().await.expect("tick");

        let targets = store.list_targets("t1").await.unwrap();
        assert_eq!(targets[0].status, TargetStatus::Failed);
        assert_eq!(targets[0].error.as_deref(), Some("AA21 didn't pay prefund"));

        let parent = store.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(parent.status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn pending_receipt_leaves_the_target_submitted() {
        let store = seeded_store(vec![submitted_target("a", "t1", Some("0xop-a"))]).await;

        let mut bundler = MockBundlerClient::new();
        bundler
            .expect_operation_status()
            .times(1)
            .returning(|_| Ok(OperationStatus::Pending));

        let poller = poller(Arc::clone(&store), bundler);
        poller.tick().await.expect("tick");

        let targets = store.list_targets("t1").await.unwrap();
        assert_eq!(targets[0].status, TargetStatus::Submitted);
        let parent = store.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(parent.status, TxStatus::Processing);
    }

    #[tokio::test]
    async fn bundler_transport_error_keeps_the_target_for_the_next_tick() {
        let store = seeded_store(vec![submitted_target("a", "t1", Some("0xop-a"))]).await;

        let mut bundler = MockBundlerClient::new();
        bundler
            .expect_operation_status()
            .times(1)
            .returning(|_| Err(ConnectorError::bundler("connection refused")));

        let poller = poller(Arc::clone(&store), bundler);
        // Row-level errors are contained; the tick itself succeeds.
        poller.tick().await.expect("tick");

        let targets = store.list_targets("t1").await.unwrap();
        assert_eq!(targets[0].status, TargetStatus::Submitted);
    }

    #[tokio::test]
    async fn handleless_submitted_row_is_failed_outright() {
        let store = seeded_store(vec![submitted_target("a", "t1", None)]).await;

        let bundler = MockBundlerClient::new();
        let poller = poller(Arc::clone(&store), bundler);
        poller.tick().await.expect("tick");

        let targets = store.list_targets("t1").await.unwrap();
        assert_eq!(targets[0].status, TargetStatus::Failed);
        assert!(targets[0].error.as_deref().unwrap().contains("no operation handle"));
    }

    #[tokio::test]
    async fn already_terminal_targets_are_never_requeried() {
        let store = Arc::new(MemoryStore::new());
        store.create_transaction(tx("t1", TxStatus::Completed)).await.unwrap();
        let mut confirmed = submitted_target("a", "t1", Some("0xop-a"));
        confirmed.status = TargetStatus::Confirmed;
        confirmed.chain_tx_hash = Some("0xaaa".to_string());
        store.create_target(confirmed).await.unwrap();

        // No expectations set: any bundler call would panic the test.
        let bundler = MockBundlerClient::new();
        let poller = poller(Arc::clone(&store), bundler);
        poller.tick().await.expect("tick");

        let parent = store.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(parent.status, TxStatus::Completed);
    }
}
