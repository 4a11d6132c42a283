use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::signers::Signer;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fleetcast_commons::error::format_with_code;
use fleetcast_connectors::account::DelegatedAccount;
use fleetcast_connectors::bundler::BundlerClient;
use fleetcast_connectors::context::ContextProvider;
use fleetcast_connectors::signer::ThresholdSigner;
use fleetcast_core::error::CoreError;
use fleetcast_core::operation::{SignedOperation, WalletOperation};
use fleetcast_core::state::{MemberRef, TargetStatus, TxStatus, derive_transaction_status};
use fleetcast_core::template::{ResolveOptions, Template, encode_call, required_tokens, resolve_template, validate_template};

use crate::error::{EngineError, EngineResult};
use crate::store::{FleetStore, TargetRecord, TransactionRecord, TransactionWithTargets, now_secs};

/// Fans one validated template out to a set of member wallets. Dispatch is
/// accept-and-detach: the caller gets a transaction id immediately and reads
/// progress back through `get_status`.
pub struct ExecutionDriver<C, S, B, D>
where
    C: ContextProvider,
    S: ThresholdSigner,
    B: BundlerClient,
    D: FleetStore,
{
    pub context: Arc<C>,
    pub signer: Arc<S>,
    pub bundler: Arc<B>,
    pub store: Arc<D>,
    pub resolve_options: ResolveOptions,
    pub chain_id: Option<u64>,
}

/// Everything the detached task needs, captured before the dispatch call
/// returns so the audit rows exist no matter what the task does.
#[derive(Debug)]
pub struct DispatchPlan {
    transaction_id: String,
    template: Template,
    tokens: Vec<Address>,
    targets: Vec<(String, MemberRef)>,
}

impl<C, S, B, D> ExecutionDriver<C, S, B, D>
where
    C: ContextProvider + 'static,
    S: ThresholdSigner + 'static,
    B: BundlerClient + 'static,
    D: FleetStore + 'static,
{
    pub fn new(
        context: Arc<C>,
        signer: Arc<S>,
        bundler: Arc<B>,
        store: Arc<D>,
        resolve_options: ResolveOptions,
        chain_id: Option<u64>,
    ) -> Self {
        Self {
            context,
            signer,
            bundler,
            store,
            resolve_options,
            chain_id,
        }
    }

    /// Validates, persists the Pending transaction and its Pending targets,
    /// then detaches the per-member work and returns the transaction id.
    pub async fn dispatch(self: &Arc<Self>, template: Template, members: Vec<MemberRef>) -> EngineResult<String> {
        let plan = self.prepare(template, members).await?;
        let transaction_id = plan.transaction_id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_plan(plan).await;
        });
        Ok(transaction_id)
    }

    pub(crate) async fn prepare(&self, template: Template, members: Vec<MemberRef>) -> EngineResult<DispatchPlan> {
        validate_template(&template).map_err(CoreError::from)?;
        let tokens = required_tokens(&template).map_err(CoreError::from)?;

        if members.is_empty() {
            return Err(EngineError::dispatch("dispatch requires at least one member"));
        }

        let template_json =
            serde_json::to_string(&template).map_err(|e| EngineError::dispatch(format!("serialize template: {e}")))?;

        let transaction_id = Uuid::new_v4().to_string();
        let now = now_secs();
        self.store
            .create_transaction(TransactionRecord {
                id: transaction_id.clone(),
                status: TxStatus::Pending,
                template_json,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;

        let mut targets = Vec::with_capacity(members.len());
        for member in members {
            let target_id = Uuid::new_v4().to_string();
            let created = self
                .store
                .create_target(TargetRecord {
                    id: target_id.clone(),
                    transaction_id: transaction_id.clone(),
                    member_id: member.member_id.clone(),
                    wallet_address: format!("{:#x}", member.wallet_address),
                    resolved_call_json: None,
                    op_handle: None,
                    chain_tx_hash: None,
                    status: TargetStatus::Pending,
                    error: None,
                    created_at: now_secs(),
                    updated_at: now_secs(),
                })
                .await;
            if let Err(err) = created {
                self.abort_dispatch(&transaction_id, &targets).await;
                return Err(EngineError::store(err.to_string()));
            }
            targets.push((target_id, member));
        }

        // The targets exist and are non-terminal, so the aggregate moves to
        // Processing before the per-member work starts.
        rederive_transaction(self.store.as_ref(), &transaction_id)
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;

        info!(%transaction_id, targets = targets.len(), "dispatch accepted");
        Ok(DispatchPlan {
            transaction_id,
            template,
            tokens,
            targets,
        })
    }

    /// Fails whatever a half-finished dispatch already persisted so nothing
    /// is left Pending forever: every created target is marked Failed and
    /// the parent is re-derived (or failed outright when no target exists).
    async fn abort_dispatch(&self, transaction_id: &str, created: &[(String, MemberRef)]) {
        for (target_id, _) in created {
            self.finish_target(transaction_id, target_id, TargetStatus::Failed, |t| {
                t.error = Some("dispatch aborted: target creation failed".to_string());
            })
            .await;
        }
        if created.is_empty()
            && let Err(err) = self.store.update_transaction_status(transaction_id, TxStatus::Failed).await
        {
            warn!(transaction_id, "abort status update failed: {err}");
        }
    }

    /// One future per member, all independent: a member failing at any step
    /// marks only its own target Failed and the fan-out keeps going.
    pub(crate) async fn run_plan(&self, plan: DispatchPlan) {
        let futures = plan.targets.iter().map(|(target_id, member)| {
            let template = &plan.template;
            let tokens = &plan.tokens;
            let transaction_id = &plan.transaction_id;
            async move {
                match self.execute_member(template, tokens, member).await {
                    Ok((handle, resolved_call_json)) => {
                        info!(
                            %transaction_id,
                            member = %member.member_id,
                            handle = %handle,
                            "operation submitted"
                        );
                        self.finish_target(transaction_id, target_id, TargetStatus::Submitted, |t| {
                            t.op_handle = Some(handle);
                            t.resolved_call_json = Some(resolved_call_json);
                        })
                        .await;
                    }
                    Err(err) => {
                        let message = format_with_code(&err);
                        warn!(%transaction_id, member = %member.member_id, error = %message, "target failed");
                        self.finish_target(transaction_id, target_id, TargetStatus::Failed, |t| {
                            t.error = Some(message);
                        })
                        .await;
                    }
                }
            }
        });
        join_all(futures).await;
    }

    async fn execute_member(
        &self,
        template: &Template,
        tokens: &[Address],
        member: &MemberRef,
    ) -> EngineResult<(String, String)> {
        let ctx = self.context.get_context(member.wallet_address, tokens).await?;
        debug!(member = %member.member_id, "wallet context fetched");

        let resolved = resolve_template(template, &ctx, &self.resolve_options).map_err(CoreError::from)?;
        let call = encode_call(&resolved).map_err(CoreError::from)?;
        let resolved_call_json =
            serde_json::to_string(&call).map_err(|e| EngineError::dispatch(format!("serialize call: {e}")))?;

        let nonce = self.context.transaction_count(member.wallet_address).await?;
        let operation = WalletOperation {
            sender: member.wallet_address,
            to: call.to,
            value: call.value,
            data: call.data,
            nonce,
        };
        let digest = operation.digest();

        let mut account = DelegatedAccount::new(Arc::clone(&self.signer), member.wallet_address, &member.key_handle);
        if let Some(chain_id) = self.chain_id {
            account = account.with_chain_id(chain_id);
        }
        let signature = account
            .sign_hash(&digest)
            .await
            .map_err(|e| EngineError::dispatch(format!("signing failed for {}: {e}", member.member_id)))?;

        let signed = SignedOperation {
            operation,
            signature: Bytes::from(signature.as_bytes().to_vec()),
        };
        let handle = self.bundler.submit_operation(&signed).await?;
        Ok((handle, resolved_call_json))
    }

    /// Writes the target's terminal-or-submitted state, then re-derives the
    /// parent. Store failures here are logged, not propagated: the fan-out
    /// must keep going for the other members.
    async fn finish_target<F>(&self, transaction_id: &str, target_id: &str, status: TargetStatus, mutate: F)
    where
        F: FnOnce(&mut TargetRecord),
    {
        let targets = match self.store.list_targets(transaction_id).await {
            Ok(t) => t,
            Err(err) => {
                warn!(transaction_id, target_id, "list targets failed: {err}");
                return;
            }
        };
        let Some(mut row) = targets.into_iter().find(|t| t.id == target_id) else {
            warn!(transaction_id, target_id, "target row disappeared");
            return;
        };

        row.status = status;
        row.updated_at = now_secs();
        mutate(&mut row);
        if let Err(err) = self.store.update_target(row).await {
            warn!(transaction_id, target_id, "target update failed: {err}");
            return;
        }
        if let Err(err) = rederive_transaction(self.store.as_ref(), transaction_id).await {
            warn!(transaction_id, "status rederivation failed: {err}");
        }
    }

    /// Polling read path for dispatch progress.
    pub async fn get_status(&self, transaction_id: &str) -> EngineResult<Option<TransactionWithTargets>> {
        let Some(transaction) = self
            .store
            .get_transaction(transaction_id)
            .await
            .map_err(|e| EngineError::store(e.to_string()))?
        else {
            return Ok(None);
        };
        let targets = self
            .store
            .list_targets(transaction_id)
            .await
            .map_err(|e| EngineError::store(e.to_string()))?;
        Ok(Some(TransactionWithTargets { transaction, targets }))
    }
}

/// Recomputes a transaction's status from its current target set and writes
/// it back. Shared by the driver and the confirmation poller; safe to call
/// from both at once because statuses only move forward.
pub async fn rederive_transaction<D: FleetStore + ?Sized>(store: &D, transaction_id: &str) -> anyhow::Result<()> {
    let targets = store.list_targets(transaction_id).await?;
    let statuses: Vec<TargetStatus> = targets.iter().map(|t| t.status).collect();
    let next = derive_transaction_status(&statuses);
    store.update_transaction_status(transaction_id, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::{U256, address};
    use async_trait::async_trait;
    use fleetcast_connectors::bundler::MockBundlerClient;
    use fleetcast_connectors::context::MockContextProvider;
    use fleetcast_connectors::signer::{MockThresholdSigner, RawThresholdSignature};
    use fleetcast_core::template::WalletContext;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::memory::MemoryStore;

    const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";

    fn member(id: &str, wallet: Address) -> MemberRef {
        MemberRef {
            member_id: id.to_string(),
            wallet_address: wallet,
            key_handle: format!("vault/{id}"),
        }
    }

    fn transfer_template() -> Template {
        Template::Abi {
            contract_address: DAI.to_string(),
            interface: json!(["function transfer(address to, uint256 amount) returns (bool)"]),
            function_name: "transfer".to_string(),
            args: vec![
                json!("{{walletAddress}}"),
                json!(format!("{{{{percentage:tokenBalance:{DAI}:50}}}}")),
            ],
            value: serde_json::Value::Null,
        }
    }

    fn context_with_balance(wallet: Address, dai_balance: u64) -> WalletContext {
        let mut token_balances = HashMap::new();
        token_balances.insert(DAI.parse::<Address>().unwrap(), U256::from(dai_balance));
        WalletContext {
            wallet_address: wallet,
            native_balance: U256::from(1_000_000_000u64),
            token_balances,
            block_timestamp: 1_700_000_000,
        }
    }

    fn working_signer() -> MockThresholdSigner {
        let mut signer = MockThresholdSigner::new();
        signer.expect_sign_digest().returning(|_, _| {
            Ok(RawThresholdSignature {
                r: "0x01".to_string(),
                s: "0x02".to_string(),
                recid: Some(0),
                recovery_param: None,
                v: None,
            })
        });
        signer
    }

    fn driver(
        context: MockContextProvider,
        signer: MockThresholdSigner,
        bundler: MockBundlerClient,
    ) -> (
        Arc<ExecutionDriver<MockContextProvider, MockThresholdSigner, MockBundlerClient, MemoryStore>>,
        Arc<MemoryStore>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let driver = Arc::new(ExecutionDriver::new(
            Arc::new(context),
            Arc::new(signer),
            Arc::new(bundler),
            Arc::clone(&store),
            ResolveOptions::default(),
            Some(8453),
        ));
        (driver, store)
    }

    #[tokio::test]
    async fn one_failing_member_never_stops_the_others() {
        let alice = address!("00000000000000000000000000000000000000a1");
        let bob = address!("00000000000000000000000000000000000000b2");
        let carol = address!("00000000000000000000000000000000000000c3");

        let mut context = MockContextProvider::new();
        context.expect_get_context().returning(move |wallet, _| {
            let balance = if wallet == bob { 0 } else { 1_000 };
            Ok(context_with_balance(wallet, balance))
        });
        context.expect_transaction_count().returning(|_| Ok(7));

        let mut bundler = MockBundlerClient::new();
        bundler
            .expect_submit_operation()
            .times(2)
            .returning(|signed| Ok(format!("0xop-{:#x}", signed.operation.sender)));

        let (driver, store) = driver(context, working_signer(), bundler);
        let plan = driver
            .prepare(
                transfer_template(),
                vec![member("alice", alice), member("bob", bob), member("carol", carol)],
            )
            .await
            .expect("prepare");
        let transaction_id = plan.transaction_id.clone();
        driver.run_plan(plan).await;

        let targets = store.list_targets(&transaction_id).await.unwrap();
        assert_eq!(targets.len(), 3);

        let by_member: HashMap<&str, &TargetRecord> =
            targets.iter().map(|t| (t.member_id.as_str(), t)).collect();
        assert_eq!(by_member["alice"].status, TargetStatus::Submitted);
        assert!(by_member["alice"].op_handle.is_some());
        assert!(by_member["alice"].resolved_call_json.is_some());
        assert_eq!(by_member["carol"].status, TargetStatus::Submitted);

        assert_eq!(by_member["bob"].status, TargetStatus::Failed);
        let error = by_member["bob"].error.as_deref().unwrap();
        assert!(error.contains("no balance to transfer"), "unexpected error: {error}");

        // Two submitted legs are still in flight, so the parent is Processing.
        let tx = store.get_transaction(&transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Processing);
    }

    #[tokio::test]
    async fn prepare_moves_parent_to_processing() {
        let (driver, store) = driver(MockContextProvider::new(), MockThresholdSigner::new(), MockBundlerClient::new());
        let plan = driver
            .prepare(
                transfer_template(),
                vec![member("alice", address!("00000000000000000000000000000000000000a1"))],
            )
            .await
            .expect("prepare");

        // The target rows exist, so the aggregate is already past Pending
        // before any member work runs.
        let tx = store.get_transaction(&plan.transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Processing);
    }

    /// Delegates to a real in-memory store but rejects the Nth target
    /// insert, so half-finished dispatch persistence can be exercised.
    struct BrokenTargetStore {
        inner: MemoryStore,
        create_calls: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait]
    impl FleetStore for BrokenTargetStore {
        async fn create_transaction(&self, row: TransactionRecord) -> anyhow::Result<()> {
            self.inner.create_transaction(row).await
        }
        async fn get_transaction(&self, id: &str) -> anyhow::Result<Option<TransactionRecord>> {
            self.inner.get_transaction(id).await
        }
        async fn update_transaction_status(&self, id: &str, next: TxStatus) -> anyhow::Result<()> {
            self.inner.update_transaction_status(id, next).await
        }
        async fn create_target(&self, row: TargetRecord) -> anyhow::Result<()> {
            if self.create_calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                anyhow::bail!("database or disk is full");
            }
            self.inner.create_target(row).await
        }
        async fn update_target(&self, row: TargetRecord) -> anyhow::Result<()> {
            self.inner.update_target(row).await
        }
        async fn list_targets(&self, transaction_id: &str) -> anyhow::Result<Vec<TargetRecord>> {
            self.inner.list_targets(transaction_id).await
        }
        async fn list_targets_by_status(&self, status: TargetStatus, limit: usize) -> anyhow::Result<Vec<TargetRecord>> {
            self.inner.list_targets_by_status(status, limit).await
        }
    }

    #[tokio::test]
    async fn target_creation_failure_strands_no_pending_rows() {
        let store = Arc::new(BrokenTargetStore {
            inner: MemoryStore::new(),
            create_calls: AtomicUsize::new(0),
            fail_at: 2,
        });
        let driver = Arc::new(ExecutionDriver::new(
            Arc::new(MockContextProvider::new()),
            Arc::new(MockThresholdSigner::new()),
            Arc::new(MockBundlerClient::new()),
            Arc::clone(&store),
            ResolveOptions::default(),
            None,
        ));

        let err = driver
            .prepare(
                transfer_template(),
                vec![
                    member("alice", address!("00000000000000000000000000000000000000a1")),
                    member("bob", address!("00000000000000000000000000000000000000b2")),
                ],
            )
            .await
            .expect_err("second insert must fail");
        assert!(matches!(err, EngineError::Store { .. }));

        // The target that did get created is failed, not stranded Pending,
        // and the parent resolves instead of sitting unreachable forever.
        assert!(
            store
                .list_targets_by_status(TargetStatus::Pending, 10)
                .await
                .unwrap()
                .is_empty()
        );
        let failed = store.list_targets_by_status(TargetStatus::Failed, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap().contains("dispatch aborted"));

        let tx = store.get_transaction(&failed[0].transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn invalid_template_aborts_before_any_target_exists() {
        let context = MockContextProvider::new();
        let bundler = MockBundlerClient::new();
        let (driver, store) = driver(context, MockThresholdSigner::new(), bundler);

        let bad = Template::Abi {
            contract_address: DAI.to_string(),
            interface: json!(["function transfer(address to, uint256 amount) returns (bool)"]),
            function_name: "transfer".to_string(),
            args: vec![json!("{{bogusPlaceholder}}")],
            value: serde_json::Value::Null,
        };
        let err = driver
            .prepare(bad, vec![member("alice", address!("00000000000000000000000000000000000000a1"))])
            .await
            .expect_err("must reject");
        assert!(matches!(err, EngineError::Core(_)));

        assert!(
            store
                .list_targets_by_status(TargetStatus::Pending, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn bundler_rejection_fails_only_that_target() {
        let alice = address!("00000000000000000000000000000000000000a1");
        let bob = address!("00000000000000000000000000000000000000b2");

        let mut context = MockContextProvider::new();
        context
            .expect_get_context()
            .returning(move |wallet, _| Ok(context_with_balance(wallet, 1_000)));
        context.expect_transaction_count().returning(|_| Ok(1));

        let mut bundler = MockBundlerClient::new();
        bundler.expect_submit_operation().returning(move |signed| {
            if signed.operation.sender == bob {
                Err(fleetcast_connectors::ConnectorError::bundler("rpc error -32602: invalid params"))
            } else {
                Ok("0xop-1".to_string())
            }
        });

        let (driver, store) = driver(context, working_signer(), bundler);
        let plan = driver
            .prepare(transfer_template(), vec![member("alice", alice), member("bob", bob)])
            .await
            .expect("prepare");
        let transaction_id = plan.transaction_id.clone();
        driver.run_plan(plan).await;

        let targets = store.list_targets(&transaction_id).await.unwrap();
        let by_member: HashMap<&str, &TargetRecord> =
            targets.iter().map(|t| (t.member_id.as_str(), t)).collect();
        assert_eq!(by_member["alice"].status, TargetStatus::Submitted);
        assert_eq!(by_member["bob"].status, TargetStatus::Failed);
        assert!(by_member["bob"].error.as_deref().unwrap().contains("invalid params"));
    }

    #[tokio::test]
    async fn get_status_returns_transaction_with_targets() {
        let alice = address!("00000000000000000000000000000000000000a1");

        let mut context = MockContextProvider::new();
        context
            .expect_get_context()
            .returning(move |wallet, _| Ok(context_with_balance(wallet, 1_000)));
        context.expect_transaction_count().returning(|_| Ok(1));

        let mut bundler = MockBundlerClient::new();
        bundler.expect_submit_operation().returning(|_| Ok("0xop-1".to_string()));

        let (driver, _store) = driver(context, working_signer(), bundler);
        let plan = driver
            .prepare(transfer_template(), vec![member("alice", alice)])
            .await
            .expect("prepare");
        let transaction_id = plan.transaction_id.clone();
        driver.run_plan(plan).await;

        let status = driver.get_status(&transaction_id).await.unwrap().expect("present");
        assert_eq!(status.transaction.id, transaction_id);
        assert_eq!(status.targets.len(), 1);
        assert_eq!(status.targets[0].status, TargetStatus::Submitted);

        assert!(driver.get_status("no-such-id").await.unwrap().is_none());
    }
}
