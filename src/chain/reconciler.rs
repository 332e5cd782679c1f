//! Background reconciliation of externally-submitted transactions.
//!
//! Each cycle closes expired runs, then polls receipts for the oldest
//! pending transactions. A transaction resolves to confirmed or failed
//! exactly once; run and claim state only ever advances when the receipt
//! carries the matching event. Provider errors and missing receipts leave
//! the transaction pending for the next cycle.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::chain::models::{ChainTx, TxKind, TxReceipt, TxStatus};
use crate::chain::provider::ReceiptProvider;
use crate::error::AppResult;
use crate::payroll::lifecycle;
use crate::payroll::models::{ClaimStatus, PayrollRun, RunStatus};
use crate::store::{ChainTxStore, PayrollStore, RunTxSlot};

const PENDING_BATCH_SIZE: i64 = 50;

#[derive(Clone)]
pub struct TxReconciler {
    payroll: Arc<dyn PayrollStore>,
    txs: Arc<dyn ChainTxStore>,
    provider: Arc<dyn ReceiptProvider>,
    poll_interval: Duration,
}

impl TxReconciler {
    pub fn new(
        payroll: Arc<dyn PayrollStore>,
        txs: Arc<dyn ChainTxStore>,
        provider: Arc<dyn ReceiptProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            payroll,
            txs,
            provider,
            poll_interval,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let reconciler = self.clone();

        tokio::spawn(async move {
            info!(
                "🔄 Tx reconciler started (poll every {:?})",
                reconciler.poll_interval
            );
            let mut ticker = interval(reconciler.poll_interval);

            loop {
                ticker.tick().await;
                if let Err(e) = reconciler.cycle(Utc::now()).await {
                    error!("Reconciler cycle failed: {:?}", e);
                }
            }
        })
    }

    /// One reconciliation pass. Takes the reference instant explicitly so
    /// tests control time. Returns the number of transactions resolved.
    pub async fn cycle(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let closed = self.payroll.close_expired_runs(now).await?;
        if closed > 0 {
            info!(closed, "Closed runs past their claim window");
        }

        let pending = self.txs.pending_txs(PENDING_BATCH_SIZE).await?;
        let mut resolved = 0;

        for tx in pending {
            let receipt = match self.provider.transaction_receipt(&tx.tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(e) => {
                    // transient: the tx stays pending for the next cycle
                    warn!(tx_hash = %tx.tx_hash, "Receipt fetch failed: {:?}", e);
                    continue;
                }
            };

            let status = if receipt.success {
                TxStatus::Confirmed
            } else {
                TxStatus::Failed
            };
            self.txs
                .resolve_tx(tx.id, status, receipt.block_number as i64, receipt.success)
                .await?;
            resolved += 1;
            info!(
                tx_hash = %tx.tx_hash,
                kind = %tx.kind,
                status = %status,
                block = receipt.block_number,
                "Transaction resolved"
            );

            if !receipt.success {
                warn!(tx_hash = %tx.tx_hash, kind = %tx.kind, "Transaction reverted on-chain");
                continue;
            }

            // state routing failures are logged, never fatal to the cycle
            if let Err(e) = self.route(&tx, &receipt, now).await {
                warn!(tx_hash = %tx.tx_hash, kind = %tx.kind, "Receipt did not advance state: {:?}", e);
            }
        }
        Ok(resolved)
    }

    async fn route(&self, tx: &ChainTx, receipt: &TxReceipt, now: DateTime<Utc>) -> AppResult<()> {
        match tx.kind {
            TxKind::CreatePayroll => self.apply_creation(tx, receipt).await,
            TxKind::FundVault => self.apply_funding(tx, receipt, now).await,
            TxKind::Claim => self.apply_claim(tx, receipt, now).await,
        }
    }

    async fn linked_run(&self, tx: &ChainTx) -> AppResult<Option<PayrollRun>> {
        if let Some(run_id) = tx.run_id {
            return self.payroll.run(run_id).await;
        }
        if let Some(payroll_id) = tx.payroll_id {
            return self.payroll.run_by_payroll_id(payroll_id).await;
        }
        Ok(None)
    }

    async fn apply_creation(&self, tx: &ChainTx, receipt: &TxReceipt) -> AppResult<()> {
        let Some(run) = self.linked_run(tx).await? else {
            warn!(tx_hash = %tx.tx_hash, "Creation tx references no known run");
            return Ok(());
        };
        if run.status != RunStatus::Committed {
            // stale link, e.g. a replayed submission after the run moved on
            warn!(run_id = %run.id, status = %run.status, "Creation receipt for a non-committed run, ignoring");
            return Ok(());
        }

        lifecycle::check_creation(&run, receipt)?;
        self.payroll
            .set_run_tx_hash(run.id, RunTxSlot::Create, &tx.tx_hash)
            .await?;
        let advanced = self
            .payroll
            .advance_run_status(run.id, RunStatus::Committed, RunStatus::OnchainCreated, None)
            .await?;
        if advanced {
            info!(run_id = %run.id, payroll_id = run.payroll_id, "✓ Run created on-chain");
        }
        Ok(())
    }

    async fn apply_funding(
        &self,
        tx: &ChainTx,
        receipt: &TxReceipt,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(run) = self.linked_run(tx).await? else {
            warn!(tx_hash = %tx.tx_hash, "Funding tx references no known run");
            return Ok(());
        };
        // funding can land before the creation receipt is reconciled; a
        // verified vault transfer opens the run from either stage
        if !matches!(run.status, RunStatus::Committed | RunStatus::OnchainCreated) {
            warn!(run_id = %run.id, status = %run.status, "Funding receipt for a run that is not awaiting funds, ignoring");
            return Ok(());
        }

        lifecycle::check_funding(&run, receipt)?;
        self.payroll
            .set_run_tx_hash(run.id, RunTxSlot::Fund, &tx.tx_hash)
            .await?;
        if run.status == RunStatus::Committed {
            self.payroll
                .advance_run_status(run.id, RunStatus::Committed, RunStatus::OnchainCreated, None)
                .await?;
        }
        let close_at = now + ChronoDuration::days(run.claim_window_days as i64);
        let advanced = self
            .payroll
            .advance_run_status(run.id, RunStatus::OnchainCreated, RunStatus::Open, Some(close_at))
            .await?;
        if advanced {
            info!(run_id = %run.id, payroll_id = run.payroll_id, %close_at, "✓ Run funded and open for claims");
        }
        Ok(())
    }

    async fn apply_claim(
        &self,
        tx: &ChainTx,
        receipt: &TxReceipt,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(run) = self.linked_run(tx).await? else {
            warn!(tx_hash = %tx.tx_hash, "Claim tx references no known run");
            return Ok(());
        };
        let Some(claim) = self
            .payroll
            .claim_by_wallet(run.id, &tx.employee_wallet)
            .await?
        else {
            warn!(run_id = %run.id, wallet = %tx.employee_wallet, "Claim tx for a wallet outside the run");
            return Ok(());
        };

        if lifecycle::validate_claim_transition(claim.status, ClaimStatus::Claimed).is_err() {
            warn!(run_id = %run.id, index = claim.index, "Claim was already settled, ignoring replay");
            return Ok(());
        }

        lifecycle::check_claim(&run, &claim, receipt)?;
        let flipped = self
            .payroll
            .mark_claim_claimed(claim.id, &tx.tx_hash, now)
            .await?;
        if flipped {
            info!(run_id = %run.id, index = claim.index, "✓ Claim settled");
        } else {
            warn!(run_id = %run.id, index = claim.index, "Claim was already settled, ignoring replay");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::Address;
    use crate::chain::models::LogEntry;
    use crate::chain::verify;
    use crate::error::AppError;
    use crate::payroll::commit::{CommitItem, CommitmentBuilder};
    use crate::payroll::merkle;
    use crate::payroll::models::{ClaimStatus, Employee};
    use crate::payroll::scheduler::build_draft_claims;
    use crate::store::MemoryStore;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::collections::HashMap;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    struct FakeProvider {
        receipts: RwLock<HashMap<String, Option<TxReceipt>>>,
        failing: RwLock<bool>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                receipts: RwLock::new(HashMap::new()),
                failing: RwLock::new(false),
            }
        }

        async fn set(&self, tx_hash: &str, receipt: TxReceipt) {
            self.receipts
                .write()
                .await
                .insert(tx_hash.to_string(), Some(receipt));
        }

        async fn set_failing(&self, failing: bool) {
            *self.failing.write().await = failing;
        }
    }

    #[async_trait::async_trait]
    impl ReceiptProvider for FakeProvider {
        async fn transaction_receipt(&self, tx_hash: &str) -> AppResult<Option<TxReceipt>> {
            if *self.failing.read().await {
                return Err(AppError::Rpc("node unavailable".to_string()));
            }
            Ok(self
                .receipts
                .read()
                .await
                .get(tx_hash)
                .cloned()
                .flatten())
        }
    }

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn u64_word(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn addr_word(a: &Address) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(a.as_bytes());
        w
    }

    fn created_receipt(run: &PayrollRun) -> TxReceipt {
        let vault: Address = run.vault.parse().unwrap();
        let token: Address = run.token.parse().unwrap();
        let root = merkle::from_hex(&run.merkle_root).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&addr_word(&token));
        data.extend_from_slice(&root);
        data.extend_from_slice(&u64_word(run.total as u64));
        TxReceipt {
            success: true,
            block_number: 100,
            logs: vec![LogEntry {
                address: vault,
                topics: vec![
                    verify::payroll_created_topic(),
                    u64_word(run.payroll_id as u64),
                ],
                data,
            }],
        }
    }

    fn funded_receipt(run: &PayrollRun) -> TxReceipt {
        let vault: Address = run.vault.parse().unwrap();
        let token: Address = run.token.parse().unwrap();
        TxReceipt {
            success: true,
            block_number: 101,
            logs: vec![LogEntry {
                address: token,
                topics: vec![
                    verify::transfer_private_topic(),
                    addr_word(&addr(0x99)),
                    addr_word(&vault),
                ],
                data: vec![0u8; 32],
            }],
        }
    }

    fn claimed_receipt(run: &PayrollRun, index: u32, employee: &Address) -> TxReceipt {
        let vault: Address = run.vault.parse().unwrap();
        TxReceipt {
            success: true,
            block_number: 102,
            logs: vec![LogEntry {
                address: vault,
                topics: vec![
                    verify::claimed_topic(),
                    u64_word(run.payroll_id as u64),
                    u64_word(index as u64),
                    addr_word(employee),
                ],
                data: vec![0u8; 64],
            }],
        }
    }

    fn chain_tx(
        kind: TxKind,
        tx_hash: &str,
        run: &PayrollRun,
        employee_wallet: &str,
    ) -> ChainTx {
        ChainTx {
            id: Uuid::new_v4(),
            employer_id: run.employer_id,
            chain_id: 31337,
            tx_hash: tx_hash.to_string(),
            kind,
            status: TxStatus::Pending,
            run_id: Some(run.id),
            payroll_id: Some(run.payroll_id),
            employee_wallet: employee_wallet.to_string(),
            block_number: None,
            success: None,
            meta: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn hash(n: u8) -> String {
        format!("0x{}", hex::encode([n; 32]))
    }

    /// Seed a committed run with three recipients and return it.
    async fn seed_committed_run(store: &Arc<MemoryStore>) -> PayrollRun {
        let employer = Uuid::new_v4();
        let employees: Vec<Employee> = [(0x10u8, 100i64), (0x11, 200), (0x12, 300)]
            .iter()
            .map(|(b, s)| Employee {
                id: Uuid::new_v4(),
                employer_id: employer,
                wallet: addr(*b).to_checksum(),
                salary_units: *s,
                active: true,
                created_at: Utc::now(),
            })
            .collect();

        let run_id = Uuid::new_v4();
        let claims = build_draft_claims(run_id, &employees);
        let run = PayrollRun {
            id: run_id,
            employer_id: employer,
            schedule_id: None,
            run_nonce: None,
            payroll_id: 4242,
            token: addr(0xbb).to_checksum(),
            vault: addr(0xaa).to_checksum(),
            merkle_root: String::new(),
            total: claims.len() as i32,
            total_amount_units: 600,
            status: RunStatus::Draft,
            create_tx_hash: String::new(),
            fund_tx_hash: String::new(),
            claim_window_days: 14,
            close_at: None,
            created_at: Utc::now(),
        };
        store.insert_run(run, claims.clone()).await.unwrap();

        let items: Vec<CommitItem> = claims
            .iter()
            .map(|c| CommitItem {
                wallet: c.employee_wallet.clone(),
                net_ciphertext_b64: BASE64.encode(vec![c.index as u8 + 1; 48]),
                encrypted_ref: format!("0x{}", hex::encode([c.index as u8 + 1; 32])),
            })
            .collect();
        CommitmentBuilder::new(store.clone())
            .commit(run_id, items)
            .await
            .unwrap()
    }

    fn reconciler(
        store: Arc<MemoryStore>,
        provider: Arc<FakeProvider>,
    ) -> TxReconciler {
        TxReconciler::new(store.clone(), store, provider, Duration::from_secs(15))
    }

    #[tokio::test]
    async fn provider_failure_leaves_txs_pending() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();

        provider.set_failing(true).await;
        let resolved = reconciler(store.clone(), provider.clone())
            .cycle(Utc::now())
            .await
            .unwrap();
        assert_eq!(resolved, 0);
        assert_eq!(store.pending_txs(50).await.unwrap().len(), 1);

        // recovers once the node is back
        provider.set_failing(false).await;
        provider.set(&hash(1), created_receipt(&run)).await;
        let resolved = reconciler(store.clone(), provider)
            .cycle(Utc::now())
            .await
            .unwrap();
        assert_eq!(resolved, 1);
    }

    #[tokio::test]
    async fn unmined_tx_stays_pending() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();
        assert_eq!(store.pending_txs(50).await.unwrap().len(), 1);
        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Committed);
    }

    #[tokio::test]
    async fn matching_creation_receipt_advances_the_run() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(1), created_receipt(&run)).await;

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();

        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::OnchainCreated);
        assert_eq!(run.create_tx_hash, hash(1));
        assert!(store.pending_txs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmed_receipt_without_the_event_does_not_advance() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        provider
            .set(
                &hash(1),
                TxReceipt {
                    success: true,
                    block_number: 100,
                    logs: vec![],
                },
            )
            .await;

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();

        // tx resolved, run untouched
        assert!(store.pending_txs(50).await.unwrap().is_empty());
        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Committed);
        assert!(run.create_tx_hash.is_empty());
    }

    #[tokio::test]
    async fn funding_reconciled_before_creation_still_opens_the_run() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        let worker = reconciler(store.clone(), provider.clone());
        let now = Utc::now();

        // the fund receipt lands while the creation tx is still unmined
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        store
            .submit_tx(chain_tx(TxKind::FundVault, &hash(2), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(2), funded_receipt(&run)).await;
        worker.cycle(now).await.unwrap();

        let opened = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(opened.status, RunStatus::Open);
        assert_eq!(opened.fund_tx_hash, hash(2));
        assert_eq!(opened.close_at, Some(now + ChronoDuration::days(14)));

        // the creation receipt arriving later resolves its tx without
        // disturbing the open run
        provider.set(&hash(1), created_receipt(&run)).await;
        worker.cycle(now).await.unwrap();
        worker.cycle(now).await.unwrap();

        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Open);
        assert!(store.pending_txs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmed_funding_without_a_vault_transfer_does_not_open() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        store
            .advance_run_status(run.id, RunStatus::Committed, RunStatus::OnchainCreated, None)
            .await
            .unwrap();

        store
            .submit_tx(chain_tx(TxKind::FundVault, &hash(2), &run, ""))
            .await
            .unwrap();
        // confirmed transfer, but the destination is not the vault
        let token: Address = run.token.parse().unwrap();
        provider
            .set(
                &hash(2),
                TxReceipt {
                    success: true,
                    block_number: 101,
                    logs: vec![LogEntry {
                        address: token,
                        topics: vec![
                            verify::transfer_private_topic(),
                            addr_word(&addr(0x99)),
                            addr_word(&addr(0x98)),
                        ],
                        data: vec![0u8; 32],
                    }],
                },
            )
            .await;

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();

        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::OnchainCreated);
        assert!(run.fund_tx_hash.is_empty());
        assert!(run.close_at.is_none());
    }

    #[tokio::test]
    async fn reverted_tx_is_failed_and_nothing_advances() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        let (tx, _) = store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        let mut receipt = created_receipt(&run);
        receipt.success = false;
        provider.set(&hash(1), receipt).await;

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();

        let txs = store.txs_for_employer(run.employer_id, 10).await.unwrap();
        let resolved = txs.iter().find(|t| t.id == tx.id).unwrap();
        assert_eq!(resolved.status, TxStatus::Failed);
        assert_eq!(resolved.success, Some(false));
        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Committed);
    }

    #[tokio::test]
    async fn full_run_walks_to_open_and_claims_settle() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        let worker = reconciler(store.clone(), provider.clone());
        let now = Utc::now();

        // creation
        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(1), created_receipt(&run)).await;
        worker.cycle(now).await.unwrap();

        // funding opens the claim window
        store
            .submit_tx(chain_tx(TxKind::FundVault, &hash(2), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(2), funded_receipt(&run)).await;
        worker.cycle(now).await.unwrap();

        let open = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(open.status, RunStatus::Open);
        assert_eq!(open.fund_tx_hash, hash(2));
        assert_eq!(open.close_at, Some(now + ChronoDuration::days(14)));

        // one employee claims
        let claims = store.claims_for_run(run.id).await.unwrap();
        let claim = &claims[1];
        let employee: Address = claim.employee_wallet.parse().unwrap();
        store
            .submit_tx(chain_tx(TxKind::Claim, &hash(3), &run, &claim.employee_wallet))
            .await
            .unwrap();
        provider
            .set(&hash(3), claimed_receipt(&open, claim.index as u32, &employee))
            .await;
        worker.cycle(now).await.unwrap();

        let claims = store.claims_for_run(run.id).await.unwrap();
        assert_eq!(claims[1].status, ClaimStatus::Claimed);
        assert_eq!(claims[1].claim_tx_hash, hash(3));
        assert!(claims[1].claimed_at.is_some());
        // the other claims are untouched
        assert_eq!(claims[0].status, ClaimStatus::Unclaimed);
        assert_eq!(claims[2].status, ClaimStatus::Unclaimed);
    }

    #[tokio::test]
    async fn claim_replay_does_not_double_settle() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;
        let worker = reconciler(store.clone(), provider.clone());
        let now = Utc::now();

        store
            .submit_tx(chain_tx(TxKind::CreatePayroll, &hash(1), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(1), created_receipt(&run)).await;
        store
            .submit_tx(chain_tx(TxKind::FundVault, &hash(2), &run, ""))
            .await
            .unwrap();
        provider.set(&hash(2), funded_receipt(&run)).await;
        worker.cycle(now).await.unwrap();
        worker.cycle(now).await.unwrap();

        let claims = store.claims_for_run(run.id).await.unwrap();
        let claim = &claims[0];
        let employee: Address = claim.employee_wallet.parse().unwrap();
        for h in [3u8, 4] {
            store
                .submit_tx(chain_tx(TxKind::Claim, &hash(h), &run, &claim.employee_wallet))
                .await
                .unwrap();
            provider
                .set(&hash(h), claimed_receipt(&run, claim.index as u32, &employee))
                .await;
        }
        worker.cycle(now).await.unwrap();

        let claims = store.claims_for_run(run.id).await.unwrap();
        assert_eq!(claims[0].status, ClaimStatus::Claimed);
        // the first receipt wins the hash that settled the claim
        assert_eq!(claims[0].claim_tx_hash, hash(3));
    }

    #[tokio::test]
    async fn expired_open_runs_close_each_cycle() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let run = seed_committed_run(&store).await;

        store
            .advance_run_status(run.id, RunStatus::Committed, RunStatus::OnchainCreated, None)
            .await
            .unwrap();
        let opened_at = Utc::now() - ChronoDuration::days(20);
        store
            .advance_run_status(
                run.id,
                RunStatus::OnchainCreated,
                RunStatus::Open,
                Some(opened_at + ChronoDuration::days(14)),
            )
            .await
            .unwrap();

        reconciler(store.clone(), provider).cycle(Utc::now()).await.unwrap();
        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Closed);
    }
}
